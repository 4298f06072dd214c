//! ContentStore - the content items the category tree counts against
//!
//! The tree never owns content; it only asks how many items sit directly in a
//! category and re-files items when a category goes away. This trait is that
//! narrow seam. `SqliteContentStore` implements it on the `content_items`
//! table of the same database, so reassignment joins the caller's open
//! transaction and rolls back with it.

use crate::db::error::DatabaseError;
use crate::models::{CategoryId, ContentItem, TenantId};
use async_trait::async_trait;
use libsql::Connection;

/// Abstraction over content persistence used by the category tree
///
/// Every method runs on the caller's connection. Mutating operations pass the
/// connection of their open `TenantTransaction`, so content changes commit or
/// roll back together with the interval changes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the store is shared behind an `Arc`
/// by every service of a `TreeContext`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Number of items filed directly under `category`
    async fn count_by_category(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        category: &CategoryId,
    ) -> Result<i64, DatabaseError>;

    /// Re-file every item of `from` under `to` (`None` = uncategorized)
    ///
    /// # Returns
    ///
    /// Number of items moved
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use category_tree_core::db::{ContentStore, SqliteContentStore};
    /// # use category_tree_core::models::{CategoryId, TenantId};
    /// # async fn example(conn: &libsql::Connection) -> Result<(), Box<dyn std::error::Error>> {
    /// let store = SqliteContentStore::new();
    /// let moved = store
    ///     .reassign_category(conn, &TenantId::from("blog"), &CategoryId::from("old"), None)
    ///     .await?;
    /// println!("{} items are now uncategorized", moved);
    /// # Ok(())
    /// # }
    /// ```
    async fn reassign_category(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<u64, DatabaseError>;

    /// Create an item or re-file an existing one
    ///
    /// # Returns
    ///
    /// - `Ok(Some(previous))` if the item existed (its state before the call)
    /// - `Ok(None)` if the item was created
    async fn upsert_item(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<ContentItem>, DatabaseError>;

    /// Items filed directly under `category` (`None` = uncategorized), by id
    async fn list_items(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        category: Option<&CategoryId>,
    ) -> Result<Vec<ContentItem>, DatabaseError>;

    /// Number of categorized items in the tenant
    async fn count_categorized(
        &self,
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<i64, DatabaseError>;
}

/// `ContentStore` backed by the `content_items` table
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteContentStore;

impl SqliteContentStore {
    pub fn new() -> Self {
        Self
    }

    async fn scalar(
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::sql("Failed to count content items", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql("Failed to read content count", e))?
            .ok_or_else(|| DatabaseError::sql_execution("COUNT returned no row"))?;

        row.get::<i64>(0)
            .map_err(|e| DatabaseError::row_decode("content count", e.to_string()))
    }

    fn row_to_item(row: &libsql::Row) -> Result<ContentItem, DatabaseError> {
        let decode = |e: libsql::Error| DatabaseError::row_decode("content item", e.to_string());

        let tenant_id: String = row.get(0).map_err(decode)?;
        let id: String = row.get(1).map_err(decode)?;
        let title: String = row.get(2).map_err(decode)?;
        let category_id: Option<String> = row.get(3).map_err(decode)?;

        Ok(ContentItem {
            tenant_id: TenantId::new(tenant_id),
            id,
            title,
            category_id: category_id.map(CategoryId::new),
        })
    }

    async fn get_item(
        conn: &Connection,
        tenant: &TenantId,
        item_id: &str,
    ) -> Result<Option<ContentItem>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT tenant_id, id, title, category_id FROM content_items
                 WHERE tenant_id = ?1 AND id = ?2",
                (tenant.as_str(), item_id),
            )
            .await
            .map_err(|e| DatabaseError::sql("Failed to query content item", e))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql("Failed to read content item", e))?
        {
            Some(row) => Ok(Some(Self::row_to_item(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn count_by_category(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        category: &CategoryId,
    ) -> Result<i64, DatabaseError> {
        Self::scalar(
            conn,
            "SELECT COUNT(*) FROM content_items WHERE tenant_id = ?1 AND category_id = ?2",
            (tenant.as_str(), category.as_str()),
        )
        .await
    }

    async fn reassign_category(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE content_items SET category_id = ?3 WHERE tenant_id = ?1 AND category_id = ?2",
            (tenant.as_str(), from.as_str(), to.map(|id| id.as_str())),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to reassign content items", e))
    }

    async fn upsert_item(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<ContentItem>, DatabaseError> {
        let previous = Self::get_item(conn, tenant, item_id).await?;

        conn.execute(
            "INSERT INTO content_items (tenant_id, id, title, category_id) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tenant_id, id) DO UPDATE SET title = excluded.title, category_id = excluded.category_id",
            (tenant.as_str(), item_id, title, category.map(|id| id.as_str())),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to upsert content item", e))?;

        Ok(previous)
    }

    async fn list_items(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        category: Option<&CategoryId>,
    ) -> Result<Vec<ContentItem>, DatabaseError> {
        let mut rows = match category {
            Some(category) => conn
                .query(
                    "SELECT tenant_id, id, title, category_id FROM content_items
                     WHERE tenant_id = ?1 AND category_id = ?2 ORDER BY id",
                    (tenant.as_str(), category.as_str()),
                )
                .await,
            None => conn
                .query(
                    "SELECT tenant_id, id, title, category_id FROM content_items
                     WHERE tenant_id = ?1 AND category_id IS NULL ORDER BY id",
                    [tenant.as_str()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::sql("Failed to list content items", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql("Failed to read content item", e))?
        {
            items.push(Self::row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn count_categorized(
        &self,
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<i64, DatabaseError> {
        Self::scalar(
            conn,
            "SELECT COUNT(*) FROM content_items WHERE tenant_id = ?1 AND category_id IS NOT NULL",
            [tenant.as_str()],
        )
        .await
    }
}
