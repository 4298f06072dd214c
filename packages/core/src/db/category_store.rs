//! CategoryStore - row-level SQL for the nested-set table
//!
//! Every method runs on the caller's connection so that a whole structural
//! operation (validate, shift, write) shares one transaction. The store holds
//! no state and applies no business rules: validation, cycle checks and count
//! propagation live in the services.
//!
//! # Detached blocks
//!
//! Moving a block of rows is done by negating its bounds ("detaching" it),
//! shifting the remaining rows, then flipping the detached rows back to
//! positive values at their new offset. Negative rows never match the
//! `>= threshold` filters of a shift pass, so a block can be parked safely
//! while the space around it is rearranged.

use crate::db::error::DatabaseError;
use crate::models::{Category, CategoryId, NewCategory, TenantId};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row};

const CATEGORY_COLUMNS: &str = "tenant_id, id, title, slug, lft, rgt, level, direct_count, total_count, created_at, modified_at";

/// Row-level access to the `categories` table
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryStore;

impl CategoryStore {
    pub fn new() -> Self {
        Self
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(DatabaseError::row_decode(
            "category",
            format!("unable to parse timestamp '{}'", s),
        ))
    }

    /// Convert a libsql row (selected with `CATEGORY_COLUMNS`) into a Category
    fn row_to_category(row: &Row) -> Result<Category, DatabaseError> {
        let decode = |column: &str, e: libsql::Error| {
            DatabaseError::row_decode("category", format!("column '{}': {}", column, e))
        };

        let tenant_id: String = row.get(0).map_err(|e| decode("tenant_id", e))?;
        let id: String = row.get(1).map_err(|e| decode("id", e))?;
        let title: String = row.get(2).map_err(|e| decode("title", e))?;
        let slug: String = row.get(3).map_err(|e| decode("slug", e))?;
        let lft: i64 = row.get(4).map_err(|e| decode("lft", e))?;
        let rgt: i64 = row.get(5).map_err(|e| decode("rgt", e))?;
        let level: i64 = row.get(6).map_err(|e| decode("level", e))?;
        let direct_count: i64 = row.get(7).map_err(|e| decode("direct_count", e))?;
        let total_count: i64 = row.get(8).map_err(|e| decode("total_count", e))?;
        let created_at: String = row.get(9).map_err(|e| decode("created_at", e))?;
        let modified_at: String = row.get(10).map_err(|e| decode("modified_at", e))?;

        Ok(Category {
            tenant_id: TenantId::new(tenant_id),
            id: CategoryId::new(id),
            title,
            slug,
            lft,
            rgt,
            level,
            direct_count,
            total_count,
            created_at: Self::parse_timestamp(&created_at)?,
            modified_at: Self::parse_timestamp(&modified_at)?,
        })
    }

    async fn query_categories(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Category>, DatabaseError> {
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::sql("Failed to query categories", e))?;

        let mut categories = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql("Failed to read category row", e))?
        {
            categories.push(Self::row_to_category(&row)?);
        }
        Ok(categories)
    }

    async fn query_scalar(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<i64>, DatabaseError> {
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::sql("Failed to run scalar query", e))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql("Failed to read scalar row", e))?
        {
            Some(row) => row
                .get::<Option<i64>>(0)
                .map_err(|e| DatabaseError::row_decode("scalar", e.to_string())),
            None => Ok(None),
        }
    }

    //
    // READS
    //

    /// Every category of the tenant in preorder (ascending `lft`)
    pub async fn load_all(
        &self,
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<Vec<Category>, DatabaseError> {
        self.query_categories(
            conn,
            &format!(
                "SELECT {} FROM categories WHERE tenant_id = ?1 ORDER BY lft",
                CATEGORY_COLUMNS
            ),
            [tenant.as_str()],
        )
        .await
    }

    pub async fn get(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
    ) -> Result<Option<Category>, DatabaseError> {
        let mut found = self
            .query_categories(
                conn,
                &format!(
                    "SELECT {} FROM categories WHERE tenant_id = ?1 AND id = ?2",
                    CATEGORY_COLUMNS
                ),
                (tenant.as_str(), id.as_str()),
            )
            .await?;
        Ok(found.pop())
    }

    /// Direct children of `parent` (or of the implicit root) in `lft` order
    pub async fn children(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        parent: Option<&Category>,
    ) -> Result<Vec<Category>, DatabaseError> {
        match parent {
            Some(parent) => {
                self.query_categories(
                    conn,
                    &format!(
                        "SELECT {} FROM categories
                         WHERE tenant_id = ?1 AND lft > ?2 AND rgt < ?3 AND level = ?4
                         ORDER BY lft",
                        CATEGORY_COLUMNS
                    ),
                    (tenant.as_str(), parent.lft, parent.rgt, parent.level + 1),
                )
                .await
            }
            None => {
                self.query_categories(
                    conn,
                    &format!(
                        "SELECT {} FROM categories
                         WHERE tenant_id = ?1 AND level = 0 AND lft > 0
                         ORDER BY lft",
                        CATEGORY_COLUMNS
                    ),
                    [tenant.as_str()],
                )
                .await
            }
        }
    }

    /// The category itself followed by all its descendants, in preorder
    pub async fn subtree(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        node: &Category,
    ) -> Result<Vec<Category>, DatabaseError> {
        self.query_categories(
            conn,
            &format!(
                "SELECT {} FROM categories
                 WHERE tenant_id = ?1 AND lft >= ?2 AND rgt <= ?3
                 ORDER BY lft",
                CATEGORY_COLUMNS
            ),
            (tenant.as_str(), node.lft, node.rgt),
        )
        .await
    }

    /// Innermost category strictly containing `node`, if any
    pub async fn parent_of(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        node: &Category,
    ) -> Result<Option<Category>, DatabaseError> {
        let mut found = self
            .query_categories(
                conn,
                &format!(
                    "SELECT {} FROM categories
                     WHERE tenant_id = ?1 AND lft < ?2 AND rgt > ?3
                     ORDER BY lft DESC LIMIT 1",
                    CATEGORY_COLUMNS
                ),
                (tenant.as_str(), node.lft, node.rgt),
            )
            .await?;
        Ok(found.pop())
    }

    pub async fn slug_exists(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        slug: &str,
        excluding: Option<&CategoryId>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .query_scalar(
                conn,
                "SELECT COUNT(*) FROM categories WHERE tenant_id = ?1 AND slug = ?2 AND id != ?3",
                (
                    tenant.as_str(),
                    slug,
                    excluding.map(|id| id.as_str()).unwrap_or(""),
                ),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// Largest right bound in the tenant, `None` when the tree is empty
    ///
    /// Detached rows are ignored.
    pub async fn max_rgt(
        &self,
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<Option<i64>, DatabaseError> {
        self.query_scalar(
            conn,
            "SELECT MAX(rgt) FROM categories WHERE tenant_id = ?1 AND rgt > 0",
            [tenant.as_str()],
        )
        .await
    }

    //
    // STRUCTURAL WRITES
    //

    /// Shift every bound `>= threshold` by `delta` in one pass per column
    pub async fn shift_bounds(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        threshold: i64,
        delta: i64,
    ) -> Result<(), DatabaseError> {
        if delta == 0 {
            return Ok(());
        }

        conn.execute(
            "UPDATE categories SET lft = lft + ?3 WHERE tenant_id = ?1 AND lft >= ?2",
            (tenant.as_str(), threshold, delta),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to shift left bounds", e))?;

        conn.execute(
            "UPDATE categories SET rgt = rgt + ?3 WHERE tenant_id = ?1 AND rgt >= ?2",
            (tenant.as_str(), threshold, delta),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to shift right bounds", e))?;

        Ok(())
    }

    pub async fn insert(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        category: &NewCategory,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO categories (tenant_id, id, title, slug, lft, rgt, level, direct_count, total_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
            (
                tenant.as_str(),
                category.id.as_str(),
                category.title.as_str(),
                category.slug.as_str(),
                category.lft,
                category.rgt,
                category.level,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to insert category", e))?;
        Ok(())
    }

    /// Delete every row inside `[lft, rgt]`
    pub async fn delete_block(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        lft: i64,
        rgt: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "DELETE FROM categories WHERE tenant_id = ?1 AND lft >= ?2 AND rgt <= ?3",
            (tenant.as_str(), lft, rgt),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to delete category block", e))
    }

    pub async fn delete_row(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "DELETE FROM categories WHERE tenant_id = ?1 AND id = ?2",
            (tenant.as_str(), id.as_str()),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to delete category", e))
    }

    /// Park the block `[lft, rgt]` at negative bounds, pre-shifted by `offset`
    pub async fn detach_block(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        lft: i64,
        rgt: i64,
        offset: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE categories SET lft = -(lft + ?4), rgt = -(rgt + ?4)
             WHERE tenant_id = ?1 AND lft >= ?2 AND rgt <= ?3 AND lft > 0",
            (tenant.as_str(), lft, rgt, offset),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to detach category block", e))
    }

    /// Restore every parked row to positive bounds plus `offset`, adjusting levels
    pub async fn reattach_detached(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        offset: i64,
        level_delta: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE categories SET lft = -lft + ?2, rgt = -rgt + ?2, level = level + ?3,
                    modified_at = CURRENT_TIMESTAMP
             WHERE tenant_id = ?1 AND lft < 0",
            (tenant.as_str(), offset, level_delta),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to reattach category block", e))
    }

    /// Move the strict interior of `[lft, rgt]` one unit left and one level up
    pub async fn lift_interior(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        lft: i64,
        rgt: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE categories SET lft = lft - 1, rgt = rgt - 1, level = level - 1,
                    modified_at = CURRENT_TIMESTAMP
             WHERE tenant_id = ?1 AND lft > ?2 AND rgt < ?3",
            (tenant.as_str(), lft, rgt),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to lift category children", e))
    }

    /// Overwrite the position of a single row
    pub async fn set_position(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        lft: i64,
        rgt: i64,
        level: i64,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories SET lft = ?3, rgt = ?4, level = ?5, modified_at = CURRENT_TIMESTAMP
             WHERE tenant_id = ?1 AND id = ?2",
            (tenant.as_str(), id.as_str(), lft, rgt, level),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to set category position", e))?;
        Ok(())
    }

    pub async fn set_title_slug(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        title: &str,
        slug: &str,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories SET title = ?3, slug = ?4, modified_at = CURRENT_TIMESTAMP
             WHERE tenant_id = ?1 AND id = ?2",
            (tenant.as_str(), id.as_str(), title, slug),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to rename category", e))?;
        Ok(())
    }

    //
    // COUNTERS
    //

    pub async fn set_direct_count(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        count: i64,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories SET direct_count = ?3 WHERE tenant_id = ?1 AND id = ?2",
            (tenant.as_str(), id.as_str(), count),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to set direct count", e))?;
        Ok(())
    }

    /// Recompute `total_count` for every category containing `[lft, rgt]`
    /// (the ancestor chain of that interval, itself included)
    pub async fn refresh_chain_totals(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        lft: i64,
        rgt: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE categories SET total_count = (
                SELECT COALESCE(SUM(d.direct_count), 0) FROM categories d
                WHERE d.tenant_id = categories.tenant_id
                  AND d.lft >= categories.lft AND d.lft <= categories.rgt
             )
             WHERE tenant_id = ?1 AND lft <= ?2 AND rgt >= ?3",
            (tenant.as_str(), lft, rgt),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to refresh ancestor totals", e))
    }

    /// Recompute `total_count` for the whole tenant
    pub async fn refresh_all_totals(
        &self,
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE categories SET total_count = (
                SELECT COALESCE(SUM(d.direct_count), 0) FROM categories d
                WHERE d.tenant_id = categories.tenant_id
                  AND d.lft >= categories.lft AND d.lft <= categories.rgt
             )
             WHERE tenant_id = ?1",
            [tenant.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to refresh totals", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CategoryDatabase;
    use tempfile::TempDir;

    async fn setup() -> (CategoryDatabase, Connection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = CategoryDatabase::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db.connect_with_timeout().await.unwrap();
        (db, conn, temp_dir)
    }

    fn new_category(id: &str, lft: i64, rgt: i64, level: i64) -> NewCategory {
        NewCategory {
            id: CategoryId::from(id),
            title: id.to_uppercase(),
            slug: id.to_string(),
            lft,
            rgt,
            level,
        }
    }

    /// A(1,10) > B(2,5) > D(3,4); A > C(6,9) > E(7,8)
    async fn seed(conn: &Connection, tenant: &TenantId) {
        let store = CategoryStore::new();
        for row in [
            new_category("a", 1, 10, 0),
            new_category("b", 2, 5, 1),
            new_category("d", 3, 4, 2),
            new_category("c", 6, 9, 1),
            new_category("e", 7, 8, 2),
        ] {
            store.insert(conn, tenant, &row).await.unwrap();
        }
    }

    fn bounds(categories: &[Category]) -> Vec<(String, i64, i64)> {
        categories
            .iter()
            .map(|c| (c.id.to_string(), c.lft, c.rgt))
            .collect()
    }

    #[tokio::test]
    async fn test_load_all_is_preorder() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        seed(&conn, &tenant).await;

        let all = CategoryStore::new().load_all(&conn, &tenant).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d", "c", "e"]);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (_db, conn, _temp) = setup().await;
        let store = CategoryStore::new();
        seed(&conn, &TenantId::from("blog")).await;

        let other = TenantId::from("other");
        assert!(store.load_all(&conn, &other).await.unwrap().is_empty());
        assert_eq!(store.max_rgt(&conn, &other).await.unwrap(), None);
        assert!(!store.slug_exists(&conn, &other, "a", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_children_and_parent() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        let store = CategoryStore::new();
        seed(&conn, &tenant).await;

        let a = store.get(&conn, &tenant, &"a".into()).await.unwrap().unwrap();
        let children = store.children(&conn, &tenant, Some(&a)).await.unwrap();
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let roots = store.children(&conn, &tenant, None).await.unwrap();
        assert_eq!(roots.len(), 1);

        let e = store.get(&conn, &tenant, &"e".into()).await.unwrap().unwrap();
        let parent = store.parent_of(&conn, &tenant, &e).await.unwrap().unwrap();
        assert_eq!(parent.id.as_str(), "c");
        assert!(store.parent_of(&conn, &tenant, &a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shift_bounds_only_touches_threshold_and_above() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        let store = CategoryStore::new();
        seed(&conn, &tenant).await;

        store.shift_bounds(&conn, &tenant, 6, 2).await.unwrap();

        let all = store.load_all(&conn, &tenant).await.unwrap();
        assert_eq!(
            bounds(&all),
            vec![
                ("a".to_string(), 1, 12),
                ("b".to_string(), 2, 5),
                ("d".to_string(), 3, 4),
                ("c".to_string(), 8, 11),
                ("e".to_string(), 9, 10),
            ]
        );
    }

    #[tokio::test]
    async fn test_detach_and_reattach_block() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        let store = CategoryStore::new();
        seed(&conn, &tenant).await;

        // Park B's block, close its gap, then put it back after C
        assert_eq!(store.detach_block(&conn, &tenant, 2, 5, 0).await.unwrap(), 2);
        store.shift_bounds(&conn, &tenant, 6, -4).await.unwrap();
        store.shift_bounds(&conn, &tenant, 6, 4).await.unwrap();
        assert_eq!(store.reattach_detached(&conn, &tenant, 4, 0).await.unwrap(), 2);

        let all = store.load_all(&conn, &tenant).await.unwrap();
        assert_eq!(
            bounds(&all),
            vec![
                ("a".to_string(), 1, 10),
                ("c".to_string(), 2, 5),
                ("e".to_string(), 3, 4),
                ("b".to_string(), 6, 9),
                ("d".to_string(), 7, 8),
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_chain_totals() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        let store = CategoryStore::new();
        seed(&conn, &tenant).await;

        store.set_direct_count(&conn, &tenant, &"d".into(), 3).await.unwrap();
        store.set_direct_count(&conn, &tenant, &"a".into(), 1).await.unwrap();
        store.set_direct_count(&conn, &tenant, &"e".into(), 5).await.unwrap();

        // Only D's chain: D, B, A
        assert_eq!(store.refresh_chain_totals(&conn, &tenant, 3, 4).await.unwrap(), 3);

        let a = store.get(&conn, &tenant, &"a".into()).await.unwrap().unwrap();
        let b = store.get(&conn, &tenant, &"b".into()).await.unwrap().unwrap();
        let c = store.get(&conn, &tenant, &"c".into()).await.unwrap().unwrap();
        assert_eq!(a.total_count, 9);
        assert_eq!(b.total_count, 3);
        assert_eq!(c.total_count, 0, "C is outside D's chain");

        store.refresh_all_totals(&conn, &tenant).await.unwrap();
        let c = store.get(&conn, &tenant, &"c".into()).await.unwrap().unwrap();
        assert_eq!(c.total_count, 5);
    }

    #[tokio::test]
    async fn test_slug_exists_excluding_self() {
        let (_db, conn, _temp) = setup().await;
        let tenant = TenantId::from("blog");
        let store = CategoryStore::new();
        seed(&conn, &tenant).await;

        assert!(store.slug_exists(&conn, &tenant, "b", None).await.unwrap());
        assert!(!store
            .slug_exists(&conn, &tenant, "b", Some(&"b".into()))
            .await
            .unwrap());
        assert!(!store.slug_exists(&conn, &tenant, "zzz", None).await.unwrap());
    }
}
