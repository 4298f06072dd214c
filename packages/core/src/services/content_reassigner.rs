//! ContentReassigner - moves content between categories and keeps counts true
//!
//! Counters are never adjusted incrementally. After content moves, the
//! affected categories' `direct_count` is re-read from the content store and
//! `total_count` is recomputed over the ancestor chain of each, so a count can
//! not drift no matter how often content is shuffled around.

use crate::db::TreeOperation;
use crate::models::{CategoryCounts, CategoryId, TenantId, UserId};
use crate::services::{CategoryTreeError, TreeContext};
use crate::utils::normalize_title;
use libsql::Connection;
use serde::Serialize;

/// Result of `ContentReassigner::reassign`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "moved", rename_all = "camelCase")]
pub enum ReassignOutcome {
    Moved(u64),
    /// Source and target are the same category
    NoOp,
}

impl ReassignOutcome {
    pub fn count(&self) -> u64 {
        match self {
            Self::Moved(n) => *n,
            Self::NoOp => 0,
        }
    }
}

/// Result of a move-content submission: refreshed counters of both ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReport {
    pub moved: u64,
    pub from: CategoryCounts,
    /// `None` when the content became uncategorized
    pub to: Option<CategoryCounts>,
}

#[derive(Debug, Clone)]
pub struct ContentReassigner {
    ctx: TreeContext,
}

impl ContentReassigner {
    pub fn new(ctx: TreeContext) -> Self {
        Self { ctx }
    }

    /// Re-file every item of `from` under `to` (`None` = uncategorized)
    ///
    /// Returns `NoOp` without touching anything when `to == from`.
    pub async fn reassign(
        &self,
        tenant: &TenantId,
        user: &UserId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<ReassignOutcome, CategoryTreeError> {
        let result = self
            .move_tx(tenant, user, from, to)
            .await
            .map(|report| match report {
                Some(report) => ReassignOutcome::Moved(report.moved),
                None => ReassignOutcome::NoOp,
            });

        self.ctx.report(
            tenant,
            TreeOperation::MoveContent {
                from: from.clone(),
                to: to.cloned(),
            },
            &result,
        );
        result
    }

    /// The admin "move entries to category" action
    ///
    /// Same semantics as `reassign`, returning the refreshed counters of both
    /// categories. Counts are recomputed along both ancestor chains.
    pub async fn move_and_count(
        &self,
        tenant: &TenantId,
        user: &UserId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<MoveReport, CategoryTreeError> {
        let result = match self.move_tx(tenant, user, from, to).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => self.no_op_report(tenant, from).await,
            Err(e) => Err(e),
        };

        self.ctx.report(
            tenant,
            TreeOperation::MoveContent {
                from: from.clone(),
                to: to.cloned(),
            },
            &result,
        );
        result
    }

    /// Create a content item or re-file an existing one
    ///
    /// Returns the category the item was filed under before the call.
    pub async fn assign_item(
        &self,
        tenant: &TenantId,
        user: &UserId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<CategoryId>, CategoryTreeError> {
        let result = self.assign_tx(tenant, user, item_id, title, category).await;
        self.ctx.report(
            tenant,
            TreeOperation::AssignItem {
                item_id: item_id.to_string(),
            },
            &result,
        );
        result
    }

    async fn move_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<Option<MoveReport>, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.move_in(tx.conn(), tenant, from, to).await;
        self.ctx.finish(tx, result).await
    }

    async fn move_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<Option<MoveReport>, CategoryTreeError> {
        let store = &self.ctx.store;

        store
            .get(conn, tenant, from)
            .await?
            .ok_or_else(|| CategoryTreeError::not_found(from))?;
        if let Some(to) = to {
            store
                .get(conn, tenant, to)
                .await?
                .ok_or_else(|| CategoryTreeError::not_found(to))?;
        }

        if to == Some(from) {
            tracing::debug!(tenant = %tenant, category = %from, "Reassign onto itself, nothing to do");
            return Ok(None);
        }

        let moved = self.reassign_items_in(conn, tenant, from, to).await?;

        let mut touched = vec![from];
        touched.extend(to);
        self.refresh_counts_in(conn, tenant, &touched).await?;

        let from_counts = store
            .get(conn, tenant, from)
            .await?
            .ok_or_else(|| CategoryTreeError::not_found(from))?
            .counts();
        let to_counts = match to {
            Some(to) => Some(
                store
                    .get(conn, tenant, to)
                    .await?
                    .ok_or_else(|| CategoryTreeError::not_found(to))?
                    .counts(),
            ),
            None => None,
        };

        Ok(Some(MoveReport {
            moved,
            from: from_counts,
            to: to_counts,
        }))
    }

    async fn no_op_report(
        &self,
        tenant: &TenantId,
        category: &CategoryId,
    ) -> Result<MoveReport, CategoryTreeError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let counts = self
            .ctx
            .store
            .get(&conn, tenant, category)
            .await?
            .ok_or_else(|| CategoryTreeError::not_found(category))?
            .counts();

        Ok(MoveReport {
            moved: 0,
            from: counts.clone(),
            to: Some(counts),
        })
    }

    async fn assign_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<CategoryId>, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;

        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(CategoryTreeError::invalid_input("item id must not be empty"));
        }
        let title = normalize_title(title)
            .ok_or_else(|| CategoryTreeError::invalid_input("item title must not be empty"))?;

        let tx = self.ctx.begin(tenant).await?;
        let result = self
            .assign_in(tx.conn(), tenant, item_id, &title, category)
            .await;
        self.ctx.finish(tx, result).await
    }

    async fn assign_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<CategoryId>, CategoryTreeError> {
        if let Some(category) = category {
            self.ctx
                .store
                .get(conn, tenant, category)
                .await?
                .ok_or_else(|| CategoryTreeError::not_found(category))?;
        }

        let previous = self
            .ctx
            .content
            .upsert_item(conn, tenant, item_id, title, category)
            .await?
            .and_then(|item| item.category_id);

        let mut touched: Vec<&CategoryId> = Vec::new();
        touched.extend(previous.as_ref());
        touched.extend(category);
        self.refresh_counts_in(conn, tenant, &touched).await?;

        tracing::debug!(
            tenant = %tenant,
            item = item_id,
            from = ?previous,
            to = ?category,
            "Content item filed"
        );
        Ok(previous)
    }

    /// Re-file content of one category inside the caller's transaction
    ///
    /// Does not touch counters; callers refresh them once every move is done.
    pub(crate) async fn reassign_items_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<u64, CategoryTreeError> {
        let moved = self
            .ctx
            .content
            .reassign_category(conn, tenant, from, to)
            .await?;
        if moved > 0 {
            tracing::debug!(tenant = %tenant, from = %from, to = ?to, moved, "Content reassigned");
        }
        Ok(moved)
    }

    /// Re-read `direct_count` of each category, then recompute every
    /// ancestor chain they sit on. Ids that no longer exist are skipped.
    pub(crate) async fn refresh_counts_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        ids: &[&CategoryId],
    ) -> Result<(), CategoryTreeError> {
        let store = &self.ctx.store;

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = store.get(conn, tenant, id).await? {
                rows.push(row);
            }
        }

        // Every direct count first: a chain may cover another touched category
        for row in &rows {
            let direct = self
                .ctx
                .content
                .count_by_category(conn, tenant, &row.id)
                .await?;
            store.set_direct_count(conn, tenant, &row.id, direct).await?;
        }

        for row in &rows {
            store
                .refresh_chain_totals(conn, tenant, row.lft, row.rgt)
                .await?;
        }

        Ok(())
    }
}
