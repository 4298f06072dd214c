//! CategoryAdmin - one method per admin screen action
//!
//! Thin facade over the maintainer, the reassigner and the view builder. The
//! handlers behind the admin forms call this and nothing else; every action
//! goes through the same permission check, tenant transaction and event
//! reporting as the underlying services.

use crate::config::TreeConfig;
use crate::db::TreeEvent;
use crate::models::{CategoryId, ContentItem, TenantId, UserId};
use crate::operations::{OrderPlan, RawOrderEntry};
use crate::services::{
    CategoryTree, CategoryTreeError, CategoryViewBuilder, ContentReassigner, DeleteSummary,
    IntegrityReport, MoveReport, NestedSetMaintainer, TreeContext,
};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct CategoryAdmin {
    ctx: TreeContext,
    maintainer: NestedSetMaintainer,
    reassigner: ContentReassigner,
    views: CategoryViewBuilder,
}

impl CategoryAdmin {
    pub fn new(ctx: TreeContext) -> Self {
        Self {
            maintainer: NestedSetMaintainer::new(ctx.clone()),
            reassigner: ContentReassigner::new(ctx.clone()),
            views: CategoryViewBuilder::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn open(config: TreeConfig) -> Result<Self, CategoryTreeError> {
        Ok(Self::new(TreeContext::open(config).await?))
    }

    pub fn context(&self) -> &TreeContext {
        &self.ctx
    }

    pub fn maintainer(&self) -> &NestedSetMaintainer {
        &self.maintainer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.ctx.subscribe()
    }

    /// The listing screen
    pub async fn tree(&self, tenant: &TenantId) -> Result<CategoryTree, CategoryTreeError> {
        self.views.build_tree(tenant).await
    }

    /// Integrity check of the current tree; read-only
    pub async fn check(&self, tenant: &TenantId) -> Result<IntegrityReport, CategoryTreeError> {
        let report = self.tree(tenant).await?.check_integrity();
        if !report.is_consistent() {
            tracing::warn!(
                tenant = %tenant,
                violations = report.violations.len(),
                "Category tree failed integrity check"
            );
        }
        Ok(report)
    }

    /// Content filed under `category` (`None` = uncategorized)
    pub async fn items(
        &self,
        tenant: &TenantId,
        category: Option<&CategoryId>,
    ) -> Result<Vec<ContentItem>, CategoryTreeError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        Ok(self.ctx.content.list_items(&conn, tenant, category).await?)
    }

    /// The "add category" form
    pub async fn add(
        &self,
        tenant: &TenantId,
        user: &UserId,
        parent: Option<&CategoryId>,
        title: &str,
        slug: &str,
    ) -> Result<CategoryId, CategoryTreeError> {
        self.maintainer.insert(tenant, user, parent, title, slug).await
    }

    /// The "edit category" form
    pub async fn rename(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        title: &str,
        slug: &str,
    ) -> Result<(), CategoryTreeError> {
        self.maintainer.rename(tenant, user, id, title, slug).await
    }

    /// The drag-and-drop order submission
    pub async fn submit_order(
        &self,
        tenant: &TenantId,
        user: &UserId,
        entries: &[RawOrderEntry],
    ) -> Result<OrderPlan, CategoryTreeError> {
        self.maintainer.submit_order(tenant, user, entries).await
    }

    /// The delete confirmation form
    ///
    /// With `keep_children` only the category itself goes and its children
    /// move up one level; otherwise the whole subtree is removed.
    pub async fn delete(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
        keep_children: bool,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        if keep_children {
            self.maintainer
                .delete_and_promote(tenant, user, id, content_target)
                .await
        } else {
            self.maintainer.delete(tenant, user, id, content_target).await
        }
    }

    /// The "move entries to category" action
    pub async fn move_content(
        &self,
        tenant: &TenantId,
        user: &UserId,
        from: &CategoryId,
        to: Option<&CategoryId>,
    ) -> Result<MoveReport, CategoryTreeError> {
        self.reassigner.move_and_count(tenant, user, from, to).await
    }

    /// Recovery: flatten everything to top level
    pub async fn reset(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        self.maintainer.reset_all(tenant, user).await
    }

    pub async fn recount(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        self.maintainer.recount(tenant, user).await
    }

    pub async fn assign_item(
        &self,
        tenant: &TenantId,
        user: &UserId,
        item_id: &str,
        title: &str,
        category: Option<&CategoryId>,
    ) -> Result<Option<CategoryId>, CategoryTreeError> {
        self.reassigner
            .assign_item(tenant, user, item_id, title, category)
            .await
    }
}
