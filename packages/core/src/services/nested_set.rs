//! NestedSetMaintainer - keeps the interval encoding consistent
//!
//! Every public operation runs the same way:
//!
//! 1. Permission check (no storage touched on denial)
//! 2. Tenant write transaction (`TenantLocks::begin`)
//! 3. Validation against freshly read rows
//! 4. Bulk shift passes and row writes
//! 5. Commit, or rollback on any error
//! 6. One `TreeEvent` with the terminal status
//!
//! The `*_in` methods contain steps 3 and 4 and run on a caller-provided
//! connection, so `apply_order` can chain many of them inside a single
//! transaction.
//!
//! # Interval arithmetic
//!
//! Bounds are only ever moved by shift passes (`bound >= threshold` moves by a
//! delta) and by detaching a block to negative bounds and reattaching it at an
//! offset. No node-by-node walk is needed for any structural change.

use crate::config::ResetOrder;
use crate::db::TreeOperation;
use crate::models::{Category, CategoryId, NewCategory, TenantId, UserId};
use crate::operations::{OrderPlan, OrderSpecParser, PlanStep, RawOrderEntry};
use crate::services::{CategoryTreeError, CategoryViewBuilder, ContentReassigner, TreeContext};
use crate::utils::{normalize_slug, normalize_title};
use libsql::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Sibling position meaning "after the last child"
pub const APPEND: usize = usize::MAX;

/// What a delete removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub removed_categories: u64,
    pub reassigned_items: u64,
}

#[derive(Debug, Clone)]
pub struct NestedSetMaintainer {
    ctx: TreeContext,
    reassigner: ContentReassigner,
}

impl NestedSetMaintainer {
    pub fn new(ctx: TreeContext) -> Self {
        let reassigner = ContentReassigner::new(ctx.clone());
        Self { ctx, reassigner }
    }

    //
    // PUBLIC OPERATIONS
    //

    /// Insert a category as the last child of `parent` (`None` = top level)
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the title is blank or no usable slug can be derived
    /// - `NotFound` if `parent` does not exist
    /// - `DuplicateSlug` if the normalized slug is taken
    pub async fn insert(
        &self,
        tenant: &TenantId,
        user: &UserId,
        parent: Option<&CategoryId>,
        title: &str,
        slug: &str,
    ) -> Result<CategoryId, CategoryTreeError> {
        let result = self.insert_tx(tenant, user, parent, title, slug).await;
        self.ctx.report(
            tenant,
            TreeOperation::Insert {
                category_id: result.as_ref().ok().cloned(),
            },
            &result,
        );
        result
    }

    pub async fn rename(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        title: &str,
        slug: &str,
    ) -> Result<(), CategoryTreeError> {
        let result = self.rename_tx(tenant, user, id, title, slug).await;
        self.ctx.report(
            tenant,
            TreeOperation::Rename {
                category_id: id.clone(),
            },
            &result,
        );
        result
    }

    /// Delete a category with its whole subtree
    ///
    /// Content of every removed category is re-filed under `content_target`,
    /// or left uncategorized when `None`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category or the target does not exist
    /// - `InvalidTarget` if the target lies inside the deleted subtree
    pub async fn delete(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        let result = self.delete_tx(tenant, user, id, content_target, false).await;
        self.ctx.report(
            tenant,
            TreeOperation::Delete {
                category_id: id.clone(),
                keep_children: false,
            },
            &result,
        );
        result
    }

    /// Delete one category, promoting its children into its parent
    ///
    /// Only the category's own content is re-filed. The target may be one of
    /// its (surviving) descendants, but not the category itself.
    pub async fn delete_and_promote(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        let result = self.delete_tx(tenant, user, id, content_target, true).await;
        self.ctx.report(
            tenant,
            TreeOperation::Delete {
                category_id: id.clone(),
                keep_children: true,
            },
            &result,
        );
        result
    }

    /// Move a subtree under `new_parent` (`None` = top level) at sibling
    /// `position`
    ///
    /// `position` counts the new parent's children without the moved category;
    /// 0 is first, anything past the end (e.g. `APPEND`) is last.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category or the new parent does not exist
    /// - `CycleRejected` if the new parent is the category or inside it
    pub async fn move_subtree(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        new_parent: Option<&CategoryId>,
        position: usize,
    ) -> Result<(), CategoryTreeError> {
        let result = self.move_tx(tenant, user, id, new_parent, position).await;
        self.ctx.report(
            tenant,
            TreeOperation::MoveSubtree {
                category_id: id.clone(),
            },
            &result,
        );
        result
    }

    /// Lay out the children of `parent` in exactly `ordered`
    ///
    /// # Errors
    ///
    /// - `NotFound` if `parent` does not exist
    /// - `SetMismatch` if `ordered` is not a permutation of the current children
    pub async fn reorder_siblings(
        &self,
        tenant: &TenantId,
        user: &UserId,
        parent: Option<&CategoryId>,
        ordered: &[CategoryId],
    ) -> Result<(), CategoryTreeError> {
        let result = self.reorder_tx(tenant, user, parent, ordered).await;
        self.ctx.report(
            tenant,
            TreeOperation::ReorderSiblings {
                parent_id: parent.cloned(),
            },
            &result,
        );
        result
    }

    /// Flatten the whole tree to top level, ordered per `TreeConfig::reset_order`
    ///
    /// Returns the number of categories laid out.
    pub async fn reset_all(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        let result = self.reset_tx(tenant, user).await;
        self.ctx.report(tenant, TreeOperation::ResetAll, &result);
        result
    }

    /// Recompute every direct count from the content store and every total
    /// from the intervals
    pub async fn recount(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        let result = self.recount_tx(tenant, user).await;
        self.ctx.report(tenant, TreeOperation::Recount, &result);
        result
    }

    /// Apply a parsed plan in one transaction; any failing step rolls back all
    pub async fn apply_order(
        &self,
        tenant: &TenantId,
        user: &UserId,
        plan: &OrderPlan,
    ) -> Result<(), CategoryTreeError> {
        let result = self.apply_order_tx(tenant, user, plan).await;
        self.ctx.report(
            tenant,
            TreeOperation::ApplyOrder {
                steps: plan.steps.len(),
            },
            &result,
        );
        result
    }

    /// Parse a raw submission against the tree as it is inside the
    /// transaction, then apply it
    pub async fn submit_order(
        &self,
        tenant: &TenantId,
        user: &UserId,
        entries: &[RawOrderEntry],
    ) -> Result<OrderPlan, CategoryTreeError> {
        let result = self.submit_order_tx(tenant, user, entries).await;
        self.ctx.report(
            tenant,
            TreeOperation::ApplyOrder {
                steps: result.as_ref().map(|plan| plan.steps.len()).unwrap_or(0),
            },
            &result,
        );
        result
    }

    //
    // TRANSACTION WRAPPERS
    //

    async fn insert_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        parent: Option<&CategoryId>,
        title: &str,
        slug: &str,
    ) -> Result<CategoryId, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.insert_in(tx.conn(), tenant, parent, title, slug).await;
        self.ctx.finish(tx, result).await
    }

    async fn rename_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        title: &str,
        slug: &str,
    ) -> Result<(), CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.rename_in(tx.conn(), tenant, id, title, slug).await;
        self.ctx.finish(tx, result).await
    }

    async fn delete_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
        keep_children: bool,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = if keep_children {
            self.delete_and_promote_in(tx.conn(), tenant, id, content_target)
                .await
        } else {
            self.delete_in(tx.conn(), tenant, id, content_target).await
        };
        self.ctx.finish(tx, result).await
    }

    async fn move_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        id: &CategoryId,
        new_parent: Option<&CategoryId>,
        position: usize,
    ) -> Result<(), CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self
            .move_subtree_in(tx.conn(), tenant, id, new_parent, position)
            .await;
        self.ctx.finish(tx, result).await
    }

    async fn reorder_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        parent: Option<&CategoryId>,
        ordered: &[CategoryId],
    ) -> Result<(), CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self
            .reorder_siblings_in(tx.conn(), tenant, parent, ordered)
            .await;
        self.ctx.finish(tx, result).await
    }

    async fn reset_tx(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.reset_all_in(tx.conn(), tenant).await;
        self.ctx.finish(tx, result).await
    }

    async fn recount_tx(&self, tenant: &TenantId, user: &UserId) -> Result<usize, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.recount_in(tx.conn(), tenant).await;
        self.ctx.finish(tx, result).await
    }

    async fn apply_order_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        plan: &OrderPlan,
    ) -> Result<(), CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.apply_order_in(tx.conn(), tenant, plan).await;
        self.ctx.finish(tx, result).await
    }

    async fn submit_order_tx(
        &self,
        tenant: &TenantId,
        user: &UserId,
        entries: &[RawOrderEntry],
    ) -> Result<OrderPlan, CategoryTreeError> {
        self.ctx.authorize(tenant, user)?;
        let tx = self.ctx.begin(tenant).await?;
        let result = self.submit_order_in(tx.conn(), tenant, entries).await;
        self.ctx.finish(tx, result).await
    }

    //
    // OPERATIONS ON AN OPEN TRANSACTION
    //

    async fn require(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
    ) -> Result<Category, CategoryTreeError> {
        self.ctx
            .store
            .get(conn, tenant, id)
            .await?
            .ok_or_else(|| CategoryTreeError::not_found(id))
    }

    async fn insert_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        parent: Option<&CategoryId>,
        title: &str,
        slug: &str,
    ) -> Result<CategoryId, CategoryTreeError> {
        let store = &self.ctx.store;
        let (title, slug) = title_and_slug(title, slug)?;

        let parent = match parent {
            Some(id) => Some(self.require(conn, tenant, id).await?),
            None => None,
        };

        if store.slug_exists(conn, tenant, &slug, None).await? {
            return Err(CategoryTreeError::duplicate_slug(slug));
        }

        let (lft, level) = match &parent {
            Some(parent) => {
                store.shift_bounds(conn, tenant, parent.rgt, 2).await?;
                (parent.rgt, parent.level + 1)
            }
            None => (store.max_rgt(conn, tenant).await?.unwrap_or(0) + 1, 0),
        };

        let id = CategoryId::generate();
        store
            .insert(
                conn,
                tenant,
                &NewCategory {
                    id: id.clone(),
                    title,
                    slug,
                    lft,
                    rgt: lft + 1,
                    level,
                },
            )
            .await?;

        tracing::debug!(tenant = %tenant, category = %id, lft, level, "Category inserted");
        Ok(id)
    }

    async fn rename_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        title: &str,
        slug: &str,
    ) -> Result<(), CategoryTreeError> {
        let store = &self.ctx.store;
        let (title, slug) = title_and_slug(title, slug)?;

        self.require(conn, tenant, id).await?;
        if store.slug_exists(conn, tenant, &slug, Some(id)).await? {
            return Err(CategoryTreeError::duplicate_slug(slug));
        }

        store.set_title_slug(conn, tenant, id, &title, &slug).await?;
        Ok(())
    }

    async fn delete_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        let store = &self.ctx.store;
        let node = self.require(conn, tenant, id).await?;

        if let Some(target_id) = content_target {
            let target = self.require(conn, tenant, target_id).await?;
            if node.contains_or_is(&target) {
                return Err(CategoryTreeError::invalid_target(id, target_id));
            }
        }

        let parent = store.parent_of(conn, tenant, &node).await?;
        let subtree = store.subtree(conn, tenant, &node).await?;

        let mut reassigned_items = 0;
        for row in &subtree {
            reassigned_items += self
                .reassigner
                .reassign_items_in(conn, tenant, &row.id, content_target)
                .await?;
        }

        let removed_categories = store.delete_block(conn, tenant, node.lft, node.rgt).await?;
        store
            .shift_bounds(conn, tenant, node.rgt + 1, -node.width())
            .await?;

        let mut touched: Vec<&CategoryId> = Vec::new();
        touched.extend(parent.as_ref().map(|p| &p.id));
        touched.extend(content_target);
        self.reassigner
            .refresh_counts_in(conn, tenant, &touched)
            .await?;

        tracing::debug!(
            tenant = %tenant,
            category = %id,
            removed_categories,
            reassigned_items,
            gap = node.width(),
            "Subtree deleted"
        );
        Ok(DeleteSummary {
            removed_categories,
            reassigned_items,
        })
    }

    async fn delete_and_promote_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        content_target: Option<&CategoryId>,
    ) -> Result<DeleteSummary, CategoryTreeError> {
        let store = &self.ctx.store;
        let node = self.require(conn, tenant, id).await?;

        if let Some(target_id) = content_target {
            if target_id == id {
                return Err(CategoryTreeError::invalid_target(id, target_id));
            }
            self.require(conn, tenant, target_id).await?;
        }

        let parent = store.parent_of(conn, tenant, &node).await?;
        let reassigned_items = self
            .reassigner
            .reassign_items_in(conn, tenant, id, content_target)
            .await?;

        let removed_categories = store.delete_row(conn, tenant, id).await?;
        store.lift_interior(conn, tenant, node.lft, node.rgt).await?;
        store.shift_bounds(conn, tenant, node.rgt + 1, -2).await?;

        let mut touched: Vec<&CategoryId> = Vec::new();
        touched.extend(parent.as_ref().map(|p| &p.id));
        touched.extend(content_target);
        self.reassigner
            .refresh_counts_in(conn, tenant, &touched)
            .await?;

        tracing::debug!(
            tenant = %tenant,
            category = %id,
            promoted = node.descendant_count(),
            reassigned_items,
            "Category deleted, children promoted"
        );
        Ok(DeleteSummary {
            removed_categories,
            reassigned_items,
        })
    }

    pub(crate) async fn move_subtree_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        id: &CategoryId,
        new_parent: Option<&CategoryId>,
        position: usize,
    ) -> Result<(), CategoryTreeError> {
        let store = &self.ctx.store;
        let node = self.require(conn, tenant, id).await?;

        if let Some(parent_id) = new_parent {
            let parent = self.require(conn, tenant, parent_id).await?;
            if node.contains_or_is(&parent) {
                return Err(CategoryTreeError::cycle_rejected(id, parent_id));
            }
        }

        let old_parent = store.parent_of(conn, tenant, &node).await?;
        let width = node.width();

        // Park the block and close its gap
        store.detach_block(conn, tenant, node.lft, node.rgt, 0).await?;
        store.shift_bounds(conn, tenant, node.rgt + 1, -width).await?;

        // Insertion point in the closed-up tree
        let (target, new_level) = match new_parent {
            Some(parent_id) => {
                let parent = self.require(conn, tenant, parent_id).await?;
                let siblings = store.children(conn, tenant, Some(&parent)).await?;
                let target = siblings.get(position).map(|s| s.lft).unwrap_or(parent.rgt);
                (target, parent.level + 1)
            }
            None => {
                let siblings = store.children(conn, tenant, None).await?;
                let target = match siblings.get(position) {
                    Some(sibling) => sibling.lft,
                    None => store.max_rgt(conn, tenant).await?.unwrap_or(0) + 1,
                };
                (target, 0)
            }
        };

        // Open the gap and drop the block into it
        store.shift_bounds(conn, tenant, target, width).await?;
        store
            .reattach_detached(conn, tenant, target - node.lft, new_level - node.level)
            .await?;

        let mut touched: Vec<&CategoryId> = Vec::new();
        touched.extend(old_parent.as_ref().map(|p| &p.id));
        touched.extend(new_parent);
        self.reassigner
            .refresh_counts_in(conn, tenant, &touched)
            .await?;

        tracing::debug!(
            tenant = %tenant,
            category = %id,
            new_parent = ?new_parent,
            from_lft = node.lft,
            to_lft = target,
            level_delta = new_level - node.level,
            "Subtree moved"
        );
        Ok(())
    }

    pub(crate) async fn reorder_siblings_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        parent: Option<&CategoryId>,
        ordered: &[CategoryId],
    ) -> Result<(), CategoryTreeError> {
        let store = &self.ctx.store;
        let parent_row = match parent {
            Some(id) => Some(self.require(conn, tenant, id).await?),
            None => None,
        };
        let children = store.children(conn, tenant, parent_row.as_ref()).await?;
        let parent_label = parent.map(|p| p.to_string()).unwrap_or_else(|| "the top level".to_string());

        if ordered.len() != children.len() {
            return Err(CategoryTreeError::set_mismatch(format!(
                "{} has {} children, {} were submitted",
                parent_label,
                children.len(),
                ordered.len()
            )));
        }

        let by_id: HashMap<&CategoryId, &Category> = children.iter().map(|c| (&c.id, c)).collect();
        let mut seen = HashSet::new();
        for id in ordered {
            if !seen.insert(id) {
                return Err(CategoryTreeError::set_mismatch(format!("{} is listed twice", id)));
            }
            if !by_id.contains_key(id) {
                return Err(CategoryTreeError::set_mismatch(format!(
                    "{} is not a child of {}",
                    id, parent_label
                )));
            }
        }

        if children.iter().map(|c| &c.id).eq(ordered.iter()) {
            return Ok(());
        }

        // Children are contiguous: lay them out again from the first one's lft
        let mut cursor = children[0].lft;
        for id in ordered {
            let child = by_id[id];
            store
                .detach_block(conn, tenant, child.lft, child.rgt, cursor - child.lft)
                .await?;
            cursor += child.width();
        }
        store.reattach_detached(conn, tenant, 0, 0).await?;

        tracing::debug!(tenant = %tenant, parent = %parent_label, children = ordered.len(), "Siblings reordered");
        Ok(())
    }

    async fn reset_all_in(&self, conn: &Connection, tenant: &TenantId) -> Result<usize, CategoryTreeError> {
        let store = &self.ctx.store;
        let mut rows = store.load_all(conn, tenant).await?;

        match self.ctx.config.reset_order {
            ResetOrder::Title => rows.sort_by(|a, b| {
                a.title
                    .to_lowercase()
                    .cmp(&b.title.to_lowercase())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            ResetOrder::Id => rows.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        for (i, row) in rows.iter().enumerate() {
            let lft = 2 * i as i64 + 1;
            store.set_position(conn, tenant, &row.id, lft, lft + 1, 0).await?;
        }
        store.refresh_all_totals(conn, tenant).await?;

        tracing::debug!(tenant = %tenant, categories = rows.len(), order = ?self.ctx.config.reset_order, "Tree flattened");
        Ok(rows.len())
    }

    async fn recount_in(&self, conn: &Connection, tenant: &TenantId) -> Result<usize, CategoryTreeError> {
        let store = &self.ctx.store;
        let rows = store.load_all(conn, tenant).await?;

        let mut corrected = 0;
        for row in &rows {
            let direct = self.ctx.content.count_by_category(conn, tenant, &row.id).await?;
            if direct != row.direct_count {
                store.set_direct_count(conn, tenant, &row.id, direct).await?;
                corrected += 1;
            }
        }
        store.refresh_all_totals(conn, tenant).await?;

        tracing::debug!(tenant = %tenant, categories = rows.len(), corrected, "Counts recomputed");
        Ok(rows.len())
    }

    async fn apply_order_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        plan: &OrderPlan,
    ) -> Result<(), CategoryTreeError> {
        for (i, step) in plan.steps.iter().enumerate() {
            tracing::debug!(tenant = %tenant, step = i, ?step, "Applying order step");
            match step {
                PlanStep::MoveSubtree {
                    category_id,
                    new_parent,
                } => {
                    self.move_subtree_in(conn, tenant, category_id, new_parent.as_ref(), APPEND)
                        .await?
                }
                PlanStep::ReorderSiblings { parent, children } => {
                    self.reorder_siblings_in(conn, tenant, parent.as_ref(), children)
                        .await?
                }
            }
        }
        Ok(())
    }

    async fn submit_order_in(
        &self,
        conn: &Connection,
        tenant: &TenantId,
        entries: &[RawOrderEntry],
    ) -> Result<OrderPlan, CategoryTreeError> {
        let tree = CategoryViewBuilder::build_tree_in(conn, &self.ctx.store, tenant).await?;
        let plan = OrderSpecParser::parse(entries, &tree)?;
        self.apply_order_in(conn, tenant, &plan).await?;
        Ok(plan)
    }
}

/// Trimmed title and normalized slug, the slug falling back to the title
fn title_and_slug(title: &str, slug: &str) -> Result<(String, String), CategoryTreeError> {
    let title = normalize_title(title)
        .ok_or_else(|| CategoryTreeError::invalid_input("title must not be empty"))?;

    let mut slug = normalize_slug(slug);
    if slug.is_empty() {
        slug = normalize_slug(&title);
    }
    if slug.is_empty() {
        return Err(CategoryTreeError::invalid_input(format!(
            "no URL-safe slug can be derived from '{}'",
            title
        )));
    }

    Ok((title, slug))
}
