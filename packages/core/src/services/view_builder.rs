//! CategoryViewBuilder - the read path
//!
//! One ordered read of every category sorted by `lft` is exactly the preorder
//! traversal of the tree, so the view needs no recursive queries. The
//! resulting `CategoryTree` answers structural questions (children,
//! descendants, ancestors) by comparing intervals in memory.

use crate::db::CategoryStore;
use crate::models::{Category, CategoryId, TenantId};
use crate::services::{CategoryTreeError, TreeContext};
use libsql::Connection;
use std::collections::HashMap;

/// One row of the display sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry<'a> {
    pub category: &'a Category,
    /// Indentation depth, 0 for top-level categories
    pub level: i64,
}

/// In-memory snapshot of one tenant's tree, in preorder
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    categories: Vec<Category>,
    /// Index of the innermost container of each row
    parents: Vec<Option<usize>>,
    index: HashMap<CategoryId, usize>,
}

impl CategoryTree {
    /// Build a snapshot from rows in any order
    pub fn from_rows(mut categories: Vec<Category>) -> Self {
        categories.sort_by_key(|c| c.lft);

        let mut parents = Vec::with_capacity(categories.len());
        let mut stack: Vec<usize> = Vec::new();
        for (i, category) in categories.iter().enumerate() {
            while let Some(&top) = stack.last() {
                if categories[top].rgt < category.lft {
                    stack.pop();
                } else {
                    break;
                }
            }
            parents.push(stack.last().copied());
            stack.push(i);
        }

        let index = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        Self {
            categories,
            parents,
            index,
        }
    }

    /// Preorder display sequence; restartable, each call walks from the start
    pub fn iter(&self) -> impl Iterator<Item = TreeEntry<'_>> + '_ {
        self.categories.iter().map(|category| TreeEntry {
            category,
            level: category.level,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn find(&self, id: &CategoryId) -> Option<&Category> {
        self.index.get(id).map(|&i| &self.categories[i])
    }

    /// Innermost category containing `id`, `None` for top-level categories
    pub fn parent_of(&self, id: &CategoryId) -> Option<&Category> {
        let i = *self.index.get(id)?;
        self.parents[i].map(|p| &self.categories[p])
    }

    /// Direct children of `parent` (`None` = the implicit root), in order
    pub fn children_of(&self, parent: Option<&CategoryId>) -> Vec<&Category> {
        let parent_index = match parent {
            Some(id) => match self.index.get(id) {
                Some(&i) => Some(i),
                None => return Vec::new(),
            },
            None => None,
        };

        self.categories
            .iter()
            .zip(&self.parents)
            .filter(|(_, p)| **p == parent_index)
            .map(|(c, _)| c)
            .collect()
    }

    /// Every category strictly inside `id`'s interval, in preorder
    pub fn descendants_of(&self, id: &CategoryId) -> Vec<&Category> {
        let Some(node) = self.find(id) else {
            return Vec::new();
        };
        self.categories
            .iter()
            .filter(|c| node.contains(c))
            .collect()
    }

    /// Every category strictly containing `id`, outermost first
    pub fn ancestors_of(&self, id: &CategoryId) -> Vec<&Category> {
        let Some(node) = self.find(id) else {
            return Vec::new();
        };
        self.categories
            .iter()
            .filter(|c| c.contains(node))
            .collect()
    }

    /// Content items filed anywhere in the tree
    pub fn total_content(&self) -> i64 {
        self.categories.iter().map(|c| c.direct_count).sum()
    }

    /// Parent index per row, aligned with `categories()`
    pub(crate) fn parent_indices(&self) -> &[Option<usize>] {
        &self.parents
    }
}

impl<'a> IntoIterator for &'a CategoryTree {
    type Item = TreeEntry<'a>;
    type IntoIter = Box<dyn Iterator<Item = TreeEntry<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Builds `CategoryTree` snapshots for display
#[derive(Debug, Clone)]
pub struct CategoryViewBuilder {
    ctx: TreeContext,
}

impl CategoryViewBuilder {
    pub fn new(ctx: TreeContext) -> Self {
        Self { ctx }
    }

    /// Read the tenant's tree without taking the tenant write lock
    pub async fn build_tree(&self, tenant: &TenantId) -> Result<CategoryTree, CategoryTreeError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let tree = Self::build_tree_in(&conn, &self.ctx.store, tenant).await?;
        tracing::debug!(tenant = %tenant, categories = tree.len(), "Built category tree");
        Ok(tree)
    }

    pub(crate) async fn build_tree_in(
        conn: &Connection,
        store: &CategoryStore,
        tenant: &TenantId,
    ) -> Result<CategoryTree, CategoryTreeError> {
        let rows = store.load_all(conn, tenant).await?;
        Ok(CategoryTree::from_rows(rows))
    }
}
