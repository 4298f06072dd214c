//! Order submission parsing
//!
//! The admin tree widget submits the whole tree after a drag-and-drop as a
//! flat list of `(id, left, right)` entries in document order. The numbers are
//! hints from the client, not bounds to store: only the nesting they imply is
//! used. `OrderSpecParser::parse` validates that nesting against the current
//! tree and turns it into the moves and reorders that produce it.
//!
//! # Plan shape
//!
//! 1. One `MoveSubtree` (append to the new parent) per entry whose parent
//!    changes, in document order. Parents precede their children in document
//!    order, so every move targets a parent that already sits where it belongs.
//! 2. One `ReorderSiblings` per parent whose resulting child order differs
//!    from the submitted one.
//!
//! Categories absent from the submission keep their parent and follow the
//! submitted siblings in their current relative order.

use crate::models::CategoryId;
use crate::services::{CategoryTree, CategoryTreeError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One submitted entry, as loosely typed as the client sends it
///
/// Numbers may arrive as JSON numbers or numeric strings; empty strings and
/// unparsable values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrderEntry {
    #[serde(default, alias = "id", alias = "itemId", deserialize_with = "lenient_id")]
    pub item_id: Option<String>,

    #[serde(default, alias = "lft", deserialize_with = "lenient_number")]
    pub left: Option<i64>,

    #[serde(default, alias = "rgt", deserialize_with = "lenient_number")]
    pub right: Option<i64>,
}

impl RawOrderEntry {
    pub fn new(item_id: impl Into<String>, left: i64, right: i64) -> Self {
        Self {
            item_id: Some(item_id.into()),
            left: Some(left),
            right: Some(right),
        }
    }

    fn complete(&self) -> Option<(&str, i64, i64)> {
        match (&self.item_id, self.left, self.right) {
            (Some(id), Some(left), Some(right)) => Some((id.as_str(), left, right)),
            _ => None,
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// One maintainer call of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PlanStep {
    /// Move a subtree to the end of `new_parent`'s children (`None` = top level)
    MoveSubtree {
        category_id: CategoryId,
        new_parent: Option<CategoryId>,
    },
    ReorderSiblings {
        parent: Option<CategoryId>,
        children: Vec<CategoryId>,
    },
}

/// Validated result of an order submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlan {
    pub steps: Vec<PlanStep>,
    /// Incomplete entries that were ignored
    pub skipped: usize,
}

impl OrderPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// An entry that passed the completeness filter
struct Entry {
    id: CategoryId,
    left: i64,
    right: i64,
}

pub struct OrderSpecParser;

impl OrderSpecParser {
    /// Validate a submission against `tree` and plan the calls that realize it
    ///
    /// # Errors
    ///
    /// - `UnknownItem` if an entry names a category the tree does not have
    /// - `MalformedOrder` if the entries do not describe a proper nesting
    pub fn parse(
        entries: &[RawOrderEntry],
        tree: &CategoryTree,
    ) -> Result<OrderPlan, CategoryTreeError> {
        let complete: Vec<Entry> = entries
            .iter()
            .filter_map(RawOrderEntry::complete)
            .map(|(id, left, right)| Entry {
                id: CategoryId::from(id),
                left,
                right,
            })
            .collect();
        let skipped = entries.len() - complete.len();
        if skipped > 0 {
            tracing::debug!(skipped, "Ignoring incomplete order entries");
        }

        for entry in &complete {
            if tree.find(&entry.id).is_none() {
                return Err(CategoryTreeError::unknown_item(entry.id.as_str()));
            }
        }

        let desired_parents = Self::derive_nesting(&complete)?;
        let steps = Self::plan(&complete, &desired_parents, tree);

        tracing::debug!(
            entries = complete.len(),
            steps = steps.len(),
            "Order submission parsed"
        );
        Ok(OrderPlan { steps, skipped })
    }

    /// Parent of every entry (index into `entries`) implied by the intervals
    fn derive_nesting(entries: &[Entry]) -> Result<Vec<Option<usize>>, CategoryTreeError> {
        let mut parents = Vec::with_capacity(entries.len());
        let mut stack: Vec<usize> = Vec::new();
        let mut seen = HashSet::new();
        let mut previous_left: Option<i64> = None;

        for (i, entry) in entries.iter().enumerate() {
            if entry.left >= entry.right {
                return Err(CategoryTreeError::malformed_order(format!(
                    "{} has left {} not below right {}",
                    entry.id, entry.left, entry.right
                )));
            }
            if let Some(previous) = previous_left {
                if entry.left <= previous {
                    return Err(CategoryTreeError::malformed_order(format!(
                        "{} opens at {} but the previous entry opens at {}",
                        entry.id, entry.left, previous
                    )));
                }
            }
            previous_left = Some(entry.left);

            if !seen.insert(&entry.id) {
                return Err(CategoryTreeError::malformed_order(format!(
                    "{} is listed more than once",
                    entry.id
                )));
            }

            while let Some(&top) = stack.last() {
                if entries[top].right < entry.left {
                    stack.pop();
                } else {
                    break;
                }
            }

            let parent = stack.last().copied();
            if let Some(p) = parent {
                if entry.right >= entries[p].right {
                    return Err(CategoryTreeError::malformed_order(format!(
                        "{} overlaps {} without being inside it",
                        entry.id, entries[p].id
                    )));
                }
            }

            parents.push(parent);
            stack.push(i);
        }

        Ok(parents)
    }

    fn plan(entries: &[Entry], desired_parents: &[Option<usize>], tree: &CategoryTree) -> Vec<PlanStep> {
        let desired: Vec<Option<&CategoryId>> = desired_parents
            .iter()
            .map(|p| p.map(|p| &entries[p].id))
            .collect();
        let mentioned: HashMap<&CategoryId, usize> =
            entries.iter().enumerate().map(|(i, e)| (&e.id, i)).collect();

        let mut steps = Vec::new();
        let mut moved_in: HashMap<Option<&CategoryId>, Vec<&CategoryId>> = HashMap::new();

        for (entry, new_parent) in entries.iter().zip(&desired) {
            let current = tree.parent_of(&entry.id).map(|c| &c.id);
            if current != *new_parent {
                steps.push(PlanStep::MoveSubtree {
                    category_id: entry.id.clone(),
                    new_parent: new_parent.cloned(),
                });
                moved_in.entry(*new_parent).or_default().push(&entry.id);
            }
        }

        // Every parent that receives submitted children, in document order
        let mut parents: Vec<Option<&CategoryId>> = Vec::new();
        for parent in &desired {
            if !parents.contains(parent) {
                parents.push(*parent);
            }
        }

        for parent in parents {
            let current: Vec<&CategoryId> = tree.children_of(parent).into_iter().map(|c| &c.id).collect();

            // What the tree holds once every move has appended its subtree
            let mut after_moves: Vec<&CategoryId> = current
                .iter()
                .copied()
                .filter(|id| match mentioned.get(id) {
                    Some(&i) => desired[i] == parent,
                    None => true,
                })
                .collect();
            after_moves.extend(moved_in.get(&parent).into_iter().flatten().copied());

            // What the submission asks for
            let mut requested: Vec<&CategoryId> = entries
                .iter()
                .zip(&desired)
                .filter(|(_, p)| **p == parent)
                .map(|(e, _)| &e.id)
                .collect();
            requested.extend(current.iter().copied().filter(|id| !mentioned.contains_key(id)));

            if requested != after_moves {
                steps.push(PlanStep::ReorderSiblings {
                    parent: parent.cloned(),
                    children: requested.into_iter().cloned().collect(),
                });
            }
        }

        steps
    }
}
