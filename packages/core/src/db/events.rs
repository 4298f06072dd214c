//! Tree Events
//!
//! Every mutating operation ends in exactly one `TreeEvent` carrying its
//! terminal status. The UI layer subscribes to turn these into flash
//! messages; nothing in the core depends on anyone listening.
//!
//! Events are delivered over a tokio broadcast channel, so any number of
//! subscribers receive them asynchronously. Slow subscribers may lag and miss
//! events; only the latest state matters to them.

use crate::models::{CategoryId, TenantId};
use serde::{Deserialize, Serialize};

/// The administrative action an event reports on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeOperation {
    Insert {
        #[serde(skip_serializing_if = "Option::is_none")]
        category_id: Option<CategoryId>,
    },
    Rename {
        category_id: CategoryId,
    },
    Delete {
        category_id: CategoryId,
        keep_children: bool,
    },
    MoveSubtree {
        category_id: CategoryId,
    },
    ReorderSiblings {
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_id: Option<CategoryId>,
    },
    ApplyOrder {
        steps: usize,
    },
    ResetAll,
    Recount,
    MoveContent {
        from: CategoryId,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<CategoryId>,
    },
    AssignItem {
        item_id: String,
    },
}

impl TreeOperation {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Rename { .. } => "rename",
            Self::Delete { .. } => "delete",
            Self::MoveSubtree { .. } => "move_subtree",
            Self::ReorderSiblings { .. } => "reorder_siblings",
            Self::ApplyOrder { .. } => "apply_order",
            Self::ResetAll => "reset_all",
            Self::Recount => "recount",
            Self::MoveContent { .. } => "move_content",
            Self::AssignItem { .. } => "assign_item",
        }
    }
}

/// Terminal status of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OperationOutcome {
    Succeeded,
    Failed { reason: String, retryable: bool },
}

/// Event emitted once a mutating operation has committed or rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEvent {
    pub tenant_id: TenantId,
    pub operation: TreeOperation,
    pub outcome: OperationOutcome,
}

impl TreeEvent {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, OperationOutcome::Succeeded)
    }
}
