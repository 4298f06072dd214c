//! Service Layer Error Types
//!
//! This module defines the error kinds every category tree operation can
//! fail with. All of them are detected before any write, so an `Err` always
//! means the tenant's tree is exactly as it was before the call.

use crate::db::DatabaseError;
use crate::models::{CategoryId, TenantId, UserId};
use thiserror::Error;

/// Category tree operation errors
#[derive(Error, Debug)]
pub enum CategoryTreeError {
    /// Category does not exist in the tenant
    #[error("Category not found: {id}")]
    NotFound { id: CategoryId },

    /// A submitted order entry references an id the tenant does not have
    #[error("Unknown item in submitted order: {id}")]
    UnknownItem { id: String },

    #[error("Slug '{slug}' is already used by another category")]
    DuplicateSlug { slug: String },

    /// Content target would be destroyed (or is the deleted category itself)
    #[error("Invalid content target {target} for deleting {category}")]
    InvalidTarget {
        category: CategoryId,
        target: CategoryId,
    },

    /// The new parent lies inside the subtree being moved
    #[error("Cannot move {category} under {new_parent}: the new parent is inside the moved subtree")]
    CycleRejected {
        category: CategoryId,
        new_parent: CategoryId,
    },

    /// Reorder list is not exactly the current child set
    #[error("Submitted children do not match the current children: {context}")]
    SetMismatch { context: String },

    #[error("Malformed order submission: {context}")]
    MalformedOrder { context: String },

    #[error("User {user} may not manage categories of tenant {tenant}")]
    PermissionDenied { tenant: TenantId, user: UserId },

    /// Another writer held the database lock; safe to retry
    #[error("Storage conflict: {context}")]
    StorageConflict { context: String },

    /// Empty title or unusable slug
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[source] DatabaseError),
}

impl CategoryTreeError {
    /// Create a not found error
    pub fn not_found(id: &CategoryId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Create an unknown item error
    pub fn unknown_item(id: impl Into<String>) -> Self {
        Self::UnknownItem { id: id.into() }
    }

    /// Create a duplicate slug error
    pub fn duplicate_slug(slug: impl Into<String>) -> Self {
        Self::DuplicateSlug { slug: slug.into() }
    }

    /// Create an invalid target error
    pub fn invalid_target(category: &CategoryId, target: &CategoryId) -> Self {
        Self::InvalidTarget {
            category: category.clone(),
            target: target.clone(),
        }
    }

    /// Create a cycle rejected error
    pub fn cycle_rejected(category: &CategoryId, new_parent: &CategoryId) -> Self {
        Self::CycleRejected {
            category: category.clone(),
            new_parent: new_parent.clone(),
        }
    }

    /// Create a set mismatch error
    pub fn set_mismatch(context: impl Into<String>) -> Self {
        Self::SetMismatch {
            context: context.into(),
        }
    }

    /// Create a malformed order error
    pub fn malformed_order(context: impl Into<String>) -> Self {
        Self::MalformedOrder {
            context: context.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(tenant: &TenantId, user: &UserId) -> Self {
        Self::PermissionDenied {
            tenant: tenant.clone(),
            user: user.clone(),
        }
    }

    /// Create a storage conflict error
    pub fn storage_conflict(context: impl Into<String>) -> Self {
        Self::StorageConflict {
            context: context.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True only for `StorageConflict`; every other kind is a logical fault
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict { .. })
    }
}

impl From<DatabaseError> for CategoryTreeError {
    fn from(err: DatabaseError) -> Self {
        if err.is_lock_contention() {
            Self::storage_conflict(err.to_string())
        } else {
            Self::Database(err)
        }
    }
}
