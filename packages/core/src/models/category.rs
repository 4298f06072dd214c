//! Category Model
//!
//! A category is one row of a tenant's nested-set tree. The interval
//! `[lft, rgt]` encodes the hierarchy: a category is an ancestor of another
//! exactly when its interval strictly contains the other's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Isolation boundary: one blog/site owns exactly one category tree
    TenantId
);

string_id!(
    /// Operator performing an administrative action
    UserId
);

string_id!(
    /// Category identifier, unique within its tenant
    CategoryId
);

impl CategoryId {
    /// Generate a fresh random identifier for a new category
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// One persisted category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub tenant_id: TenantId,
    pub id: CategoryId,
    pub title: String,
    pub slug: String,
    pub lft: i64,
    pub rgt: i64,
    /// Number of categories whose interval strictly contains this one
    pub level: i64,
    pub direct_count: i64,
    pub total_count: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Category {
    /// Number of interval units occupied by this category and its descendants
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// True when `other` lies strictly inside this category's interval
    pub fn contains(&self, other: &Category) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    /// True when `other` is this category or one of its descendants
    pub fn contains_or_is(&self, other: &Category) -> bool {
        self.lft <= other.lft && other.rgt <= self.rgt
    }

    pub fn is_leaf(&self) -> bool {
        self.rgt == self.lft + 1
    }

    /// Number of descendants, derived from the interval width
    pub fn descendant_count(&self) -> i64 {
        (self.width() - 2) / 2
    }

    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            category_id: self.id.clone(),
            direct_count: self.direct_count,
            total_count: self.total_count,
        }
    }
}

/// Validated payload for inserting a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub id: CategoryId,
    pub title: String,
    pub slug: String,
    pub lft: i64,
    pub rgt: i64,
    pub level: i64,
}

/// Content counters of one category after a count refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub category_id: CategoryId,
    pub direct_count: i64,
    pub total_count: i64,
}
