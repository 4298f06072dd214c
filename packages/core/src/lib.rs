//! Category Tree Core
//!
//! Maintains a per-tenant hierarchy of content categories stored as a nested
//! set: every category owns an integer interval `[lft, rgt]` and descendants
//! sit strictly inside their ancestors' intervals.
//!
//! # Architecture
//!
//! - **Nested Set Encoding**: subtree, ancestor and ordering queries are plain
//!   range comparisons; structural changes are bulk bound shifts
//! - **libsql**: embedded SQLite-compatible database, one write transaction
//!   per operation, serialized per tenant
//! - **Recomputed Counters**: `direct_count` comes from the content store,
//!   `total_count` is always re-derived from the intervals, never nudged
//! - **Events**: every mutating operation reports its terminal status on a
//!   broadcast channel
//!
//! # Modules
//!
//! - [`models`] - Data structures (Category, CategoryId, ContentItem, ...)
//! - [`db`] - Database layer: schema, category store, content store, tenant locks
//! - [`services`] - Maintainer, content reassigner, view builder, admin facade
//! - [`operations`] - Order submission parsing, conflict retry
//! - [`config`] - `TreeConfig` and environment overrides
//! - [`utils`] - Slug and title normalization

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{ResetOrder, TreeConfig};
pub use models::*;
pub use operations::{ConflictRetry, OrderPlan, OrderSpecParser, PlanStep, RawOrderEntry};
pub use services::*;
