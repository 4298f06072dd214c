//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization, schema and connection management
//! - Row-level SQL for the nested-set `categories` table
//! - The content store the tree counts against
//! - Per-tenant write transactions
//! - Tree events for the notification sink
//!
//! # Architecture
//!
//! One embedded SQLite-compatible file holds every tenant's tree. Rows are
//! always scoped by `tenant_id`; a tenant never sees or locks another
//! tenant's rows.

mod category_store;
mod content_store;
mod database;
mod error;
pub mod events;
mod tenant_lock;

pub use category_store::CategoryStore;
pub use content_store::{ContentStore, SqliteContentStore};
pub use database::{begin_immediate, commit, rollback, CategoryDatabase, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::DatabaseError;
pub use events::{OperationOutcome, TreeEvent, TreeOperation};
pub use tenant_lock::{TenantLocks, TenantTransaction};
