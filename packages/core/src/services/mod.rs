//! Business Services
//!
//! This module contains the category tree services:
//!
//! - `NestedSetMaintainer` - insert, rename, delete, move, reorder, reset, recount
//! - `ContentReassigner` - re-files content and keeps direct/total counts current
//! - `CategoryViewBuilder` - read path, builds a `CategoryTree` for display
//! - `CategoryAdmin` - the surface the admin screens call, one method per action
//!
//! Every service shares one `TreeContext`: database, stores, permission
//! checker, tenant locks and the event channel.

pub mod admin;
pub mod content_reassigner;
pub mod error;
pub mod integrity;
pub mod nested_set;
pub mod permissions;
pub mod view_builder;

pub use admin::CategoryAdmin;
pub use content_reassigner::{ContentReassigner, MoveReport, ReassignOutcome};
pub use error::CategoryTreeError;
pub use integrity::{IntegrityReport, IntegrityViolation};
pub use nested_set::{DeleteSummary, NestedSetMaintainer, APPEND};
pub use permissions::{AllowAll, PermissionChecker, StaticPermissions};
pub use view_builder::{CategoryTree, CategoryViewBuilder, TreeEntry};

use crate::config::TreeConfig;
use crate::db::{
    CategoryDatabase, CategoryStore, ContentStore, OperationOutcome, SqliteContentStore,
    TenantLocks, TenantTransaction, TreeEvent, TreeOperation,
};
use crate::models::{TenantId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared wiring for every category tree service
///
/// Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct TreeContext {
    pub db: CategoryDatabase,
    pub store: CategoryStore,
    pub content: Arc<dyn ContentStore>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub locks: TenantLocks,
    pub config: TreeConfig,
    event_tx: broadcast::Sender<TreeEvent>,
}

impl std::fmt::Debug for TreeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeContext")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish()
    }
}

impl TreeContext {
    /// Wire services around an open database
    ///
    /// Defaults to the `content_items` table as content store and grants every
    /// permission; override with `with_content_store` / `with_permissions`.
    pub fn new(db: CategoryDatabase, config: TreeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            db,
            store: CategoryStore::new(),
            content: Arc::new(SqliteContentStore::new()),
            permissions: Arc::new(AllowAll),
            locks: TenantLocks::new(),
            config,
            event_tx,
        }
    }

    /// Open the database named by `config` and wire services around it
    pub async fn open(config: TreeConfig) -> Result<Self, CategoryTreeError> {
        let db =
            CategoryDatabase::with_busy_timeout(config.database_path.clone(), config.busy_timeout_ms)
                .await?;
        Ok(Self::new(db, config))
    }

    pub fn with_content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = content;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Subscribe to the terminal status of every mutating operation
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn authorize(&self, tenant: &TenantId, user: &UserId) -> Result<(), CategoryTreeError> {
        if self.permissions.has_category_manage_permission(tenant, user) {
            Ok(())
        } else {
            Err(CategoryTreeError::permission_denied(tenant, user))
        }
    }

    /// Open a write transaction holding the tenant lock
    pub(crate) async fn begin(&self, tenant: &TenantId) -> Result<TenantTransaction, CategoryTreeError> {
        Ok(self.locks.begin(&self.db, tenant).await?)
    }

    /// Commit on success, roll back on failure
    pub(crate) async fn finish<T>(
        &self,
        tx: TenantTransaction,
        result: Result<T, CategoryTreeError>,
    ) -> Result<T, CategoryTreeError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let tenant = tx.tenant().clone();
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(tenant = %tenant, error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(tenant = %tenant, error = %e, "Operation rolled back");
                Err(e)
            }
        }
    }

    /// Publish the terminal status of an operation
    ///
    /// Ignores send errors: having no subscriber is normal.
    pub(crate) fn report<T>(
        &self,
        tenant: &TenantId,
        operation: TreeOperation,
        result: &Result<T, CategoryTreeError>,
    ) {
        let outcome = match result {
            Ok(_) => {
                tracing::info!(tenant = %tenant, operation = operation.name(), "Category operation committed");
                OperationOutcome::Succeeded
            }
            Err(e) => OperationOutcome::Failed {
                reason: e.to_string(),
                retryable: e.is_retryable(),
            },
        };

        let _ = self.event_tx.send(TreeEvent {
            tenant_id: tenant.clone(),
            operation,
            outcome,
        });
    }
}
