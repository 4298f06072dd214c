//! Tenant-scoped write serialization
//!
//! Two structural operations on the same tenant must never interleave their
//! shift passes. Each tenant gets its own async mutex; a mutating operation
//! holds it for the whole lifetime of its database transaction. Tenants never
//! contend with each other on the in-process lock. SQLite's own write lock
//! (`BEGIN IMMEDIATE`) covers writers in other processes.

use crate::db::database::{begin_immediate, commit, rollback, CategoryDatabase};
use crate::db::error::DatabaseError;
use crate::models::TenantId;
use libsql::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-tenant write locks
#[derive(Default, Clone)]
pub struct TenantLocks {
    locks: Arc<Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock of `tenant`, registering it on first use
    ///
    /// Entries nobody holds or waits on are dropped here, so the registry
    /// stays bounded by the number of tenants with writes in flight.
    fn lock_for(&self, tenant: &TenantId) -> Arc<AsyncMutex<()>> {
        // A poisoned registry only means another thread panicked while inserting;
        // the map itself is still consistent.
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of tenants currently registered
    pub fn registered(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Wait for exclusive write access to `tenant`
    pub async fn acquire(&self, tenant: &TenantId) -> OwnedMutexGuard<()> {
        self.lock_for(tenant).lock_owned().await
    }

    /// Open a write transaction on `tenant`
    ///
    /// Acquires the tenant lock first, then a connection, then SQLite's write
    /// lock. Lock contention from another process surfaces as a
    /// `DatabaseError` whose `is_lock_contention()` is true.
    pub async fn begin(
        &self,
        db: &CategoryDatabase,
        tenant: &TenantId,
    ) -> Result<TenantTransaction, DatabaseError> {
        let guard = self.acquire(tenant).await;
        let conn = db.connect_with_timeout().await?;
        begin_immediate(&conn).await?;

        tracing::trace!(tenant = %tenant, "Tenant transaction opened");

        Ok(TenantTransaction {
            conn,
            tenant: tenant.clone(),
            finished: false,
            _guard: guard,
        })
    }
}

/// An open write transaction holding its tenant's lock
///
/// Finish with `commit()` or `rollback()`. Dropping an unfinished transaction
/// closes its connection, which makes SQLite discard the uncommitted writes.
pub struct TenantTransaction {
    conn: Connection,
    tenant: TenantId,
    finished: bool,
    _guard: OwnedMutexGuard<()>,
}

impl TenantTransaction {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        if let Err(e) = commit(&self.conn).await {
            let _ = rollback(&self.conn).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        rollback(&self.conn).await
    }
}

impl Drop for TenantTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                tenant = %self.tenant,
                "Tenant transaction dropped without commit; changes are discarded"
            );
        }
    }
}
