//! Bounded retry for storage conflicts
//!
//! The maintainer never retries on its own: a `StorageConflict` means another
//! writer held the database lock past the busy timeout, and only the caller
//! knows whether re-running the operation is wanted. This helper is that
//! re-run, with exponential backoff.
//!
//! # Example
//!
//! ```rust,no_run
//! use category_tree_core::operations::ConflictRetry;
//! use category_tree_core::services::{NestedSetMaintainer, TreeContext};
//! use category_tree_core::config::TreeConfig;
//! use category_tree_core::models::{TenantId, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = TreeContext::open(TreeConfig::default()).await?;
//! let maintainer = NestedSetMaintainer::new(ctx.clone());
//! let retry = ConflictRetry::from_config(&ctx.config);
//! let tenant = TenantId::from("blog");
//! let user = UserId::from("admin");
//!
//! // Up to 3 extra attempts (10ms, 20ms, 40ms)
//! let flattened = retry.run(|| maintainer.reset_all(&tenant, &user)).await?;
//! println!("{} categories flattened", flattened);
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::services::CategoryTreeError;
use std::future::Future;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ConflictRetry {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ConflictRetry {
    /// `max_retries` extra attempts after the first (0 = single attempt)
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(10),
        }
    }

    pub fn from_config(config: &TreeConfig) -> Self {
        Self::new(config.max_conflict_retries)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op`, re-running it on `StorageConflict` only
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, CategoryTreeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CategoryTreeError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(retries = attempt, "Operation succeeded after storage conflict");
                    }
                    return Ok(value);
                }

                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    // Exponential backoff: 10ms, 20ms, 40ms, ...
                    let backoff = self.base_delay * (1u32 << attempt.min(16));
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Storage conflict, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }

                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(max_retries = self.max_retries, error = %e, "Storage conflict retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_storage_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let retry = ConflictRetry::new(3).with_base_delay(Duration::from_millis(1));

        let result = retry
            .run(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CategoryTreeError::storage_conflict("database is locked"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let retry = ConflictRetry::new(2).with_base_delay(Duration::from_millis(1));

        let result: Result<(), _> = retry
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CategoryTreeError::storage_conflict("database is locked"))
            })
            .await;

        assert!(matches!(result, Err(CategoryTreeError::StorageConflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_logical_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let retry = ConflictRetry::default();

        let result: Result<(), _> = retry
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CategoryTreeError::cycle_rejected(&"b".into(), &"d".into()))
            })
            .await;

        assert!(matches!(result, Err(CategoryTreeError::CycleRejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config() {
        let config = TreeConfig {
            max_conflict_retries: 7,
            ..TreeConfig::default()
        };
        assert_eq!(ConflictRetry::from_config(&config).max_retries(), 7);
    }
}
