//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the category tree using libsql (embedded, SQLite-compatible).
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf; parent directories are created
//! - **WAL mode**: Write-Ahead Logging so readers never block on the writer
//! - **Busy timeout**: Writers wait for the lock instead of failing immediately
//! - **Tenant scoping**: Every row carries `tenant_id`; one tree per tenant
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions** so that every
//! connection waits on a locked database instead of failing with `SQLITE_BUSY`
//! straight away.

use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Default busy timeout applied to every connection (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use category_tree_core::db::CategoryDatabase;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = CategoryDatabase::new(PathBuf::from("./data/categories.db")).await?;
///     let conn = db.connect_with_timeout().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CategoryDatabase {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl std::fmt::Debug for CategoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryDatabase")
            .field("db_path", &self.db_path)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

impl CategoryDatabase {
    /// Open (or create) the database at `db_path` with the default busy timeout
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Open (or create) the database at `db_path`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The path is empty or points at a directory
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn with_busy_timeout(
        db_path: PathBuf,
        busy_timeout_ms: u64,
    ) -> Result<Self, DatabaseError> {
        if db_path.as_os_str().is_empty() || db_path.is_dir() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service
            .initialize_schema()
            .await
            .map_err(|e| DatabaseError::initialization_failed(service.db_path.clone(), e))?;

        tracing::debug!(path = %service.db_path.display(), "Category database ready");
        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn
            .prepare(pragma)
            .await
            .map_err(|e| DatabaseError::sql(format!("Failed to prepare '{}'", pragma), e))?;
        let _ = stmt
            .query(())
            .await
            .map_err(|e| DatabaseError::sql(format!("Failed to execute '{}'", pragma), e))?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call on every open.
    ///
    /// # Schema
    ///
    /// - `categories`: one nested-set row per category, keyed by (tenant_id, id)
    /// - `content_items`: content filed under at most one category
    ///
    /// `lft`/`rgt` are indexed but not UNIQUE: SQLite checks uniqueness row by
    /// row inside an UPDATE, which a bulk shift pass would violate transiently.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON").await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                lft INTEGER NOT NULL,
                rgt INTEGER NOT NULL,
                level INTEGER NOT NULL DEFAULT 0,
                direct_count INTEGER NOT NULL DEFAULT 0,
                total_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (tenant_id, id),
                UNIQUE (tenant_id, slug)
            )",
            (),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to create categories table", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS content_items (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                category_id TEXT,
                PRIMARY KEY (tenant_id, id)
            )",
            (),
        )
        .await
        .map_err(|e| DatabaseError::sql("Failed to create content_items table", e))?;

        self.create_core_indexes(&conn).await?;

        Ok(())
    }

    /// Create the indexes every interval query relies on
    async fn create_core_indexes(&self, conn: &Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_categories_lft",
                "CREATE INDEX IF NOT EXISTS idx_categories_lft ON categories(tenant_id, lft)",
            ),
            (
                "idx_categories_rgt",
                "CREATE INDEX IF NOT EXISTS idx_categories_rgt ON categories(tenant_id, rgt)",
            ),
            (
                "idx_content_category",
                "CREATE INDEX IF NOT EXISTS idx_content_category ON content_items(tenant_id, category_id)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ())
                .await
                .map_err(|e| DatabaseError::sql(format!("Failed to create index '{}'", name), e))?;
        }

        Ok(())
    }

    /// Get a raw connection to the database
    ///
    /// Prefer `connect_with_timeout()`; a raw connection fails immediately on
    /// a locked database.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the configured busy timeout applied
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        Ok(conn)
    }

    pub fn busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms
    }
}

/// Open a write transaction, taking SQLite's write lock up front
///
/// `BEGIN IMMEDIATE` makes lock contention surface here, before any row is
/// read, instead of at the first write.
pub async fn begin_immediate(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("BEGIN IMMEDIATE", ())
        .await
        .map_err(|e| DatabaseError::sql("Failed to begin transaction", e))?;
    Ok(())
}

pub async fn commit(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("COMMIT", ())
        .await
        .map_err(|e| DatabaseError::sql("Failed to commit transaction", e))?;
    Ok(())
}

pub async fn rollback(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("ROLLBACK", ())
        .await
        .map_err(|e| DatabaseError::sql("Failed to roll back transaction", e))?;
    Ok(())
}
