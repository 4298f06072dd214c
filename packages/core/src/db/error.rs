//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// SQLite primary result codes signalling write-lock contention
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors
///
/// Covers connection, initialization and statement failures. Business rule
/// violations are reported by the service-layer `CategoryTreeError`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Pragmas, tables or indexes could not be set up on an opened file
    #[error("Failed to initialize database schema at {path}: {source}")]
    InitializationFailed {
        path: PathBuf,
        #[source]
        source: Box<DatabaseError>,
    },

    /// Invalid database path provided
    #[error("Invalid database path: {path}")]
    InvalidPath { path: PathBuf },

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError {
        context: String,
        #[source]
        source: Option<libsql::Error>,
    },

    /// A stored row could not be converted into a model
    #[error("Failed to decode {entity} row: {reason}")]
    RowDecodeFailed { entity: &'static str, reason: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(path: PathBuf, source: DatabaseError) -> Self {
        Self::InitializationFailed {
            path,
            source: Box::new(source),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: PathBuf) -> Self {
        Self::InvalidPath { path }
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context, keeping the libsql cause
    pub fn sql(context: impl Into<String>, source: libsql::Error) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a SQL execution error with context only
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
            source: None,
        }
    }

    /// Create a row decode error
    pub fn row_decode(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::RowDecodeFailed {
            entity,
            reason: reason.into(),
        }
    }

    /// True when the failure came from another writer holding the database lock
    pub fn is_lock_contention(&self) -> bool {
        let source = match self {
            Self::LibsqlError(source) => Some(source),
            Self::SqlExecutionError { source, .. } => source.as_ref(),
            Self::InitializationFailed { source, .. } => return source.is_lock_contention(),
            _ => None,
        };

        match source {
            Some(libsql::Error::SqliteFailure(code, _)) => {
                let primary = *code & 0xff;
                primary == SQLITE_BUSY || primary == SQLITE_LOCKED
            }
            Some(other) => {
                let message = other.to_string().to_lowercase();
                message.contains("database is locked") || message.contains("database is busy")
            }
            None => false,
        }
    }
}
