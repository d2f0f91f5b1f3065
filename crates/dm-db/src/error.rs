//! Error types for dm-db

use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Document store operation error (D004)
    #[error("[D004] Document store operation failed: {0}")]
    DocumentError(String),

    /// Not implemented (D005)
    #[error("[D005] Feature not implemented for {backend}: {feature}")]
    NotImplemented { backend: String, feature: String },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Internal error (D007)
    #[error("[D007] Internal database error: {0}")]
    Internal(String),

    /// Value could not be converted to or from the store's representation (D008)
    #[error("[D008] Invalid document: {0}")]
    InvalidDocument(String),

    /// Unique index violated (D009)
    #[error("[D009] Duplicate key: {0}")]
    DuplicateKey(String),

    /// Connection already closed (D010)
    #[error("[D010] Connection is closed")]
    Closed,
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// `true` for a missing table, view or collection.
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, DbError::TableNotFound(_))
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants for catalog
        // errors, so classification relies on narrow message patterns.
        let msg = err.to_string();
        if msg.contains("Table with name")
            || msg.contains("View with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

/// SQLSTATE for `undefined_table`.
const PG_UNDEFINED_TABLE: &str = "42P01";

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some(PG_UNDEFINED_TABLE) {
                    DbError::TableNotFound(db_err.message().to_string())
                } else if db_err.is_unique_violation() {
                    DbError::DuplicateKey(db_err.message().to_string())
                } else {
                    DbError::ExecutionError(db_err.message().to_string())
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError(err.to_string())
            }
            _ => DbError::ExecutionError(err.to_string()),
        }
    }
}

/// Server error code for a duplicate key.
const MONGO_DUPLICATE_KEY: i32 = 11000;

impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == MONGO_DUPLICATE_KEY => {
                DbError::DuplicateKey(we.message.clone())
            }
            ErrorKind::BulkWrite(bw)
                if bw
                    .write_errors
                    .as_ref()
                    .is_some_and(|errs| errs.iter().any(|e| e.code == MONGO_DUPLICATE_KEY)) =>
            {
                DbError::DuplicateKey(err.to_string())
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } => {
                DbError::ConnectionError(err.to_string())
            }
            _ => DbError::DocumentError(err.to_string()),
        }
    }
}
