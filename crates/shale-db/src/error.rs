//! Error types for shale-db

use thiserror::Error;

/// Database operation errors
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

    /// Unique/primary key violation or a conflicting concurrent write (D004)
    #[error("[D004] Constraint violation: {0}")]
    ConstraintViolation(String),

    /// BEGIN/COMMIT/ROLLBACK failed (D005)
    #[error("[D005] Transaction control failed: {0}")]
    TransactionError(String),

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Internal error (D007)
    #[error("[D007] Internal database error: {0}")]
    Internal(String),

    /// Another process holds the database file open (D008)
    #[error("[D008] Database file is locked: {0}")]
    DatabaseLocked(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants, so the message
        // is the only thing to classify on. Patterns are kept narrow.
        let msg = err.to_string();
        if msg.contains("Constraint Error")
            || msg.contains("Duplicate key")
            || msg.contains("write-write conflict")
        {
            DbError::ConstraintViolation(msg)
        } else if msg.contains("Table with name")
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

impl DbError {
    /// True when a unique key or a concurrent write rejected the statement
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }

    /// True when opening failed because another process holds the file lock
    pub fn is_database_locked(&self) -> bool {
        matches!(self, DbError::DatabaseLocked(_))
    }

    /// Process named in a file-lock conflict, e.g. `PID 9395`
    pub fn lock_holder(&self) -> Option<&str> {
        let DbError::DatabaseLocked(msg) = self else {
            return None;
        };
        let start = msg.find("(PID ")? + 1;
        let len = msg[start..].find(')')?;
        Some(&msg[start..start + len])
    }
}

/// DuckDB reports a conflicting file lock from another process this way
pub(crate) fn is_file_lock_conflict(msg: &str) -> bool {
    msg.contains("Could not set lock on file") || msg.contains("Conflicting lock")
}
