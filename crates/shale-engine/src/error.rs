//! Error types for the migration engine.

use shale_core::CoreError;
use shale_db::DbError;
use thiserror::Error;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Appending or removing a ledger entry failed (L001).
    #[error("[L001] Ledger write failed for migration '{id}': {reason}")]
    LedgerWrite { id: String, reason: String },

    /// The ledger could not be read or holds malformed rows (L002).
    #[error("[L002] Ledger read failed: {0}")]
    LedgerRead(String),

    /// Recorded checksum differs from the current definition (L003).
    #[error(
        "[L003] Drift detected for migration '{id}': recorded checksum {recorded}, current {current}"
    )]
    Drift {
        id: String,
        recorded: String,
        current: String,
    },

    /// Another process holds the migration lock (X001).
    #[error("[X001] Migration lock is held by '{holder}' (gave up after {waited_ms} ms)")]
    LockContention { holder: String, waited_ms: u64 },

    /// A migration step failed and was rolled back (X002).
    #[error("[X002] Migration '{id}' failed: {source}")]
    MigrationFailed {
        id: String,
        #[source]
        source: DbError,
    },

    /// Rollback reached a migration without a reverse operation (X003).
    #[error("[X003] Migration '{id}' has no reverse operation")]
    NoReverseOperation { id: String },

    /// The ledger moved between planning and applying (X004).
    #[error("[X004] Stale plan: computed at {planned}, ledger is now at {current}; re-plan and retry")]
    StalePlan { planned: String, current: String },

    /// Startup finished without reaching the required migration (X005).
    #[error("[X005] Target '{target}' not reached: ledger is at {current}")]
    TargetNotReached { target: String, current: String },

    /// Migration set, planning and config errors.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Database errors outside a migration step.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl EngineError {
    /// Migration id involved in the failure, when there is one
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            EngineError::LedgerWrite { id, .. }
            | EngineError::Drift { id, .. }
            | EngineError::MigrationFailed { id, .. }
            | EngineError::NoReverseOperation { id } => Some(id),
            _ => None,
        }
    }
}

/// Result type alias for [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Display form of an optional ledger position
pub(crate) fn position_label(id: Option<&str>) -> String {
    match id {
        Some(id) => format!("'{id}'"),
        None => "<empty>".to_string(),
    }
}
