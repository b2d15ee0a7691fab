//! Migration engine for Shale.
//!
//! Provides the version ledger kept inside the target database, the
//! single-writer lock, and the executor that applies and reverses plans one
//! transaction per migration.

pub mod error;
pub mod executor;
pub mod ledger;
pub mod lock;
pub mod startup;

pub use error::{EngineError, EngineResult};
pub use executor::{Direction, Executor, FailedStep, RunReport, StepReport, StepState};
pub use ledger::{verify_entries, VersionLedger};
pub use lock::{default_holder, open_database, LockGuard, MigrationLock};
pub use startup::migrate_on_startup;
