//! shale-core - Core library for Shale
//!
//! This crate provides migration definitions and discovery, the validated
//! migration graph, the planner, checksums and configuration parsing shared
//! across all Shale components. Nothing here touches a database.

pub mod checksum;
pub mod config;
pub mod error;
pub mod graph;
pub mod ledger_entry;
pub mod migration;
pub mod migration_id;
mod newtype_string;
pub mod plan;

pub use checksum::{compute_checksum, forward_checksum};
pub use config::{Config, DatabaseConfig, DbType, LedgerConfig, LockConfig};
pub use error::{CoreError, CoreResult, GraphIntegrityError};
pub use graph::MigrationGraph;
pub use ledger_entry::LedgerEntry;
pub use migration::{discover_migrations, scaffold_migration, Migration, MigrationMeta};
pub use migration_id::MigrationId;
pub use plan::{plan, plan_rollback, Plan, RollbackPlan, Target};
