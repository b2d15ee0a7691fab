//! shale-db - Database abstraction layer for Shale
//!
//! This crate provides the async `Database` trait the ledger, lock and
//! executor run against, and its DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{Database, Row, SqlParam};
