//! Database trait definition

use crate::error::DbResult;
use async_trait::async_trait;

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

/// One result row; every column is returned as text, `None` for NULL.
///
/// Queries cast non-text columns to VARCHAR so results do not depend on
/// backend-specific value types.
pub type Row = Vec<Option<String>>;

/// Database abstraction trait for Shale
///
/// Implementations must be Send + Sync for async operation. A handle is
/// passed explicitly into every ledger, lock and executor call; one handle
/// represents one connection, so transaction state is per handle.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute multiple SQL statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute a single statement with positional `?` parameters
    async fn execute_with(&self, sql: &str, params: &[SqlParam]) -> DbResult<usize>;

    /// Run a query with positional `?` parameters and collect all rows
    async fn query_rows(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>>;

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Open an explicit transaction
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> DbResult<()>;

    /// Quoted `catalog.schema.table` reference in this connection's catalog.
    ///
    /// Two-part names can clash with an attached catalog of the same name.
    fn qualify(&self, schema: &str, table: &str) -> String;

    /// Backend name shown in run logs
    fn db_type(&self) -> &'static str;
}
