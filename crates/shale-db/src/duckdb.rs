//! DuckDB database backend implementation

use crate::error::{is_file_lock_conflict, DbError, DbResult};
use crate::traits::{Database, Row, SqlParam};
use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// URL scheme accepted by [`DuckDbBackend::from_url`]
pub const URL_SCHEME: &str = "duckdb://";

const MEMORY: &str = ":memory:";

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    /// Default catalog, named after the file stem (`memory` in memory)
    catalog: String,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::wrap(conn)
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::ConnectionError(format!("{}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            let msg = format!("{}: {}", path.display(), e);
            if is_file_lock_conflict(&msg) {
                DbError::DatabaseLocked(msg)
            } else {
                DbError::ConnectionError(msg)
            }
        })?;
        Self::wrap(conn)
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == MEMORY {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    /// Open a connection string: `:memory:`, a file path, or `duckdb://<path>`
    pub fn from_url(url: &str) -> DbResult<Self> {
        let path = url.strip_prefix(URL_SCHEME).unwrap_or(url).trim();
        if path.is_empty() {
            return Err(DbError::ConnectionError(format!(
                "empty database path in '{url}'"
            )));
        }
        log::debug!("Opening DuckDB database {path}");
        Self::new(path)
    }

    /// Open a second connection to the same database.
    ///
    /// The clone has its own transaction state, which is what a concurrent
    /// writer in the same process needs.
    pub fn try_clone(&self) -> DbResult<Self> {
        let conn = self.lock()?;
        let cloned = conn
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(cloned),
            catalog: self.catalog.clone(),
        })
    }

    fn wrap(conn: Connection) -> DbResult<Self> {
        let catalog = conn
            .query_row("SELECT current_database()", [], |row| row.get::<_, String>(0))
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            catalog,
        })
    }

    /// Name of the catalog unqualified references resolve to
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(DbError::from)
    }

    fn execute_with_sync(&self, sql: &str, params: &[SqlParam]) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, duckdb::params_from_iter(params.iter().map(to_value)))
            .map_err(|e| {
                log::debug!("Statement failed: {sql}");
                DbError::from(e)
            })
    }

    fn query_rows_sync(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(params.iter().map(to_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Option<String>>(i)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Check if relation exists synchronously
    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        // Handle schema-qualified names
        let (schema, table) = match name.rfind('.') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("main", name),
        };

        let rows = self.query_rows_sync(
            "SELECT CAST(COUNT(*) AS VARCHAR) FROM information_schema.tables \
             WHERE table_catalog = ? AND table_schema = ? AND table_name = ?",
            &[
                SqlParam::from(self.catalog.as_str()),
                SqlParam::from(schema),
                SqlParam::from(table),
            ],
        )?;
        let count = rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_deref())
            .unwrap_or("0");
        Ok(count != "0")
    }

    fn transaction_sync(&self, statement: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(statement)
            .map_err(|e| DbError::TransactionError(format!("{statement}: {e}")))
    }
}

fn to_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::Text(s) => Value::Text(s.clone()),
        SqlParam::Int(i) => Value::BigInt(*i),
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn execute_with(&self, sql: &str, params: &[SqlParam]) -> DbResult<usize> {
        self.execute_with_sync(sql, params)
    }

    async fn query_rows(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        self.query_rows_sync(sql, params)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        self.execute_batch_sync(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}.{}",
            quote_ident(&self.catalog),
            quote_ident(schema)
        ))
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sync("BEGIN TRANSACTION")
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sync("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.transaction_sync("ROLLBACK")
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.catalog),
            quote_ident(schema),
            quote_ident(table)
        )
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
