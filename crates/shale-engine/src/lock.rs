//! Single-writer lock.
//!
//! The lock is a marker row with a fixed primary key in `<schema>.<lock_table>`.
//! Inserting the row takes the lock; the unique key makes a second insert fail
//! until the holder deletes it.

use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use shale_core::{LedgerConfig, LockConfig};
use shale_db::{Database, DuckDbBackend, SqlParam};
use std::time::Duration;
use tokio::time::Instant;

const MARKER_ID: i64 = 1;

/// Identifier for this process as a lock holder
pub fn default_holder() -> String {
    format!("{}@pid{}", uuid::Uuid::new_v4(), std::process::id())
}

/// Open the target database, waiting out another process's file lock.
///
/// DuckDB lets one process at a time open a database file for writing. A
/// conflicting open is retried every poll interval until the lock timeout,
/// then fails with [`EngineError::LockContention`] like a held marker row.
pub async fn open_database(url: &str, config: &LockConfig) -> EngineResult<DuckDbBackend> {
    let timeout = config.timeout();
    let poll_interval = config.poll_interval();
    let started = Instant::now();

    loop {
        match DuckDbBackend::from_url(url) {
            Ok(db) => return Ok(db),
            Err(e) if e.is_database_locked() => {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(EngineError::LockContention {
                        holder: e.lock_holder().unwrap_or("another process").to_string(),
                        waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                log::debug!("Database file busy, retrying in {poll_interval:?}");
                tokio::time::sleep(poll_interval.min(timeout - waited)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Marker-row lock serialising apply and rollback runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLock {
    schema: String,
    table: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl MigrationLock {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        let defaults = LockConfig::default();
        Self {
            schema: schema.into(),
            table: table.into(),
            timeout: defaults.timeout(),
            poll_interval: defaults.poll_interval(),
        }
    }

    pub fn from_config(ledger: &LedgerConfig, lock: &LockConfig) -> Self {
        Self::new(&ledger.schema, &ledger.lock_table).with_timeout(lock.timeout(), lock.poll_interval())
    }

    /// Bound the wait for a held lock
    pub fn with_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    fn table_ref(&self, db: &dyn Database) -> String {
        db.qualify(&self.schema, &self.table)
    }

    /// Create the lock table if it does not exist.
    pub async fn ensure(&self, db: &dyn Database) -> EngineResult<()> {
        db.create_schema_if_not_exists(&self.schema).await?;
        db.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 id          INTEGER PRIMARY KEY,
                 holder      VARCHAR NOT NULL,
                 acquired_at TIMESTAMP NOT NULL
             )",
            self.table_ref(db)
        ))
        .await?;
        Ok(())
    }

    /// Take the lock, retrying every poll interval until the timeout.
    ///
    /// Fails with [`EngineError::LockContention`] naming the current holder
    /// when the marker row is still present after the timeout.
    pub async fn acquire(&self, db: &dyn Database, holder: &str) -> EngineResult<LockGuard> {
        self.ensure(db).await?;
        let started = Instant::now();
        let sql = format!(
            "INSERT INTO {} (id, holder, acquired_at) VALUES (?, ?, make_timestamp(CAST(? AS BIGINT)))",
            self.table_ref(db)
        );

        loop {
            let params = [
                SqlParam::Int(MARKER_ID),
                SqlParam::from(holder),
                SqlParam::Int(Utc::now().timestamp_micros()),
            ];
            match db.execute_with(&sql, &params).await {
                Ok(_) => {
                    log::debug!("Acquired migration lock as {holder}");
                    return Ok(LockGuard {
                        table: self.table_ref(db),
                        holder: holder.to_string(),
                    });
                }
                Err(e) if e.is_constraint_violation() => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        let current = self
                            .holder(db)
                            .await?
                            .unwrap_or_else(|| "<released>".to_string());
                        return Err(EngineError::LockContention {
                            holder: current,
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    log::debug!("Migration lock busy, retrying in {:?}", self.poll_interval);
                    tokio::time::sleep(self.poll_interval.min(self.timeout - waited)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Current holder, if the lock is taken
    pub async fn holder(&self, db: &dyn Database) -> EngineResult<Option<String>> {
        if !db.relation_exists(&self.qualified_name()).await? {
            return Ok(None);
        }
        let rows = db
            .query_rows(
                &format!("SELECT holder FROM {} WHERE id = ?", self.table_ref(db)),
                &[SqlParam::Int(MARKER_ID)],
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()))
    }

    /// Remove the marker regardless of holder. Returns whether one existed.
    ///
    /// Meant for operators clearing a lock left behind by a crashed process.
    pub async fn force_release(&self, db: &dyn Database) -> EngineResult<bool> {
        if !db.relation_exists(&self.qualified_name()).await? {
            return Ok(false);
        }
        let removed = db
            .execute_with(
                &format!("DELETE FROM {} WHERE id = ?", self.table_ref(db)),
                &[SqlParam::Int(MARKER_ID)],
            )
            .await?;
        if removed > 0 {
            log::warn!("Force-released migration lock");
        }
        Ok(removed > 0)
    }
}

/// Proof of holding the migration lock.
///
/// Release is async and must be called explicitly on every exit path.
#[must_use = "the lock stays held until release() is called"]
#[derive(Debug)]
pub struct LockGuard {
    table: String,
    holder: String,
}

impl LockGuard {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Delete the marker row if it is still ours
    pub async fn release(self, db: &dyn Database) -> EngineResult<()> {
        let removed = db
            .execute_with(
                &format!("DELETE FROM {} WHERE id = ? AND holder = ?", self.table),
                &[SqlParam::Int(MARKER_ID), SqlParam::from(self.holder.as_str())],
            )
            .await?;
        if removed == 0 {
            log::warn!("Migration lock held by {} was already released", self.holder);
        } else {
            log::debug!("Released migration lock held by {}", self.holder);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
