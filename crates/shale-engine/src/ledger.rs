//! Version ledger stored inside the target database.
//!
//! One row per applied migration in `<schema>.<table>`:
//!
//! ```sql
//! CREATE TABLE shale.schema_ledger (
//!     id         VARCHAR PRIMARY KEY,
//!     seq        INTEGER NOT NULL UNIQUE,
//!     applied_at TIMESTAMP NOT NULL,
//!     checksum   VARCHAR NOT NULL
//! );
//! ```
//!
//! The ledger holds only its table location; every call takes the database
//! handle it should run against. Statements name the table through
//! [`Database::qualify`] so a schema sharing its name with the database
//! file's catalog still resolves.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, SubsecRound, Utc};
use shale_core::{LedgerConfig, LedgerEntry, Migration, MigrationGraph, MigrationId};
use shale_db::{Database, Row, SqlParam};

/// Location of the ledger table and the operations on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLedger {
    schema: String,
    table: String,
}

impl VersionLedger {
    /// Both names must be plain identifiers; [`shale_core::Config::validate`]
    /// enforces this for configured values.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(&config.schema, &config.table)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `<schema>.<table>`, as shown to operators
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    fn table_ref(&self, db: &dyn Database) -> String {
        db.qualify(&self.schema, &self.table)
    }

    /// Create the ledger schema and table if they do not exist.
    pub async fn ensure(&self, db: &dyn Database) -> EngineResult<()> {
        db.create_schema_if_not_exists(&self.schema).await?;
        db.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 id         VARCHAR PRIMARY KEY,
                 seq        INTEGER NOT NULL UNIQUE,
                 applied_at TIMESTAMP NOT NULL,
                 checksum   VARCHAR NOT NULL
             )",
            self.table_ref(db)
        ))
        .await?;
        Ok(())
    }

    /// All entries in apply order. A missing ledger table reads as empty.
    pub async fn entries(&self, db: &dyn Database) -> EngineResult<Vec<LedgerEntry>> {
        let exists = db
            .relation_exists(&self.qualified_name())
            .await
            .map_err(|e| EngineError::LedgerRead(e.to_string()))?;
        if !exists {
            return Ok(Vec::new());
        }
        let table = self.table_ref(db);

        let rows = db
            .query_rows(
                &format!(
                    "SELECT id, CAST(seq AS VARCHAR), CAST(epoch_us(applied_at) AS VARCHAR), checksum \
                     FROM {table} ORDER BY seq"
                ),
                &[],
            )
            .await
            .map_err(|e| EngineError::LedgerRead(e.to_string()))?;
        rows.into_iter().map(parse_entry).collect()
    }

    /// Id of the most recently applied migration, `None` for an empty ledger
    pub async fn current(&self, db: &dyn Database) -> EngineResult<Option<MigrationId>> {
        Ok(self.entries(db).await?.pop().map(|e| e.id))
    }

    async fn entry(&self, db: &dyn Database, id: &str) -> EngineResult<Option<LedgerEntry>> {
        Ok(self.entries(db).await?.into_iter().find(|e| e.id == id))
    }

    /// Append one entry for `migration`.
    ///
    /// Runs inside the caller's transaction when there is one, so the entry
    /// becomes visible together with the forward operation. Recording an id
    /// twice is an error.
    pub async fn record(
        &self,
        db: &dyn Database,
        migration: &Migration,
        checksum: &str,
    ) -> EngineResult<LedgerEntry> {
        let write_error = |reason: String| EngineError::LedgerWrite {
            id: migration.id.to_string(),
            reason,
        };

        let entries = self
            .entries(db)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        if entries.iter().any(|e| e.id == migration.id) {
            return Err(write_error("entry already exists".to_string()));
        }

        let seq = entries.last().map_or(1, |e| e.seq + 1);
        // Stored at microsecond precision
        let applied_at = Utc::now().trunc_subsecs(6);
        db.execute_with(
            &format!(
                "INSERT INTO {} (id, seq, applied_at, checksum) \
                 VALUES (?, ?, make_timestamp(CAST(? AS BIGINT)), ?)",
                self.table_ref(db)
            ),
            &[
                SqlParam::from(migration.id.as_str()),
                SqlParam::Int(seq),
                SqlParam::Int(applied_at.timestamp_micros()),
                SqlParam::from(checksum),
            ],
        )
        .await
        .map_err(|e| write_error(e.to_string()))?;

        log::debug!("Recorded {} as ledger entry #{}", migration.id, seq);
        Ok(LedgerEntry {
            id: migration.id.clone(),
            seq,
            applied_at,
            checksum: checksum.to_string(),
        })
    }

    /// Delete the entry for `id`; fails when there is none.
    pub async fn remove(&self, db: &dyn Database, id: &str) -> EngineResult<()> {
        let removed = db
            .execute_with(
                &format!("DELETE FROM {} WHERE id = ?", self.table_ref(db)),
                &[SqlParam::from(id)],
            )
            .await
            .map_err(|e| EngineError::LedgerWrite {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if removed == 0 {
            return Err(EngineError::LedgerWrite {
                id: id.to_string(),
                reason: "no ledger entry to remove".to_string(),
            });
        }
        log::debug!("Removed ledger entry {id}");
        Ok(())
    }

    /// Compare the recorded checksum of `migration` with its current one.
    ///
    /// A migration with no entry has nothing to drift from and verifies.
    pub async fn verify(&self, db: &dyn Database, migration: &Migration) -> EngineResult<()> {
        match self.entry(db, &migration.id).await? {
            Some(entry) => check_drift(&entry, migration),
            None => Ok(()),
        }
    }

    /// Verify every recorded entry that the graph knows about.
    ///
    /// Entries missing from the graph are left for the planner to report as
    /// diverged history.
    pub async fn verify_all(&self, db: &dyn Database, graph: &MigrationGraph) -> EngineResult<()> {
        let entries = self.entries(db).await?;
        verify_entries(&entries, graph)
    }
}

/// First drift among `entries`, checked in apply order
pub fn verify_entries(entries: &[LedgerEntry], graph: &MigrationGraph) -> EngineResult<()> {
    for entry in entries {
        if let Some(migration) = graph.get(&entry.id) {
            check_drift(entry, migration)?;
        }
    }
    Ok(())
}

fn check_drift(entry: &LedgerEntry, migration: &Migration) -> EngineResult<()> {
    let current = migration.checksum();
    if entry.checksum != current {
        return Err(EngineError::Drift {
            id: entry.id.to_string(),
            recorded: entry.checksum.clone(),
            current,
        });
    }
    Ok(())
}

fn parse_entry(row: Row) -> EngineResult<LedgerEntry> {
    let malformed = |what: &str| EngineError::LedgerRead(format!("malformed ledger row: {what}"));
    let mut cols = row.into_iter();
    let mut next = |name: &str| cols.next().flatten().ok_or_else(|| malformed(name));

    let id = next("id")?;
    let seq = next("seq")?;
    let applied_at = next("applied_at")?;
    let checksum = next("checksum")?;

    let id = MigrationId::try_new(id).ok_or_else(|| malformed("empty id"))?;
    let seq: i64 = seq.parse().map_err(|_| malformed("seq"))?;
    let micros: i64 = applied_at.parse().map_err(|_| malformed("applied_at"))?;
    let applied_at: DateTime<Utc> =
        DateTime::from_timestamp_micros(micros).ok_or_else(|| malformed("applied_at"))?;

    Ok(LedgerEntry {
        id,
        seq,
        applied_at,
        checksum,
    })
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
