//! Verify command implementation

use anyhow::{Context, Result};
use shale_core::{LedgerEntry, MigrationGraph};
use std::fmt;

use crate::cli::{GlobalArgs, VerifyArgs};
use crate::commands::common::ExitCode;
use crate::context::RuntimeContext;

/// A ledger entry that no longer matches the migrations directory
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum VerifyIssue {
    Drift {
        id: String,
        recorded: String,
        current: String,
    },
    Missing {
        id: String,
    },
}

impl fmt::Display for VerifyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyIssue::Drift {
                id,
                recorded,
                current,
            } => write!(
                f,
                "[DRIFT] {id}: recorded checksum {recorded}, definition now {current}"
            ),
            VerifyIssue::Missing { id } => {
                write!(f, "[MISSING] {id}: applied but no longer defined")
            }
        }
    }
}

/// Execute the verify command
pub(crate) async fn execute(_args: &VerifyArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let entries = ctx
        .executor
        .ledger()
        .entries(ctx.db())
        .await
        .context("Failed to read the version ledger")?;

    let issues = check_entries(&ctx.graph, &entries);
    if issues.is_empty() {
        println!("Verified {} applied migration(s): no drift", entries.len());
        return Ok(());
    }

    for issue in &issues {
        eprintln!("{issue}");
    }
    eprintln!();
    eprintln!(
        "{} of {} applied migration(s) failed verification",
        issues.len(),
        entries.len()
    );
    Err(ExitCode(1).into())
}

/// Every drifted or missing entry, in apply order
pub(crate) fn check_entries(graph: &MigrationGraph, entries: &[LedgerEntry]) -> Vec<VerifyIssue> {
    entries
        .iter()
        .filter_map(|entry| match graph.get(&entry.id) {
            None => Some(VerifyIssue::Missing {
                id: entry.id.to_string(),
            }),
            Some(migration) => {
                let current = migration.checksum();
                (current != entry.checksum).then(|| VerifyIssue::Drift {
                    id: entry.id.to_string(),
                    recorded: entry.checksum.clone(),
                    current,
                })
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "verify_test.rs"]
mod tests;
