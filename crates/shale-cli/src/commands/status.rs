//! Status command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use shale_core::{LedgerEntry, MigrationGraph};
use std::collections::HashMap;
use std::fmt;

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common::position;
use crate::context::RuntimeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MigrationState {
    Applied,
    Pending,
    /// Applied, but the forward operation changed since
    Drifted,
    /// Recorded in the ledger, missing from the migrations directory
    Unknown,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MigrationState::Applied => "applied",
            MigrationState::Pending => "pending",
            MigrationState::Drifted => "DRIFTED",
            MigrationState::Unknown => "UNKNOWN",
        };
        f.pad(label)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusRow {
    pub id: String,
    pub state: MigrationState,
    pub description: Option<String>,
    pub seq: Option<i64>,
    pub applied_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    project: &'a str,
    current: Option<&'a str>,
    head: Option<&'a str>,
    migrations: Vec<StatusRow>,
}

/// Execute the status command
pub(crate) async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let entries = ctx
        .executor
        .ledger()
        .entries(ctx.db())
        .await
        .context("Failed to read the version ledger")?;
    let rows = status_rows(&ctx.graph, &entries);
    let current = entries.last().map(|e| &e.id);
    let head = ctx.graph.head().map(|m| &m.id);

    match args.output {
        OutputFormat::Text => {
            println!("Project:  {}", ctx.project.config.name);
            println!("Database: {}", ctx.database_url);
            println!("Current:  {}", position(current));
            println!("Head:     {}", position(head));
            println!();
            for row in &rows {
                println!(
                    "  {:<8} {:<20} {:<40} {}",
                    row.state,
                    row.id,
                    row.description.as_deref().unwrap_or(""),
                    row.applied_at.as_deref().unwrap_or("")
                );
            }
        }
        OutputFormat::Json => {
            let output = StatusOutput {
                project: &ctx.project.config.name,
                current: current.map(|id| id.as_str()),
                head: head.map(|id| id.as_str()),
                migrations: rows,
            };
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialize to JSON")?;
            println!("{json}");
        }
    }
    Ok(())
}

/// One row per graph migration in apply order, then ledger entries the graph
/// no longer defines.
pub(crate) fn status_rows(graph: &MigrationGraph, entries: &[LedgerEntry]) -> Vec<StatusRow> {
    let recorded: HashMap<&str, &LedgerEntry> =
        entries.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut rows: Vec<StatusRow> = graph
        .ordered()
        .into_iter()
        .map(|migration| {
            let entry = recorded.get(migration.id.as_str()).copied();
            let state = match entry {
                None => MigrationState::Pending,
                Some(e) if e.checksum != migration.checksum() => MigrationState::Drifted,
                Some(_) => MigrationState::Applied,
            };
            StatusRow {
                id: migration.id.to_string(),
                state,
                description: migration.description.clone(),
                seq: entry.map(|e| e.seq),
                applied_at: entry.map(|e| e.applied_at.to_rfc3339()),
            }
        })
        .collect();

    rows.extend(
        entries
            .iter()
            .filter(|e| !graph.contains(&e.id))
            .map(|e| StatusRow {
                id: e.id.to_string(),
                state: MigrationState::Unknown,
                description: None,
                seq: Some(e.seq),
                applied_at: Some(e.applied_at.to_rfc3339()),
            }),
    );
    rows
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
