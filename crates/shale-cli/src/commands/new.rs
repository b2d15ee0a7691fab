//! New command implementation

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use shale_core::{MigrationGraph, MigrationId};

use crate::cli::{GlobalArgs, NewArgs};
use crate::context::Project;

/// Execute the new command
pub(crate) async fn execute(args: &NewArgs, global: &GlobalArgs) -> Result<()> {
    if args.description.trim().is_empty() {
        bail!("Migration description cannot be empty");
    }

    let project = Project::load(global)?;
    let migrations_dir = project.migrations_dir();
    std::fs::create_dir_all(&migrations_dir)
        .with_context(|| format!("Failed to create {}", migrations_dir.display()))?;
    let graph = project.load_graph()?;

    let now = Utc::now();
    let id = match &args.id {
        Some(raw) => MigrationId::try_new(raw.trim()).context("--id cannot be empty")?,
        None => next_id(&graph, now),
    };

    let dir = graph
        .scaffold_next(&migrations_dir, &id, &args.description, now.date_naive())
        .context("Failed to scaffold migration")?;

    match graph.head() {
        Some(head) => println!("Created migration {id} (revises {}) at {}", head.id, dir.display()),
        None => println!("Created root migration {id} at {}", dir.display()),
    }
    Ok(())
}

/// Next zero-padded number when every id is numeric, else a UTC timestamp.
pub(crate) fn next_id(graph: &MigrationGraph, now: DateTime<Utc>) -> MigrationId {
    let ids = graph.ordered_ids();
    if ids.is_empty() {
        return MigrationId::new("001");
    }

    let numeric: Option<Vec<u64>> = ids.iter().map(|id| id.parse::<u64>().ok()).collect();
    match numeric.and_then(|n| n.into_iter().max()) {
        Some(max) => {
            let width = ids.iter().map(|id| id.len()).max().unwrap_or(3);
            MigrationId::new(format!("{:0width$}", max + 1))
        }
        None => MigrationId::new(now.format("%Y%m%d%H%M%S").to_string()),
    }
}

#[cfg(test)]
#[path = "new_test.rs"]
mod tests;
