//! Unlock command implementation

use anyhow::{Context, Result};
use shale_engine::MigrationLock;

use crate::cli::{GlobalArgs, UnlockArgs};
use crate::context::Project;

/// Execute the unlock command
///
/// Loads only the config, so a project with a broken migrations directory
/// can still be unlocked.
pub(crate) async fn execute(_args: &UnlockArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global)?;
    let (db, url) = project.connect(global).await?;
    let lock = MigrationLock::from_config(&project.config.ledger, &project.config.lock);

    let holder = lock
        .holder(db.as_ref())
        .await
        .context("Failed to read the migration lock")?;
    let released = lock
        .force_release(db.as_ref())
        .await
        .context("Failed to release the migration lock")?;

    match (released, holder) {
        (true, Some(holder)) => println!("Released lock held by {holder} on {url}"),
        (true, None) => println!("Released migration lock on {url}"),
        (false, _) => println!("No migration lock held on {url}"),
    }
    Ok(())
}
