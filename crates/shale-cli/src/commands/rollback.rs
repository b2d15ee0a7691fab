//! Rollback command implementation

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, RollbackArgs};
use crate::commands::common::{cancel_on_ctrl_c, finish_run};
use crate::context::RuntimeContext;

/// Execute the rollback command
pub(crate) async fn execute(args: &RollbackArgs, global: &GlobalArgs) -> Result<()> {
    if args.steps == 0 {
        println!("Nothing to roll back");
        return Ok(());
    }

    let ctx = RuntimeContext::new(global).await?;
    let preview = ctx
        .executor
        .plan_rollback(&ctx.graph, ctx.db(), args.steps)
        .await
        .context("Failed to plan rollback")?;

    let irreversible: Vec<String> = preview
        .irreversible()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    if irreversible.is_empty() {
        println!(
            "Rolling back {} migration(s) on {}",
            preview.len(),
            ctx.database_url
        );
    } else {
        println!(
            "Rolling back {} migration(s) on {} (irreversible: {})",
            preview.len(),
            ctx.database_url,
            irreversible.join(", ")
        );
        log::warn!(
            "Rollback will stop at {}, which has no reverse operation",
            irreversible[0]
        );
    }
    for (i, step) in preview.steps.iter().enumerate() {
        let marker = if step.is_reversible() { "" } else { " [irreversible]" };
        println!("  {}. {}{}", i + 1, step.id, marker);
    }
    println!();

    // Planned again under the lock in case the ledger moved
    let executor = ctx.executor.clone().with_cancel_flag(cancel_on_ctrl_c());
    let report = executor
        .rollback(&ctx.graph, ctx.db(), args.steps)
        .await
        .context("Rollback did not start")?;
    finish_run(&report)
}
