//! Apply command implementation

use anyhow::{Context, Result};

use crate::cli::{ApplyArgs, GlobalArgs};
use crate::commands::common::{cancel_on_ctrl_c, finish_run, parse_target, position};
use crate::commands::plan::print_text;
use crate::context::RuntimeContext;

/// Execute the apply command
pub(crate) async fn execute(args: &ApplyArgs, global: &GlobalArgs) -> Result<()> {
    let target = parse_target(&args.target)?;
    let ctx = RuntimeContext::new(global).await?;
    let plan = ctx
        .executor
        .plan(&ctx.graph, ctx.db(), &target)
        .await
        .with_context(|| format!("Failed to plan to {target}"))?;

    if args.dry_run {
        print_text(&plan);
        return Ok(());
    }
    if plan.is_empty() {
        println!(
            "Nothing to apply: database is at {}",
            position(plan.target.as_ref())
        );
        return Ok(());
    }

    println!(
        "Applying {} migration(s) to {}\n",
        plan.len(),
        ctx.database_url
    );
    let executor = ctx.executor.clone().with_cancel_flag(cancel_on_ctrl_c());
    let report = executor
        .apply(&plan, ctx.db())
        .await
        .context("Apply did not start")?;
    finish_run(&report)
}
