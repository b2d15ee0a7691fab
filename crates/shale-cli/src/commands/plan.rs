//! Plan command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use shale_core::Plan;

use crate::cli::{GlobalArgs, OutputFormat, PlanArgs};
use crate::commands::common::{parse_target, position};
use crate::context::RuntimeContext;

#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    base: Option<&'a str>,
    target: Option<&'a str>,
    steps: Vec<PlanStep<'a>>,
}

#[derive(Debug, Serialize)]
struct PlanStep<'a> {
    id: &'a str,
    description: Option<&'a str>,
    reversible: bool,
    checksum: String,
}

/// Execute the plan command
pub(crate) async fn execute(args: &PlanArgs, global: &GlobalArgs) -> Result<()> {
    let target = parse_target(&args.target)?;
    let ctx = RuntimeContext::new(global).await?;
    let plan = ctx
        .executor
        .plan(&ctx.graph, ctx.db(), &target)
        .await
        .with_context(|| format!("Failed to plan to {target}"))?;

    match args.output {
        OutputFormat::Text => print_text(&plan),
        OutputFormat::Json => print_json(&plan)?,
    }
    Ok(())
}

/// Human-readable plan, shared with `apply --dry-run`
pub(crate) fn print_text(plan: &Plan<'_>) {
    if plan.is_empty() {
        println!(
            "Nothing to do: database is at {}",
            position(plan.target.as_ref())
        );
        return;
    }

    println!(
        "Plan: {} -> {} ({} migration(s))",
        position(plan.base.as_ref()),
        position(plan.target.as_ref()),
        plan.len()
    );
    println!();
    for (idx, migration) in plan.steps.iter().enumerate() {
        let note = if migration.is_reversible() {
            ""
        } else {
            "  [irreversible]"
        };
        match &migration.description {
            Some(desc) => println!("  {}. {} - {}{}", idx + 1, migration.id, desc, note),
            None => println!("  {}. {}{}", idx + 1, migration.id, note),
        }
    }
}

fn print_json(plan: &Plan<'_>) -> Result<()> {
    let output = PlanOutput {
        base: plan.base.as_ref().map(|id| id.as_str()),
        target: plan.target.as_ref().map(|id| id.as_str()),
        steps: plan
            .steps
            .iter()
            .map(|m| PlanStep {
                id: m.id.as_str(),
                description: m.description.as_deref(),
                reversible: m.is_reversible(),
                checksum: m.checksum(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize to JSON")?;
    println!("{json}");
    Ok(())
}
