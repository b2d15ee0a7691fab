//! Entry point for services that migrate on boot.

use crate::error::{position_label, EngineError, EngineResult};
use crate::executor::{Executor, RunReport};
use shale_core::{MigrationGraph, Target};
use shale_db::Database;

/// Plan and apply up to `target`, failing unless the ledger ends there.
///
/// Any step failure, drift, lock contention or cancellation comes back as an
/// error; a caller that gets one must not start serving.
pub async fn migrate_on_startup(
    graph: &MigrationGraph,
    db: &dyn Database,
    executor: &Executor,
    target: &Target,
) -> EngineResult<RunReport> {
    let plan = executor.plan(graph, db, target).await?;
    if plan.is_empty() {
        log::info!(
            "Schema already at {}",
            position_label(plan.target.as_deref())
        );
    } else {
        log::info!(
            "Migrating {} -> {} ({} step(s))",
            position_label(plan.base.as_deref()),
            position_label(plan.target.as_deref()),
            plan.len()
        );
    }

    let report = executor.apply(&plan, db).await?.into_result()?;

    let current = executor.ledger().current(db).await?;
    if report.cancelled || current != plan.target {
        return Err(EngineError::TargetNotReached {
            target: position_label(plan.target.as_deref()),
            current: position_label(current.as_deref()),
        });
    }
    Ok(report)
}

#[cfg(test)]
#[path = "startup_test.rs"]
mod tests;
