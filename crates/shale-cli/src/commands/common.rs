//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use shale_core::{MigrationId, Target};
use shale_engine::{Direction, RunReport, StepState};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that destructors run and the lock release path completes.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only: the command has already printed its error
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Exit code for a run stopped by Ctrl-C
pub(crate) const EXIT_CANCELLED: i32 = 130;

pub(crate) fn parse_target(raw: &str) -> Result<Target> {
    raw.parse::<Target>()
        .with_context(|| format!("Invalid --target '{raw}'"))
}

/// Display form of an optional ledger position
pub(crate) fn position(id: Option<&MigrationId>) -> String {
    id.map_or_else(|| "<empty>".to_string(), |id| id.to_string())
}

/// Flag set on the first Ctrl-C.
///
/// The executor checks it between steps, so the step in flight still commits
/// or rolls back and the lock is released.
pub(crate) fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current migration...");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}

/// Print per-step results, then turn a failed or cancelled run into an
/// error exit naming the migration that stopped it.
pub(crate) fn finish_run(report: &RunReport) -> Result<()> {
    let (done, verb) = match report.direction {
        Direction::Up => ("applied", "Applied"),
        Direction::Down => ("reverted", "Reverted"),
    };

    for step in &report.steps {
        match step.state {
            StepState::Applied => println!("  ✓ {} {} [{}ms]", step.id, done, step.duration_ms),
            StepState::Failed => println!("  ✗ {} failed [{}ms]", step.id, step.duration_ms),
            StepState::Pending | StepState::Running => println!("  - {} skipped", step.id),
        }
    }
    println!();
    println!("{verb} {} of {} migration(s)", report.completed_count(), report.steps.len());

    if let Some(failed) = &report.failure {
        eprintln!("Migration {} failed: {}", failed.id, failed.error);
        return Err(ExitCode(1).into());
    }
    if report.cancelled {
        eprintln!("Cancelled before all migrations ran");
        return Err(ExitCode(EXIT_CANCELLED).into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
