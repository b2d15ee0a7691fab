//! Applying and reversing plans.
//!
//! Each step runs in its own transaction: forward (or reverse) SQL plus the
//! ledger write commit together or not at all. The first failing step is
//! rolled back and ends the run.

use crate::error::{position_label, EngineError, EngineResult};
use crate::ledger::{verify_entries, VersionLedger};
use crate::lock::{default_holder, LockGuard, MigrationLock};
use shale_core::{
    plan as plan_forward, plan_rollback, Config, Migration, MigrationGraph, MigrationId, Plan,
    RollbackPlan, Target,
};
use shale_db::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Which way a run moves the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Per-step state: `Pending -> Running -> {Applied | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    /// Forward operation committed, or for a rollback, reverse operation committed
    Applied,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Applied => "applied",
            StepState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub id: MigrationId,
    pub state: StepState,
    pub duration_ms: u64,
}

/// The step that stopped a run
#[derive(Debug)]
pub struct FailedStep {
    pub id: MigrationId,
    pub error: EngineError,
}

/// Outcome of an apply or rollback run
#[derive(Debug)]
pub struct RunReport {
    pub direction: Direction,
    pub steps: Vec<StepReport>,
    pub failure: Option<FailedStep>,
    /// Stopped by the cancellation flag before every step ran
    pub cancelled: bool,
}

impl RunReport {
    fn new<'a>(direction: Direction, ids: impl IntoIterator<Item = &'a MigrationId>) -> Self {
        Self {
            direction,
            steps: ids
                .into_iter()
                .map(|id| StepReport {
                    id: id.clone(),
                    state: StepState::Pending,
                    duration_ms: 0,
                })
                .collect(),
            failure: None,
            cancelled: false,
        }
    }

    /// Ids of steps that committed, in execution order
    pub fn completed(&self) -> Vec<&MigrationId> {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Applied)
            .map(|s| &s.id)
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.completed().len()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    /// Turn a failed run into its step error
    pub fn into_result(self) -> EngineResult<Self> {
        match self.failure {
            Some(failed) => Err(failed.error),
            None => Ok(self),
        }
    }
}

/// Runs plans against one target database under the single-writer lock
#[derive(Debug, Clone)]
pub struct Executor {
    ledger: VersionLedger,
    lock: MigrationLock,
    holder: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl Executor {
    pub fn new(ledger: VersionLedger, lock: MigrationLock) -> Self {
        Self {
            ledger,
            lock,
            holder: default_holder(),
            cancel: None,
        }
    }

    /// Ledger, lock table and lock timing from a project config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            VersionLedger::from_config(&config.ledger),
            MigrationLock::from_config(&config.ledger, &config.lock),
        )
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Checked before each step; a running step always finishes
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn lock(&self) -> &MigrationLock {
        &self.lock
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Read the ledger, verify every entry for drift, then plan.
    pub async fn plan<'g>(
        &self,
        graph: &'g MigrationGraph,
        db: &dyn Database,
        target: &Target,
    ) -> EngineResult<Plan<'g>> {
        let entries = self.ledger.entries(db).await?;
        verify_entries(&entries, graph)?;
        Ok(plan_forward(graph, &entries, target)?)
    }

    /// Read the ledger, verify it, and plan reversing the newest `n` entries.
    pub async fn plan_rollback<'g>(
        &self,
        graph: &'g MigrationGraph,
        db: &dyn Database,
        n: usize,
    ) -> EngineResult<RollbackPlan<'g>> {
        let entries = self.ledger.entries(db).await?;
        verify_entries(&entries, graph)?;
        Ok(plan_rollback(graph, &entries, n)?)
    }

    async fn acquire(&self, db: &dyn Database) -> EngineResult<LockGuard> {
        self.ledger.ensure(db).await?;
        self.lock.acquire(db, &self.holder).await
    }

    /// Release the lock, then hand back the run result.
    async fn finish(
        guard: LockGuard,
        db: &dyn Database,
        result: EngineResult<RunReport>,
    ) -> EngineResult<RunReport> {
        let released = guard.release(db).await;
        if let Err(e) = &released {
            log::error!("Failed to release migration lock: {e}");
        }
        let report = result?;
        released?;
        Ok(report)
    }

    /// Apply `plan` step by step.
    ///
    /// Step failures are reported in [`RunReport::failure`]; lock contention
    /// and a ledger that moved since planning are returned as errors before
    /// any step runs.
    pub async fn apply(&self, plan: &Plan<'_>, db: &dyn Database) -> EngineResult<RunReport> {
        if plan.is_empty() {
            log::info!("Nothing to apply");
            return Ok(RunReport::new(Direction::Up, []));
        }

        let guard = self.acquire(db).await?;
        let result = self.apply_locked(plan, db).await;
        Self::finish(guard, db, result).await
    }

    async fn apply_locked(&self, plan: &Plan<'_>, db: &dyn Database) -> EngineResult<RunReport> {
        let current = self.ledger.current(db).await?;
        if current != plan.base {
            return Err(EngineError::StalePlan {
                planned: position_label(plan.base.as_deref()),
                current: position_label(current.as_deref()),
            });
        }

        log::info!(
            "Applying {} migration(s) on {} as {}",
            plan.len(),
            db.db_type(),
            self.holder
        );
        let mut report = RunReport::new(Direction::Up, plan.ids());
        for (idx, migration) in plan.steps.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!(
                    "Cancelled before {}; {} step(s) left pending",
                    migration.id,
                    plan.len() - idx
                );
                report.cancelled = true;
                break;
            }

            report.steps[idx].state = StepState::Running;
            log::info!("Applying {}", migration.id);
            let started = Instant::now();
            let outcome = self.apply_step(migration, db).await;
            report.steps[idx].duration_ms = elapsed_ms(started);

            match outcome {
                Ok(()) => {
                    report.steps[idx].state = StepState::Applied;
                    log::info!(
                        "Applied {} ({} ms)",
                        migration.id,
                        report.steps[idx].duration_ms
                    );
                }
                Err(error) => {
                    report.steps[idx].state = StepState::Failed;
                    log::error!("Migration {} failed: {error}", migration.id);
                    report.failure = Some(FailedStep {
                        id: migration.id.clone(),
                        error,
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn apply_step(&self, migration: &Migration, db: &dyn Database) -> EngineResult<()> {
        migration.validate()?;
        let step_failed = |source| EngineError::MigrationFailed {
            id: migration.id.to_string(),
            source,
        };

        db.begin().await.map_err(step_failed)?;
        let outcome = async {
            log::debug!("Forward SQL for {}:\n{}", migration.id, migration.up_sql);
            db.execute_batch(&migration.up_sql)
                .await
                .map_err(step_failed)?;
            self.ledger
                .record(db, migration, &migration.checksum())
                .await?;
            db.commit().await.map_err(step_failed)
        }
        .await;

        if outcome.is_err() {
            rollback_quietly(db, &migration.id).await;
        }
        outcome
    }

    /// Reverse the newest `n` ledger entries, newest first.
    ///
    /// Planning happens under the lock. A step without a reverse operation
    /// fails with [`EngineError::NoReverseOperation`] when it is reached, and
    /// nothing after it runs.
    pub async fn rollback(
        &self,
        graph: &MigrationGraph,
        db: &dyn Database,
        n: usize,
    ) -> EngineResult<RunReport> {
        if n == 0 {
            return Ok(RunReport::new(Direction::Down, []));
        }

        let guard = self.acquire(db).await?;
        let result = self.rollback_locked(graph, db, n).await;
        Self::finish(guard, db, result).await
    }

    async fn rollback_locked(
        &self,
        graph: &MigrationGraph,
        db: &dyn Database,
        n: usize,
    ) -> EngineResult<RunReport> {
        let plan = self.plan_rollback(graph, db, n).await?;
        log::info!(
            "Reverting {} migration(s) on {} as {}",
            plan.len(),
            db.db_type(),
            self.holder
        );
        let mut report = RunReport::new(Direction::Down, plan.ids());

        for (idx, migration) in plan.steps.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!(
                    "Cancelled before reverting {}; {} step(s) left pending",
                    migration.id,
                    plan.len() - idx
                );
                report.cancelled = true;
                break;
            }

            report.steps[idx].state = StepState::Running;
            log::info!("Reverting {}", migration.id);
            let started = Instant::now();
            let outcome = self.revert_step(migration, db).await;
            report.steps[idx].duration_ms = elapsed_ms(started);

            match outcome {
                Ok(()) => {
                    report.steps[idx].state = StepState::Applied;
                    log::info!(
                        "Reverted {} ({} ms)",
                        migration.id,
                        report.steps[idx].duration_ms
                    );
                }
                Err(error) => {
                    report.steps[idx].state = StepState::Failed;
                    log::error!("Rollback of {} failed: {error}", migration.id);
                    report.failure = Some(FailedStep {
                        id: migration.id.clone(),
                        error,
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn revert_step(&self, migration: &Migration, db: &dyn Database) -> EngineResult<()> {
        migration.validate()?;
        let Some(down_sql) = migration.down_sql.as_deref() else {
            return Err(EngineError::NoReverseOperation {
                id: migration.id.to_string(),
            });
        };
        let step_failed = |source| EngineError::MigrationFailed {
            id: migration.id.to_string(),
            source,
        };

        db.begin().await.map_err(step_failed)?;
        let outcome = async {
            log::debug!("Reverse SQL for {}:\n{}", migration.id, down_sql);
            db.execute_batch(down_sql).await.map_err(step_failed)?;
            self.ledger.remove(db, &migration.id).await?;
            db.commit().await.map_err(step_failed)
        }
        .await;

        if outcome.is_err() {
            rollback_quietly(db, &migration.id).await;
        }
        outcome
    }
}

async fn rollback_quietly(db: &dyn Database, id: &MigrationId) {
    if let Err(e) = db.rollback().await {
        log::error!("Rollback of transaction for {id} failed: {e}");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
