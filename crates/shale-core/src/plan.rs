//! Planning: which migrations to run, in which order
//!
//! Planning is a pure function of the graph, the recorded ledger entries and
//! the requested target. Reading the ledger and verifying checksums happens in
//! the engine before these functions are called.

use crate::error::{CoreError, CoreResult};
use crate::graph::MigrationGraph;
use crate::ledger_entry::LedgerEntry;
use crate::migration::Migration;
use crate::migration_id::MigrationId;
use std::fmt;
use std::str::FromStr;

/// Where a plan should leave the database
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// The graph head
    #[default]
    Latest,

    /// A specific migration
    Id(MigrationId),
}

impl FromStr for Target {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") || s.eq_ignore_ascii_case("head") {
            return Ok(Target::Latest);
        }
        MigrationId::try_new(s)
            .map(Target::Id)
            .ok_or_else(|| CoreError::UnknownTarget {
                target: s.to_string(),
            })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Ordered forward steps computed from a ledger snapshot
#[derive(Debug, Clone)]
pub struct Plan<'a> {
    /// Migrations to apply, oldest first
    pub steps: Vec<&'a Migration>,

    /// Ledger head the plan was computed from
    pub base: Option<MigrationId>,

    /// Resolved target; `None` only for an empty graph
    pub target: Option<MigrationId>,
}

impl<'a> Plan<'a> {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Step ids in execution order
    pub fn ids(&self) -> Vec<&MigrationId> {
        self.steps.iter().map(|m| &m.id).collect()
    }
}

/// Reverse steps for the newest `n` applied migrations
#[derive(Debug, Clone)]
pub struct RollbackPlan<'a> {
    /// Migrations to reverse, newest first
    pub steps: Vec<&'a Migration>,

    /// Ledger head the plan was computed from
    pub base: Option<MigrationId>,

    /// Ledger head once every step has run
    pub after: Option<MigrationId>,
}

impl<'a> RollbackPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn ids(&self) -> Vec<&MigrationId> {
        self.steps.iter().map(|m| &m.id).collect()
    }

    /// Steps without a reverse operation; reverting stops at the first one
    pub fn irreversible(&self) -> Vec<&MigrationId> {
        self.steps
            .iter()
            .filter(|m| !m.is_reversible())
            .map(|m| &m.id)
            .collect()
    }
}

/// Number of graph migrations the ledger has applied.
///
/// `entries` must be in apply order and form an exact prefix of the graph
/// order; anything else is diverged history.
fn applied_prefix(
    graph: &MigrationGraph,
    entries: &[LedgerEntry],
    target_label: &str,
) -> CoreResult<usize> {
    let order = graph.ordered();
    for (pos, entry) in entries.iter().enumerate() {
        let diverged = |reason: String| CoreError::AlreadyAhead {
            target: target_label.to_string(),
            reason,
        };
        if !graph.contains(&entry.id) {
            return Err(diverged(format!(
                "recorded migration '{}' is not in the migration graph",
                entry.id
            )));
        }
        match order.get(pos) {
            Some(expected) if expected.id == entry.id => {}
            Some(expected) => {
                return Err(diverged(format!(
                    "recorded migration #{} is '{}' but the graph expects '{}'",
                    pos + 1,
                    entry.id,
                    expected.id
                )))
            }
            None => {
                return Err(diverged(format!(
                    "ledger holds {} entries but the graph has only {} migrations",
                    entries.len(),
                    order.len()
                )))
            }
        }
    }
    Ok(entries.len())
}

/// Compute the forward steps from the ledger's position up to `target`.
///
/// Returns an empty plan when the target is already reached.
pub fn plan<'a>(
    graph: &'a MigrationGraph,
    entries: &[LedgerEntry],
    target: &Target,
) -> CoreResult<Plan<'a>> {
    let target_pos = match target {
        Target::Latest => graph.len().checked_sub(1),
        Target::Id(id) => Some(graph.position(id).ok_or_else(|| CoreError::UnknownTarget {
            target: id.to_string(),
        })?),
    };
    let target_label = target.to_string();
    let applied = applied_prefix(graph, entries, &target_label)?;

    let end = target_pos.map_or(0, |p| p + 1);
    if applied > end {
        return Err(CoreError::AlreadyAhead {
            target: target_label,
            reason: format!(
                "ledger head '{}' is already past the target",
                entries[applied - 1].id
            ),
        });
    }

    let order = graph.ordered();
    let plan = Plan {
        steps: order[applied..end].to_vec(),
        base: entries.last().map(|e| e.id.clone()),
        target: target_pos.map(|p| order[p].id.clone()),
    };
    log::debug!(
        "Planned {} step(s) from {:?} to {:?}",
        plan.len(),
        plan.base,
        plan.target
    );
    Ok(plan)
}

/// Compute the reverse steps for the newest `n` ledger entries.
pub fn plan_rollback<'a>(
    graph: &'a MigrationGraph,
    entries: &[LedgerEntry],
    n: usize,
) -> CoreResult<RollbackPlan<'a>> {
    let head_label = graph
        .head()
        .map(|m| m.id.to_string())
        .unwrap_or_else(|| Target::Latest.to_string());
    let applied = applied_prefix(graph, entries, &head_label)?;
    if n > applied {
        return Err(CoreError::RollbackOutOfRange {
            requested: n,
            applied,
        });
    }

    let order = graph.ordered();
    let keep = applied - n;
    let mut steps = order[keep..applied].to_vec();
    steps.reverse();
    Ok(RollbackPlan {
        steps,
        base: entries.last().map(|e| e.id.clone()),
        after: keep.checked_sub(1).map(|p| order[p].id.clone()),
    })
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
