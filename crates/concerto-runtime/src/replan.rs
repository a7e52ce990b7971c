//! Replanning
//!
//! Reacts to monitor signals by regenerating the execution plan and
//! unblocking goals whose dependencies have become satisfiable or stale.
//! Replanning is idempotent: a second pass with no new information changes
//! nothing.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use concerto_core::planner::{ExecutionPlanner, PlanError};
use concerto_core::tree::{GoalTree, TreeError};
use concerto_core::types::{ExecutionPlan, GoalId, GoalStatus};

/// Replanning errors
#[derive(Debug, Error)]
pub enum ReplanError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Outcome of one replanning pass
#[derive(Debug)]
pub struct ReplanOutcome {
    /// The freshly generated plan; the superseded plan stays with the caller
    /// for audit
    pub plan: ExecutionPlan,
    /// Why replanning was requested
    pub reason: String,
    /// Root progress at the moment of the snapshot
    pub snapshot_progress: f64,
    /// Goals returned to `Pending` because their dependency list emptied
    pub unblocked: Vec<GoalId>,
    /// Goals still blocked after stale dependencies were dropped
    pub still_blocked: Vec<GoalId>,
    /// Whether this pass mutated the tree at all
    pub changed: bool,
    /// When the pass ran
    pub replanned_at: DateTime<Utc>,
}

/// The replanner
pub struct Replanner;

impl Replanner {
    /// Create a new replanner
    pub fn new() -> Self {
        Self
    }

    /// Run one replanning pass over the tree
    ///
    /// Drops dependency ids that no longer resolve to an existing goal, sets
    /// a blocked goal back to `Pending` when its dependency list empties, and
    /// produces a fresh plan.
    pub fn replan(
        &self,
        tree: &mut GoalTree,
        planner: &ExecutionPlanner,
        reason: impl Into<String>,
    ) -> Result<ReplanOutcome, ReplanError> {
        let reason = reason.into();
        let snapshot_progress = tree
            .root_id()
            .map(|root| tree.progress(root))
            .unwrap_or(0.0);

        let mut blocked: Vec<GoalId> = tree
            .iter()
            .filter(|g| g.status == GoalStatus::Blocked)
            .map(|g| g.id.clone())
            .collect();
        blocked.sort();

        let mut unblocked = Vec::new();
        let mut still_blocked = Vec::new();
        let mut changed = false;

        for id in blocked {
            let stale: Vec<GoalId> = tree
                .goal(&id)
                .map(|g| {
                    g.dependencies
                        .iter()
                        .filter(|d| !tree.contains(d))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            if !stale.is_empty() {
                changed = true;
                tree.update_goal(&id, |g| {
                    g.dependencies.retain(|d| !stale.contains(d));
                })?;
            }

            let now_empty = tree
                .goal(&id)
                .map(|g| g.dependencies.is_empty())
                .unwrap_or(false);
            if now_empty {
                changed = true;
                tree.update_goal(&id, |g| g.set_status(GoalStatus::Pending))?;
                unblocked.push(id);
            } else {
                still_blocked.push(id);
            }
        }

        let plan = planner.plan(tree)?;
        debug!(
            reason = %reason,
            unblocked = unblocked.len(),
            still_blocked = still_blocked.len(),
            "replanned"
        );

        Ok(ReplanOutcome {
            plan,
            reason,
            snapshot_progress,
            unblocked,
            still_blocked,
            changed,
            replanned_at: Utc::now(),
        })
    }
}

impl Default for Replanner {
    fn default() -> Self {
        Self::new()
    }
}
