//! Orchestrator - goal intake → plan → execute → monitor → replan pipeline
//!
//! Owns all run state explicitly: the goal tree behind a single write lock,
//! the progress monitor, the plan history and the injected worker registry.
//! Monitoring ticks read tree snapshots and never observe a mid-update tree.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use concerto_core::decompose::{Constraints, Decomposer, DecomposeError};
use concerto_core::monitor::ProgressMonitor;
use concerto_core::planner::{ExecutionPlanner, PlanError};
use concerto_core::tree::{GoalTree, TreeError};
use concerto_core::types::{
    ExecutionPlan, GoalId, GoalNode, GoalStatus, PlanStatus, ProgressMetrics, Task,
};
use concerto_core::worker::{Capability, WorkerRegistry};

use crate::replan::{ReplanError, ReplanOutcome, Replanner};
use crate::scheduler::{OrchestrationResult, Scheduler, SchedulerError, TaskFailureKind};

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Decompose(#[from] DecomposeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Replan(#[from] ReplanError),

    #[error("goal not found: {0}")]
    GoalNotFound(GoalId),

    #[error("plan not found: {0}")]
    PlanNotFound(String),
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum concurrently running tasks
    pub max_parallel: usize,
    /// Orchestrator-level timeout per dispatched task
    pub task_timeout: Duration,
    /// Maximum decomposition recursion depth
    pub decompose_max_depth: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            task_timeout: Duration::from_secs(300),
            decompose_max_depth: 2,
        }
    }
}

/// The orchestrator for one run
///
/// Generic over the application's closed capability enum `C`; leaf goals are
/// mapped to capabilities by the injected assignment function.
pub struct Orchestrator<C: Capability> {
    tree: Arc<RwLock<GoalTree>>,
    monitor: Arc<RwLock<ProgressMonitor>>,
    plans: Arc<RwLock<Vec<ExecutionPlan>>>,
    registry: Arc<WorkerRegistry<C>>,
    assign: Arc<dyn Fn(&GoalNode) -> C + Send + Sync>,
    decomposer: Decomposer,
    planner: ExecutionPlanner,
    scheduler: Scheduler,
    replanner: Replanner,
    cancel: CancellationToken,
}

impl<C: Capability> Orchestrator<C> {
    /// Create an orchestrator with the default configuration
    pub fn new(
        registry: Arc<WorkerRegistry<C>>,
        assign: impl Fn(&GoalNode) -> C + Send + Sync + 'static,
    ) -> Self {
        Self::with_config(registry, assign, OrchestratorConfig::default())
    }

    /// Create an orchestrator with an explicit configuration
    pub fn with_config(
        registry: Arc<WorkerRegistry<C>>,
        assign: impl Fn(&GoalNode) -> C + Send + Sync + 'static,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            tree: Arc::new(RwLock::new(GoalTree::new())),
            monitor: Arc::new(RwLock::new(ProgressMonitor::new())),
            plans: Arc::new(RwLock::new(Vec::new())),
            registry,
            assign: Arc::new(assign),
            decomposer: Decomposer::new().with_max_depth(config.decompose_max_depth),
            planner: ExecutionPlanner::new(),
            scheduler: Scheduler::new()
                .with_max_parallel(config.max_parallel)
                .with_task_timeout(config.task_timeout),
            replanner: Replanner::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// The run's cancellation token
    ///
    /// Cancelled by the monitoring tick on a critical risk; callers may also
    /// cancel it directly.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Decompose a goal description into this run's tree
    ///
    /// Replaces any previous tree: one orchestration run serves one root
    /// goal. Returns the root goal id.
    pub async fn decompose_goal(
        &self,
        description: &str,
        constraints: &Constraints,
        priority: f64,
    ) -> Result<GoalId, OrchestratorError> {
        let tree = self.decomposer.decompose(description, constraints, priority)?;
        let root_id = tree
            .root_id()
            .cloned()
            .ok_or_else(|| OrchestratorError::GoalNotFound(description.to_string()))?;

        *self.tree.write().await = tree;
        self.plans.write().await.clear();
        debug!(goal_id = %root_id, "goal decomposed");
        Ok(root_id)
    }

    /// Create and activate an execution plan for the current tree
    pub async fn create_execution_plan(
        &self,
        goal_id: &str,
    ) -> Result<ExecutionPlan, OrchestratorError> {
        let tree = self.tree.read().await;
        if !tree.contains(goal_id) {
            return Err(OrchestratorError::GoalNotFound(goal_id.to_string()));
        }
        let mut plan = self.planner.plan(&tree)?;
        drop(tree);

        plan.status = PlanStatus::Active;
        self.plans.write().await.push(plan.clone());
        Ok(plan)
    }

    /// Execute the leaf goals under a goal as a task DAG
    ///
    /// Goal statuses are written back from the per-task outcomes; dependency
    /// failures surface as `Blocked`, execution failures as `Failed`.
    pub async fn execute_goal(
        &self,
        goal_id: &str,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let tasks = {
            let tree = self.tree.read().await;
            if !tree.contains(goal_id) {
                return Err(OrchestratorError::GoalNotFound(goal_id.to_string()));
            }
            build_tasks(&tree, goal_id, self.assign.as_ref())
        };

        let task_ids: Vec<GoalId> = tasks.iter().map(|t| t.id.clone()).collect();
        {
            let mut tree = self.tree.write().await;
            for id in &task_ids {
                tree.update_goal(id, |g| g.set_status(GoalStatus::InProgress))?;
            }
        }

        let result = match self
            .scheduler
            .execute(tasks, &self.registry, &self.cancel)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                // Nothing was dispatched; roll the leaves back to where they
                // were before this call.
                let mut tree = self.tree.write().await;
                for id in &task_ids {
                    tree.update_goal(id, |g| {
                        g.status = GoalStatus::Pending;
                        g.started_at = None;
                    })?;
                }
                return Err(error.into());
            }
        };

        {
            let mut tree = self.tree.write().await;
            for (id, _) in &result.results {
                tree.update_goal(id, |g| g.set_status(GoalStatus::Completed))?;
            }
            for (id, failure) in &result.errors {
                let status = match failure.kind {
                    TaskFailureKind::DependenciesFailed => GoalStatus::Blocked,
                    TaskFailureKind::Cancelled => GoalStatus::Pending,
                    _ => GoalStatus::Failed,
                };
                // These three kinds mean the worker never ran the task.
                let never_started = matches!(
                    failure.kind,
                    TaskFailureKind::DependenciesFailed
                        | TaskFailureKind::WorkerNotFound
                        | TaskFailureKind::Cancelled
                );
                tree.update_goal(id, |g| {
                    g.set_status(status);
                    if never_started {
                        g.started_at = None;
                    }
                })?;
            }
        }

        if !result.success {
            warn!(goal_id, summary = %result.summary, "goal execution finished with failures");
        }
        Ok(result)
    }

    /// Execute a previously created plan by id
    ///
    /// Runs the plan's goal and records the final plan status: `Completed`
    /// when every task succeeded, `Paused` otherwise (the plan stays
    /// resumable after replanning).
    pub async fn execute_plan(
        &self,
        plan_id: &str,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let goal_id = {
            let plans = self.plans.read().await;
            plans
                .iter()
                .find(|p| p.id == plan_id)
                .map(|p| p.goal_id.clone())
                .ok_or_else(|| OrchestratorError::PlanNotFound(plan_id.to_string()))?
        };

        let result = self.execute_goal(&goal_id).await?;

        let mut plans = self.plans.write().await;
        if let Some(plan) = plans.iter_mut().find(|p| p.id == plan_id) {
            plan.status = if result.success {
                PlanStatus::Completed
            } else {
                PlanStatus::Paused
            };
        }
        Ok(result)
    }

    /// Observe a goal: refresh its metrics, blockers and risks
    pub async fn monitor_progress(
        &self,
        goal_id: &str,
    ) -> Result<ProgressMetrics, OrchestratorError> {
        let (progress, blockers, efficiency) = {
            let tree = self.tree.read().await;
            if !tree.contains(goal_id) {
                return Err(OrchestratorError::GoalNotFound(goal_id.to_string()));
            }
            snapshot_goal(&tree, goal_id)
        };

        let mut monitor = self.monitor.write().await;
        monitor.update_progress(goal_id, progress);
        monitor.record_blockers(goal_id, blockers);
        if let Some(efficiency) = efficiency {
            monitor.record_efficiency(goal_id, efficiency);
        }
        monitor.detect_risks(goal_id);
        Ok(monitor
            .metrics(goal_id)
            .cloned()
            .unwrap_or_else(|| ProgressMetrics::new(goal_id)))
    }

    /// Whether the monitor currently recommends replanning a goal
    pub async fn should_replan(&self, goal_id: &str) -> bool {
        self.monitor.read().await.should_replan(goal_id)
    }

    /// Regenerate the execution plan and unblock satisfiable goals
    ///
    /// The superseded plan stays in the history for audit.
    pub async fn replan(
        &self,
        goal_id: &str,
        reason: &str,
    ) -> Result<ReplanOutcome, OrchestratorError> {
        let mut tree = self.tree.write().await;
        if !tree.contains(goal_id) {
            return Err(OrchestratorError::GoalNotFound(goal_id.to_string()));
        }
        let outcome = self.replanner.replan(&mut tree, &self.planner, reason)?;
        drop(tree);

        let mut plan = outcome.plan.clone();
        plan.status = PlanStatus::Active;
        self.plans.write().await.push(plan);
        Ok(outcome)
    }

    /// All plans created during this run, oldest first
    pub async fn plan_history(&self) -> Vec<ExecutionPlan> {
        self.plans.read().await.clone()
    }

    /// A read-only snapshot of the current tree
    pub async fn tree_snapshot(&self) -> GoalTree {
        self.tree.read().await.clone()
    }

    /// Spawn the periodic monitoring tick for a goal
    ///
    /// Each tick snapshot-reads the tree, refreshes metrics and risks, and
    /// cancels the run when a critical risk appears. The task exits when the
    /// run's token is cancelled.
    pub fn spawn_monitor(&self, goal_id: GoalId, interval: Duration) -> JoinHandle<()> {
        let tree = Arc::clone(&self.tree);
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = {
                    let tree = tree.read().await;
                    if !tree.contains(&goal_id) {
                        continue;
                    }
                    snapshot_goal(&tree, &goal_id)
                };
                let (progress, blockers, efficiency) = snapshot;

                let mut monitor = monitor.write().await;
                monitor.update_progress(&goal_id, progress);
                monitor.record_blockers(&goal_id, blockers);
                if let Some(efficiency) = efficiency {
                    monitor.record_efficiency(&goal_id, efficiency);
                }
                monitor.detect_risks(&goal_id);

                let critical = monitor
                    .metrics(&goal_id)
                    .map(|m| m.has_critical_risk())
                    .unwrap_or(false);
                if critical {
                    warn!(goal_id = %goal_id, "critical risk detected, cancelling run");
                    cancel.cancel();
                    break;
                }
            }
        })
    }
}

/// Derive (progress, blockers, efficiency) for a goal from a tree snapshot
fn snapshot_goal(tree: &GoalTree, goal_id: &str) -> (f64, Vec<GoalId>, Option<f64>) {
    let progress = tree.progress(goal_id);

    let mut scope = tree.descendants(goal_id);
    scope.insert(0, goal_id.to_string());

    let mut blockers: Vec<GoalId> = scope
        .iter()
        .filter(|id| tree.is_blocked(id))
        .cloned()
        .collect();
    blockers.sort();

    let mut actual = 0.0;
    let mut estimated = 0.0;
    for id in &scope {
        if let Some(node) = tree.goal(id) {
            if let Some(spent) = node.actual_effort {
                actual += spent;
                estimated += node.estimated_effort;
            }
        }
    }
    let efficiency = (estimated > 0.0).then(|| actual / estimated);

    (progress, blockers, efficiency)
}

/// Build the task set for the incomplete leaf goals under `goal_id`
///
/// Task dependencies are restricted to leaves inside the executed set;
/// dependency edges whose target lies outside it cannot resolve within this
/// run and are dropped from the task.
fn build_tasks<C: Capability>(
    tree: &GoalTree,
    goal_id: &str,
    assign: &(dyn Fn(&GoalNode) -> C + Send + Sync),
) -> Vec<Task<C>> {
    let mut scope = tree.descendants(goal_id);
    scope.insert(0, goal_id.to_string());

    let leaves: Vec<&GoalNode> = scope
        .iter()
        .filter_map(|id| tree.goal(id))
        .filter(|g| g.is_leaf() && !g.status.is_terminal())
        .collect();
    let leaf_ids: HashSet<&str> = leaves.iter().map(|g| g.id.as_str()).collect();

    leaves
        .iter()
        .map(|goal| {
            let dependencies = goal
                .dependencies
                .iter()
                .filter(|d| leaf_ids.contains(d.as_str()))
                .cloned()
                .collect();
            Task::new(goal.id.clone(), assign(goal))
                .with_payload(json!({
                    "goal_id": goal.id,
                    "description": goal.description,
                    "complexity": goal.complexity,
                }))
                .with_priority(goal.priority)
                .with_dependencies(dependencies)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fmt;

    use concerto_core::types::{AgentResult, GoalClass};
    use concerto_core::worker::Worker;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Cap {
        General,
    }

    impl fmt::Display for Cap {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "general")
        }
    }

    struct OkWorker;

    #[async_trait]
    impl Worker<Cap> for OkWorker {
        fn capability(&self) -> Cap {
            Cap::General
        }

        async fn execute(&self, task: &Task<Cap>) -> AgentResult {
            AgentResult::ok(json!({ "done": task.id }))
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl Worker<Cap> for FailingWorker {
        fn capability(&self) -> Cap {
            Cap::General
        }

        async fn execute(&self, _task: &Task<Cap>) -> AgentResult {
            AgentResult::fail("nothing works today")
        }
    }

    fn orchestrator(worker: Arc<dyn Worker<Cap>>) -> Orchestrator<Cap> {
        let mut registry = WorkerRegistry::new();
        registry.register(worker);
        Orchestrator::new(Arc::new(registry), |_goal: &GoalNode| Cap::General)
    }

    #[test]
    fn test_decompose_plan_execute_pipeline() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(OkWorker));
            let constraints = Constraints {
                class: GoalClass::Concrete,
                complexity: Some(0.4),
            };

            let root_id = orch
                .decompose_goal("Ship the installer", &constraints, 3.0)
                .await
                .unwrap();

            let plan = orch.create_execution_plan(&root_id).await.unwrap();
            assert_eq!(plan.status, PlanStatus::Active);
            assert_eq!(plan.goal_id, root_id);

            let result = orch.execute_goal(&root_id).await.unwrap();
            assert!(result.success, "summary: {}", result.summary);

            // every leaf completed, so the root's derived progress is 1.0
            let tree = orch.tree_snapshot().await;
            assert_eq!(tree.progress(&root_id), 1.0);
            assert_eq!(orch.plan_history().await.len(), 1);
        });
    }

    #[test]
    fn test_failed_execution_marks_goals_failed() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(FailingWorker));
            let constraints = Constraints {
                class: GoalClass::Concrete,
                complexity: Some(0.4),
            };

            let root_id = orch
                .decompose_goal("Ship the installer", &constraints, 3.0)
                .await
                .unwrap();
            let result = orch.execute_goal(&root_id).await.unwrap();

            assert!(!result.success);
            let tree = orch.tree_snapshot().await;
            let statuses: Vec<GoalStatus> = tree
                .children(&root_id)
                .iter()
                .map(|g| g.status)
                .collect();
            // sequential chain: first leaf fails, the rest are blocked
            assert!(statuses.contains(&GoalStatus::Failed));
            assert!(statuses.contains(&GoalStatus::Blocked));
            assert_eq!(tree.progress(&root_id), 0.0);

            // only the leaf that actually ran keeps its start timestamp
            for child in tree.children(&root_id) {
                match child.status {
                    GoalStatus::Failed => assert!(child.started_at.is_some()),
                    GoalStatus::Blocked => assert!(child.started_at.is_none()),
                    other => panic!("unexpected status {other:?}"),
                }
            }
        });
    }

    #[test]
    fn test_monitor_progress_reports_blockers() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(OkWorker));
            let constraints = Constraints {
                class: GoalClass::Concrete,
                complexity: Some(0.4),
            };
            let root_id = orch
                .decompose_goal("Ship the installer", &constraints, 3.0)
                .await
                .unwrap();

            let metrics = orch.monitor_progress(&root_id).await.unwrap();
            assert_eq!(metrics.progress, 0.0);
            // sequential children 2 and 3 wait on their predecessors
            assert_eq!(metrics.blockers.len(), 2);
        });
    }

    #[test]
    fn test_replan_appends_to_plan_history() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(OkWorker));
            let constraints = Constraints {
                class: GoalClass::Concrete,
                complexity: Some(0.4),
            };
            let root_id = orch
                .decompose_goal("Ship the installer", &constraints, 3.0)
                .await
                .unwrap();

            orch.create_execution_plan(&root_id).await.unwrap();
            let outcome = orch.replan(&root_id, "low velocity").await.unwrap();
            assert!(!outcome.changed);

            let history = orch.plan_history().await;
            assert_eq!(history.len(), 2);
            assert_ne!(history[0].id, history[1].id);
        });
    }

    #[test]
    fn test_execute_plan_records_final_plan_status() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(OkWorker));
            let constraints = Constraints {
                class: GoalClass::Concrete,
                complexity: Some(0.4),
            };
            let root_id = orch
                .decompose_goal("Ship the installer", &constraints, 3.0)
                .await
                .unwrap();
            let plan = orch.create_execution_plan(&root_id).await.unwrap();

            let result = orch.execute_plan(&plan.id).await.unwrap();
            assert!(result.success);

            let history = orch.plan_history().await;
            assert_eq!(history[0].status, PlanStatus::Completed);

            let missing = orch.execute_plan("ghost").await.unwrap_err();
            assert!(matches!(missing, OrchestratorError::PlanNotFound(_)));
        });
    }

    #[test]
    fn test_unknown_goal_is_a_validation_error() {
        tokio_test::block_on(async {
            let orch = orchestrator(Arc::new(OkWorker));
            let error = orch.execute_goal("ghost").await.unwrap_err();
            assert!(matches!(error, OrchestratorError::GoalNotFound(_)));
        });
    }
}
