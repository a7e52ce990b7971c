//! Task scheduling and dispatch
//!
//! Builds a DAG from declared task dependencies, fails fast on cycles, and
//! dispatches tasks to registered workers with bounded concurrency. A task
//! never starts before every dependency has reached a terminal state;
//! failures propagate to transitive dependents without aborting sibling
//! branches.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use concerto_core::types::{AgentResult, Task, TaskId};
use concerto_core::worker::{Capability, WorkerRegistry};

/// Default bound on concurrently running tasks
const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default orchestrator-level timeout per dispatched task
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Scheduling errors that abort a run before any dispatch
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("circular dependency involving task: {0}")]
    CircularDependency(TaskId),

    #[error("task '{0}' declares unknown dependency '{1}'")]
    UnknownDependency(TaskId, TaskId),
}

/// Why an individual task did not produce a successful result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFailureKind {
    /// The worker ran and reported failure (or panicked)
    ExecutionFailed,
    /// An upstream dependency failed; the task was never dispatched
    DependenciesFailed,
    /// No worker is registered for the task's capability
    WorkerNotFound,
    /// The worker exceeded the orchestrator-level timeout
    TimedOut,
    /// The run was cancelled before the task could start
    Cancelled,
}

/// A per-task failure record
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub kind: TaskFailureKind,
    pub message: String,
}

impl TaskFailure {
    fn new(kind: TaskFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one scheduling run
///
/// Partial-failure semantics: the run is marked failed when any task failed,
/// but every task that was not blocked by a failed dependency still executed.
#[derive(Debug)]
pub struct OrchestrationResult {
    /// Whether every task succeeded
    pub success: bool,
    /// Successful results keyed by task id
    pub results: HashMap<TaskId, AgentResult>,
    /// Failures keyed by task id
    pub errors: HashMap<TaskId, TaskFailure>,
    /// Wall-clock duration of the run
    pub duration: Duration,
    /// Human-readable summary enumerating every failure
    pub summary: String,
}

/// The scheduler
pub struct Scheduler {
    max_parallel: usize,
    task_timeout: Duration,
}

impl Scheduler {
    /// Create a scheduler with default bounds
    pub fn new() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Set the maximum number of concurrently running tasks
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Set the per-task timeout
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Execute a task set against the registry
    ///
    /// Fails fast (zero tasks dispatched) on unknown dependencies or a
    /// dependency cycle. Cancellation stops new dispatches; in-flight tasks
    /// are allowed to finish.
    pub async fn execute<C: Capability>(
        &self,
        tasks: Vec<Task<C>>,
        registry: &WorkerRegistry<C>,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, SchedulerError> {
        let started = Instant::now();
        let total = tasks.len();

        let tasks: HashMap<TaskId, Task<C>> =
            tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        let order = topological_order(&tasks)?;

        let mut pending: Vec<TaskId> = order;
        let mut results: HashMap<TaskId, AgentResult> = HashMap::new();
        let mut errors: HashMap<TaskId, TaskFailure> = HashMap::new();
        let mut running: JoinSet<(TaskId, Result<AgentResult, TaskFailure>)> = JoinSet::new();
        // Maps runtime join handles back to task ids so a panicking worker
        // still settles its task.
        let mut in_flight: HashMap<tokio::task::Id, TaskId> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                for id in pending.drain(..) {
                    errors.insert(
                        id,
                        TaskFailure::new(
                            TaskFailureKind::Cancelled,
                            "run cancelled before dispatch",
                        ),
                    );
                }
            } else {
                self.launch_ready(
                    &tasks,
                    &mut pending,
                    &results,
                    &mut errors,
                    &mut running,
                    &mut in_flight,
                    registry,
                );
            }

            if running.is_empty() {
                if pending.is_empty() {
                    break;
                }
                if !cancel.is_cancelled() {
                    // Unreachable after a successful topological sort; guard
                    // against silently hanging if an invariant is broken.
                    for id in pending.drain(..) {
                        errors.insert(
                            id,
                            TaskFailure::new(
                                TaskFailureKind::ExecutionFailed,
                                "task never became ready",
                            ),
                        );
                    }
                    break;
                }
                continue;
            }

            if let Some(joined) = running.join_next_with_id().await {
                match joined {
                    Ok((handle_id, (id, Ok(result)))) => {
                        in_flight.remove(&handle_id);
                        debug!(task_id = %id, "task completed");
                        results.insert(id, result);
                    }
                    Ok((handle_id, (id, Err(failure)))) => {
                        in_flight.remove(&handle_id);
                        warn!(task_id = %id, error = %failure.message, "task failed");
                        errors.insert(id, failure);
                    }
                    Err(join_error) => {
                        // A panic unwinds past the worker before it can
                        // report a result; recover the task id from the
                        // in-flight map so the task still settles as failed.
                        match in_flight.remove(&join_error.id()) {
                            Some(id) => {
                                warn!(task_id = %id, error = %join_error, "worker panicked");
                                errors.insert(
                                    id,
                                    TaskFailure::new(
                                        TaskFailureKind::ExecutionFailed,
                                        format!("worker panicked: {join_error}"),
                                    ),
                                );
                            }
                            None => warn!(error = %join_error, "worker panicked"),
                        }
                    }
                }
            }
        }

        let success = errors.is_empty();
        let summary = summarize(total, &results, &errors);
        Ok(OrchestrationResult {
            success,
            results,
            errors,
            duration: started.elapsed(),
            summary,
        })
    }

    /// Move ready pending tasks into the running set, up to `max_parallel`
    ///
    /// A task whose dependencies all succeeded is dispatched; a task with any
    /// failed dependency is recorded as failed-by-propagation immediately so
    /// its own dependents can settle in the same pass.
    fn launch_ready<C: Capability>(
        &self,
        tasks: &HashMap<TaskId, Task<C>>,
        pending: &mut Vec<TaskId>,
        results: &HashMap<TaskId, AgentResult>,
        errors: &mut HashMap<TaskId, TaskFailure>,
        running: &mut JoinSet<(TaskId, Result<AgentResult, TaskFailure>)>,
        in_flight: &mut HashMap<tokio::task::Id, TaskId>,
        registry: &WorkerRegistry<C>,
    ) {
        let mut index = 0;
        while index < pending.len() {
            let id = &pending[index];
            let task = &tasks[id];

            let failed_deps: Vec<&TaskId> = task
                .dependencies
                .iter()
                .filter(|d| errors.contains_key(*d))
                .collect();
            if !failed_deps.is_empty() {
                let message = format!(
                    "Dependencies failed: {}",
                    failed_deps
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                errors.insert(
                    pending.remove(index),
                    TaskFailure::new(TaskFailureKind::DependenciesFailed, message),
                );
                continue;
            }

            let deps_done = task
                .dependencies
                .iter()
                .all(|d| results.contains_key(d));
            if !deps_done {
                index += 1;
                continue;
            }

            let Some(worker) = registry.get(&task.kind) else {
                errors.insert(
                    pending.remove(index),
                    TaskFailure::new(
                        TaskFailureKind::WorkerNotFound,
                        format!("no worker registered for capability '{}'", task.kind),
                    ),
                );
                continue;
            };

            if running.len() >= self.max_parallel {
                index += 1;
                continue;
            }

            let mut task = task.clone();
            enrich_payload(&mut task, tasks, results);
            pending.remove(index);

            let timeout = self.task_timeout;
            let task_id = task.id.clone();
            let handle = running.spawn(async move {
                let id = task.id.clone();
                debug!(task_id = %id, kind = %task.kind, "dispatching task");
                match tokio::time::timeout(timeout, worker.execute(&task)).await {
                    Ok(result) if result.success => (id, Ok(result)),
                    Ok(result) => {
                        let message = result
                            .error
                            .unwrap_or_else(|| "worker reported failure".to_string());
                        (
                            id,
                            Err(TaskFailure::new(TaskFailureKind::ExecutionFailed, message)),
                        )
                    }
                    Err(_) => (
                        id,
                        Err(TaskFailure::new(
                            TaskFailureKind::TimedOut,
                            format!("worker exceeded {}s timeout", timeout.as_secs()),
                        )),
                    ),
                }
            });
            in_flight.insert(handle.id(), task_id);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge each successful dependency's output into the task payload, keyed by
/// the dependency's capability (`"<capability>_result"`)
fn enrich_payload<C: Capability>(
    task: &mut Task<C>,
    tasks: &HashMap<TaskId, Task<C>>,
    results: &HashMap<TaskId, AgentResult>,
) {
    if task.dependencies.is_empty() {
        return;
    }
    if !task.payload.is_object() {
        task.payload = serde_json::Value::Object(serde_json::Map::new());
    }
    let Some(object) = task.payload.as_object_mut() else {
        return;
    };
    for dep_id in &task.dependencies {
        let (Some(dep), Some(result)) = (tasks.get(dep_id), results.get(dep_id)) else {
            continue;
        };
        object.insert(format!("{}_result", dep.kind), result.data.clone());
    }
}

/// Topologically order the task set, failing on unknown dependencies or
/// cycles
///
/// Depth-first with a "visiting" marker; a marked revisit is a cycle and the
/// whole run is rejected. A cycle is never broken by dropping an edge.
fn topological_order<C: Capability>(
    tasks: &HashMap<TaskId, Task<C>>,
) -> Result<Vec<TaskId>, SchedulerError> {
    for task in tasks.values() {
        for dep in &task.dependencies {
            if !tasks.contains_key(dep) {
                return Err(SchedulerError::UnknownDependency(
                    task.id.clone(),
                    dep.clone(),
                ));
            }
        }
    }

    let mut ids: Vec<&TaskId> = tasks.keys().collect();
    ids.sort();

    let mut order = Vec::with_capacity(tasks.len());
    let mut done: HashSet<TaskId> = HashSet::new();
    let mut visiting: HashSet<TaskId> = HashSet::new();
    for id in ids {
        visit(id, tasks, &mut visiting, &mut done, &mut order)?;
    }
    Ok(order)
}

fn visit<C: Capability>(
    id: &TaskId,
    tasks: &HashMap<TaskId, Task<C>>,
    visiting: &mut HashSet<TaskId>,
    done: &mut HashSet<TaskId>,
    order: &mut Vec<TaskId>,
) -> Result<(), SchedulerError> {
    if done.contains(id) {
        return Ok(());
    }
    if !visiting.insert(id.clone()) {
        return Err(SchedulerError::CircularDependency(id.clone()));
    }
    for dep in &tasks[id].dependencies {
        visit(dep, tasks, visiting, done, order)?;
    }
    visiting.remove(id);
    done.insert(id.clone());
    order.push(id.clone());
    Ok(())
}

/// Textual run summary enumerating every failed task with its reason
fn summarize(
    total: usize,
    results: &HashMap<TaskId, AgentResult>,
    errors: &HashMap<TaskId, TaskFailure>,
) -> String {
    let mut summary = format!(
        "{} tasks: {} succeeded, {} failed",
        total,
        results.len(),
        errors.len()
    );
    if !errors.is_empty() {
        let mut failed: Vec<(&TaskId, &TaskFailure)> = errors.iter().collect();
        failed.sort_by(|a, b| a.0.cmp(b.0));
        for (id, failure) in failed {
            summary.push_str(&format!("\n  {}: {}", id, failure.message));
        }
    }
    summary
}
