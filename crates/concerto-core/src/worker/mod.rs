//! Worker contract
//!
//! Workers are external collaborators that perform the actual work for one
//! task kind. The engine never inspects a worker's internals; it only looks
//! at `AgentResult::success` and `AgentResult::error`.
//!
//! Dispatch is typed: applications define a closed capability enum and
//! register exactly one worker per capability in an explicitly-owned
//! registry. There are no process-wide singletons.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::types::{AgentResult, Task};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

/// Bound for worker capability types
///
/// Applications implement this implicitly by defining an enum that is
/// `Clone + Eq + Hash + Display`; matching on it stays exhaustive at compile
/// time.
pub trait Capability: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}

impl<T> Capability for T where T: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}

/// Worker trait - the contract every external collaborator satisfies
///
/// A worker registers under exactly one capability and is a black box to the
/// scheduler.
#[async_trait]
pub trait Worker<C: Capability>: Send + Sync {
    /// The capability this worker provides
    fn capability(&self) -> C;

    /// Short human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Execute a task and return a structured result
    async fn execute(&self, task: &Task<C>) -> AgentResult;
}

/// Worker registry - typed capability → implementation map
///
/// Constructed and owned by the orchestration run, passed by injection.
pub struct WorkerRegistry<C: Capability> {
    workers: HashMap<C, Arc<dyn Worker<C>>>,
}

impl<C: Capability> WorkerRegistry<C> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Register a worker under its capability, replacing any previous one
    pub fn register(&mut self, worker: Arc<dyn Worker<C>>) {
        self.workers.insert(worker.capability(), worker);
    }

    /// Look up the worker for a capability
    pub fn get(&self, capability: &C) -> Option<Arc<dyn Worker<C>>> {
        self.workers.get(capability).cloned()
    }

    /// All registered capabilities
    pub fn capabilities(&self) -> Vec<C> {
        self.workers.keys().cloned().collect()
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl<C: Capability> Default for WorkerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestCapability {
        Build,
        Review,
    }

    impl fmt::Display for TestCapability {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestCapability::Build => write!(f, "build"),
                TestCapability::Review => write!(f, "review"),
            }
        }
    }

    struct EchoWorker;

    #[async_trait]
    impl Worker<TestCapability> for EchoWorker {
        fn capability(&self) -> TestCapability {
            TestCapability::Build
        }

        async fn execute(&self, task: &Task<TestCapability>) -> AgentResult {
            AgentResult::ok(json!({ "echo": task.id }))
        }
    }

    #[test]
    fn test_registry_dispatch() {
        tokio_test::block_on(async {
            let mut registry = WorkerRegistry::new();
            registry.register(Arc::new(EchoWorker));

            let worker = registry.get(&TestCapability::Build).expect("worker");
            let task = Task::new("t1", TestCapability::Build);
            let result = worker.execute(&task).await;

            assert!(result.success);
            assert_eq!(result.data, json!({ "echo": "t1" }));
            assert!(registry.get(&TestCapability::Review).is_none());
        });
    }

    #[test]
    fn test_register_replaces_previous_worker() {
        let mut registry: WorkerRegistry<TestCapability> = WorkerRegistry::new();
        registry.register(Arc::new(EchoWorker));
        registry.register(Arc::new(EchoWorker));
        assert_eq!(registry.len(), 1);
    }
}
