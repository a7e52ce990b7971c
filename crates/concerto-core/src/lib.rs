//! # Concerto Core
//!
//! Core abstractions and deterministic logic for the Concerto
//! goal-orchestration engine.
//!
//! This crate contains:
//! - GoalNode / GoalTree / Task / ExecutionPlan definitions
//! - Decomposer / ProgressMonitor / ExecutionPlanner
//! - The Worker contract and typed registry
//!
//! This crate does NOT care about:
//! - How a worker produces its output
//! - Async scheduling and dispatch (see `concerto-runtime`)
//! - Persistence: all state lives for one orchestration run

pub mod decompose;
pub mod monitor;
pub mod planner;
pub mod tree;
pub mod types;
pub mod worker;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::decompose::{
        assess_complexity, Constraints, Decomposer, DecomposeError, DecompositionStrategy,
    };
    pub use crate::monitor::{DefaultRiskScorer, ProgressMonitor, RiskAssessment, RiskScorer};
    pub use crate::planner::{ExecutionPlanner, PlanError};
    pub use crate::tree::{GoalTree, TreeError};
    pub use crate::types::{
        AgentResult, ContingencyPlan, ContingencyTrigger, ExecutionPhase, ExecutionPlan,
        ExecutionStrategy, GoalClass, GoalId, GoalNode, GoalStatus, Milestone, PhaseStatus,
        PlanId, PlanStatus, ProgressMetrics, ResourceKind, ResourceRequirement, ResultMetadata,
        RiskCause, RiskFactor, RiskSeverity, Task, TaskId, Timeline,
    };
    pub use crate::worker::{CancellationToken, Capability, Worker, WorkerRegistry};
}

// Re-export key types at crate root
pub use decompose::{Constraints, Decomposer};
pub use monitor::ProgressMonitor;
pub use planner::ExecutionPlanner;
pub use tree::GoalTree;
pub use types::{AgentResult, ExecutionPlan, GoalNode, Task};
pub use worker::{Capability, Worker, WorkerRegistry};
