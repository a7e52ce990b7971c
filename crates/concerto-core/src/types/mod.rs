//! Core type definitions for Concerto
//!
//! This module contains the fundamental types used throughout the engine:
//! - GoalNode: a unit of intent in the goal hierarchy
//! - RiskFactor / ProgressMetrics: monitoring state
//! - ExecutionPlan / ExecutionPhase: planning output
//! - Task / AgentResult: the unit dispatched to workers

mod goal;
mod plan;
mod risk;
mod task;

pub use goal::{GoalClass, GoalId, GoalNode, GoalStatus};
pub use plan::{
    ContingencyPlan, ContingencyTrigger, ExecutionPhase, ExecutionPlan, ExecutionStrategy,
    Milestone, PhaseStatus, PlanId, PlanStatus, ResourceKind, ResourceRequirement, Timeline,
};
pub use risk::{ProgressMetrics, RiskCause, RiskFactor, RiskSeverity};
pub use task::{AgentResult, ResultMetadata, Task, TaskId};
