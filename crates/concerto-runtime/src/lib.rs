//! # Concerto Runtime
//!
//! Async scheduling, replanning and orchestration on top of `concerto-core`.
//!
//! This crate contains:
//! - Scheduler: DAG dispatch with bounded concurrency and failure propagation
//! - Replanner: plan regeneration and blocked-goal recovery
//! - Orchestrator: the run-scoped façade wiring tree, monitor, planner and
//!   workers together
//!
//! All state lives for one orchestration run; there is no persistence layer.

pub mod orchestrator;
pub mod replan;
pub mod scheduler;

pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use replan::{ReplanError, ReplanOutcome, Replanner};
pub use scheduler::{
    OrchestrationResult, Scheduler, SchedulerError, TaskFailure, TaskFailureKind,
};
