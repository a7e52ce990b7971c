//! Execution plan type definitions
//!
//! Plans are produced by the ExecutionPlanner and are immutable once created.
//! Replanning produces a fresh plan; superseded plans are retained for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GoalId;

/// Type alias for Plan ID
pub type PlanId = String;

/// Execution strategy hint
///
/// Advisory metadata consumed by the scheduler, not a hard execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Hybrid,
}

/// Lifecycle status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Abandoned,
}

/// Lifecycle status of a phase, distinct from goal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

/// An ordered grouping of goals sharing a tree depth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// Unique identifier for this phase
    pub id: String,
    /// Display name, e.g. "Phase 2"
    pub name: String,
    /// Tree depth of the goals in this phase (0 = root)
    pub level: usize,
    /// Ordered goal ids at this level
    pub goal_ids: Vec<GoalId>,
    /// Phase status
    pub status: PhaseStatus,
    /// Sum of the phase goals' estimated effort, in hours
    pub estimated_duration: f64,
}

/// Kind of aggregate resource requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute capacity, scaled by summed complexity
    Computational,
    /// Worker count, scaled by goal count
    Agents,
    /// Wall-clock budget, scaled by summed effort
    Time,
}

/// An aggregate resource requirement for the whole plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub kind: ResourceKind,
    pub amount: f64,
    pub unit: String,
}

/// A timeline milestone, one per phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    /// The phase this milestone closes
    pub phase_id: String,
    pub deadline: DateTime<Utc>,
}

/// Plan timeline with milestones and the heuristic critical path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub milestones: Vec<Milestone>,
    /// Highest-attention incomplete goals, from the tree heuristic
    pub critical_path: Vec<GoalId>,
}

/// Condition that activates a contingency plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyTrigger {
    BlockerPresent,
    LowVelocity,
    CriticalRisk,
}

/// A declarative contingency template
///
/// Surfaced to the caller for manual or automated response; never executed by
/// the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyPlan {
    pub trigger: ContingencyTrigger,
    /// Lower value = handled first
    pub priority: u8,
    /// Ordered response actions
    pub actions: Vec<String>,
}

/// A complete execution plan for one goal tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Unique identifier for this plan
    pub id: PlanId,
    /// The root goal this plan covers
    pub goal_id: GoalId,
    /// Advisory execution strategy
    pub strategy: ExecutionStrategy,
    /// Ordered execution phases
    pub phases: Vec<ExecutionPhase>,
    /// Aggregate resource requirements
    pub resources: Vec<ResourceRequirement>,
    /// Timeline with milestones and critical path
    pub timeline: Timeline,
    /// Declarative contingency templates
    pub contingencies: Vec<ContingencyPlan>,
    /// Plan status
    pub status: PlanStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Total estimated duration across all phases, in hours
    pub fn total_duration(&self) -> f64 {
        self.phases.iter().map(|p| p.estimated_duration).sum()
    }
}
