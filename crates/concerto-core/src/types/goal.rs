//! Goal type definitions
//!
//! GoalNode is the unit of intent in the hierarchy. Parent/child edges form a
//! tree; dependency edges form a directed graph overlaid on that tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type alias for Goal ID
pub type GoalId = String;

/// Goal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Not yet started
    Pending,
    /// Currently being worked on
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Cannot proceed until its dependencies resolve
    Blocked,
}

impl GoalStatus {
    /// Check if the goal has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Failed)
    }
}

/// Goal classification - drives decomposition strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalClass {
    /// High-level intent without a concrete deliverable
    Abstract,
    /// Directly actionable with a concrete deliverable
    Concrete,
    /// Mix of abstract and concrete sub-intents
    Hybrid,
}

/// A single goal in the hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalNode {
    /// Unique identifier for this goal
    pub id: GoalId,
    /// Human-readable description of the intent
    pub description: String,
    /// Classification of the goal
    pub class: GoalClass,
    /// Priority (higher = more urgent)
    pub priority: f64,
    /// Assessed complexity in [0, 1]
    pub complexity: f64,
    /// Current lifecycle status
    pub status: GoalStatus,
    /// Parent goal (weak reference by id)
    #[serde(default)]
    pub parent_id: Option<GoalId>,
    /// Ordered child goal ids (owned)
    #[serde(default)]
    pub children_ids: Vec<GoalId>,
    /// Dependency goal ids (weak references, may span subtrees)
    #[serde(default)]
    pub dependencies: Vec<GoalId>,
    /// Estimated effort in hours
    pub estimated_effort: f64,
    /// Actual effort in hours, recorded on completion
    #[serde(default)]
    pub actual_effort: Option<f64>,
    /// When work on this goal started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When this goal reached a terminal state
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl GoalNode {
    /// Create a new pending goal with default classification and priority
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            class: GoalClass::Abstract,
            priority: 1.0,
            complexity: 0.5,
            status: GoalStatus::Pending,
            parent_id: None,
            children_ids: Vec::new(),
            dependencies: Vec::new(),
            estimated_effort: 5.0,
            actual_effort: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Set the classification
    pub fn with_class(mut self, class: GoalClass) -> Self {
        self.class = class;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the complexity (clamped to [0, 1])
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity.clamp(0.0, 1.0);
        self
    }

    /// Set the estimated effort in hours
    pub fn with_estimated_effort(mut self, hours: f64) -> Self {
        self.estimated_effort = hours;
        self
    }

    /// Set the dependency ids
    pub fn with_dependencies(mut self, dependencies: Vec<GoalId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Check whether this goal has no children
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    /// Transition status, stamping start/completion timestamps
    pub fn set_status(&mut self, status: GoalStatus) {
        match status {
            GoalStatus::InProgress if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            GoalStatus::Completed | GoalStatus::Failed => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        self.status = status;
    }
}
