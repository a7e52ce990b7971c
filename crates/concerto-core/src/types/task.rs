//! Task and worker-result type definitions
//!
//! Task is the unit dispatched to a worker. Tasks are transient: created per
//! orchestration run and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Type alias for Task ID
pub type TaskId = String;

/// The unit of work dispatched to a worker
///
/// Generic over the capability type `C` so applications dispatch on a closed
/// enum instead of string tags.
#[derive(Debug, Clone)]
pub struct Task<C> {
    /// Unique identifier for this task
    pub id: TaskId,
    /// The capability required to execute this task
    pub kind: C,
    /// Input payload (a JSON object); enriched with dependency outputs before
    /// dispatch
    pub payload: Value,
    /// Priority (higher = more urgent)
    pub priority: f64,
    /// IDs of tasks this task depends on
    pub dependencies: Vec<TaskId>,
    /// Optional ambient context
    pub context: Option<HashMap<String, Value>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl<C> Task<C> {
    /// Create a new task
    pub fn new(id: impl Into<TaskId>, kind: C) -> Self {
        Self {
            id: id.into(),
            kind,
            payload: Value::Null,
            priority: 1.0,
            dependencies: Vec::new(),
            context: None,
            created_at: Utc::now(),
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the dependency task ids
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set the ambient context
    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Execution metadata attached to a worker result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,
    /// Worker-reported confidence in [0, 1]
    pub confidence: f64,
    /// Follow-up suggestions
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Structured result returned by a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the worker succeeded
    pub success: bool,
    /// Opaque output data
    #[serde(default)]
    pub data: Value,
    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Execution metadata
    #[serde(default)]
    pub metadata: Option<ResultMetadata>,
    /// Non-fatal warnings
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Hints for follow-up tasks
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl AgentResult {
    /// Create a successful result
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: None,
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: None,
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    /// Attach execution metadata
    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Attach next-step hints
    pub fn with_next_steps(mut self, next_steps: Vec<String>) -> Self {
        self.next_steps = next_steps;
        self
    }
}
