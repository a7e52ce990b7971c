//! Risk and progress-metric types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::GoalId;

/// Risk severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// The detection rule that produced a risk
///
/// Risks are deduplicated per goal by cause, so repeated monitoring ticks do
/// not grow the risk list without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCause {
    /// Observed velocity fell below the warning threshold
    LowVelocity,
    /// The goal has one or more active blockers
    ActiveBlockers,
}

impl fmt::Display for RiskCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCause::LowVelocity => write!(f, "low_velocity"),
            RiskCause::ActiveBlockers => write!(f, "active_blockers"),
        }
    }
}

/// A detected risk attached to a goal
///
/// Created by risk-detection rules; removed only by explicit resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Unique identifier for this risk
    pub id: String,
    /// The goal this risk belongs to
    pub goal_id: GoalId,
    /// Which detection rule produced it
    pub cause: RiskCause,
    /// Severity of the risk
    pub severity: RiskSeverity,
    /// Probability the risk materializes, in [0, 1]
    pub probability: f64,
    /// Impact if it materializes, in [0, 1]
    pub impact: f64,
    /// Suggested mitigation, if any
    #[serde(default)]
    pub mitigation: Option<String>,
    /// When the risk was first detected
    pub detected_at: DateTime<Utc>,
}

impl RiskFactor {
    /// Create a new risk factor
    pub fn new(
        goal_id: impl Into<GoalId>,
        cause: RiskCause,
        severity: RiskSeverity,
        probability: f64,
        impact: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal_id: goal_id.into(),
            cause,
            severity,
            probability: probability.clamp(0.0, 1.0),
            impact: impact.clamp(0.0, 1.0),
            mitigation: None,
            detected_at: Utc::now(),
        }
    }

    /// Attach a mitigation suggestion
    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = Some(mitigation.into());
        self
    }
}

/// Observed progress state for a single goal
///
/// Progress is derived from the goal tree, never stored authoritatively here.
/// Metrics are created on first observation and superseded in place on every
/// monitoring tick; they are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMetrics {
    /// The observed goal
    pub goal_id: GoalId,
    /// Overall progress in [0, 1], recomputed from the tree
    pub progress: f64,
    /// Goal completion rate per hour
    pub velocity: f64,
    /// Actual / estimated effort ratio
    pub efficiency: f64,
    /// Goals currently blocking this one
    #[serde(default)]
    pub blockers: Vec<GoalId>,
    /// Active risk factors
    #[serde(default)]
    pub risks: Vec<RiskFactor>,
    /// Last observation time
    pub updated_at: DateTime<Utc>,
}

impl ProgressMetrics {
    /// Create metrics for a goal's first observation
    pub fn new(goal_id: impl Into<GoalId>) -> Self {
        Self {
            goal_id: goal_id.into(),
            progress: 0.0,
            velocity: 1.0,
            efficiency: 1.0,
            blockers: Vec::new(),
            risks: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Check whether any active risk is critical
    pub fn has_critical_risk(&self) -> bool {
        self.risks
            .iter()
            .any(|r| r.severity == RiskSeverity::Critical)
    }
}
