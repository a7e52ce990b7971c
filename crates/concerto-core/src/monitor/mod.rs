//! Progress monitoring
//!
//! Observes goal-tree execution over time, maintains per-goal metrics with a
//! bounded velocity window, runs deterministic risk-detection rules, and
//! decides when replanning is warranted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::types::{GoalId, ProgressMetrics, RiskCause, RiskFactor, RiskSeverity};

/// Number of velocity samples retained per goal
const VELOCITY_WINDOW: usize = 5;

/// Velocity assumed before any samples exist
const DEFAULT_VELOCITY: f64 = 1.0;

/// Velocity below which a goal is considered at risk
const VELOCITY_WARNING: f64 = 0.5;

/// Velocity below which replanning is triggered
const VELOCITY_REPLAN: f64 = 0.2;

/// Blocker count above which replanning is triggered
const BLOCKER_REPLAN: usize = 2;

/// Horizon used when velocity is unusable
const FALLBACK_HORIZON_DAYS: i64 = 7;

/// Deterministic scoring for a detected risk
#[derive(Debug, Clone, Copy)]
pub struct RiskAssessment {
    pub severity: RiskSeverity,
    pub probability: f64,
    pub impact: f64,
}

/// Pluggable risk scoring
///
/// The engine never uses randomized scores; implementations must be
/// deterministic functions of the cause and observed metrics.
pub trait RiskScorer: Send + Sync {
    fn score(&self, cause: RiskCause, metrics: &ProgressMetrics) -> RiskAssessment;
}

/// Default scorer with fixed per-rule constants
pub struct DefaultRiskScorer;

impl RiskScorer for DefaultRiskScorer {
    fn score(&self, cause: RiskCause, _metrics: &ProgressMetrics) -> RiskAssessment {
        match cause {
            RiskCause::LowVelocity => RiskAssessment {
                severity: RiskSeverity::Medium,
                probability: 0.6,
                impact: 0.5,
            },
            RiskCause::ActiveBlockers => RiskAssessment {
                severity: RiskSeverity::High,
                probability: 0.8,
                impact: 0.7,
            },
        }
    }
}

/// Progress monitor for one orchestration run
pub struct ProgressMonitor {
    metrics: HashMap<GoalId, ProgressMetrics>,
    samples: HashMap<GoalId, VecDeque<f64>>,
    scorer: Arc<dyn RiskScorer>,
}

impl ProgressMonitor {
    /// Create a monitor with the default deterministic scorer
    pub fn new() -> Self {
        Self::with_scorer(Arc::new(DefaultRiskScorer))
    }

    /// Create a monitor with a custom risk scorer
    pub fn with_scorer(scorer: Arc<dyn RiskScorer>) -> Self {
        Self {
            metrics: HashMap::new(),
            samples: HashMap::new(),
            scorer,
        }
    }

    /// Record an observed progress value for a goal
    ///
    /// Derives a velocity sample from the progress delta over elapsed time.
    /// Metrics are created on first observation and superseded in place
    /// afterwards.
    pub fn update_progress(&mut self, goal_id: &str, progress: f64) {
        self.update_progress_at(goal_id, progress, Utc::now());
    }

    /// Record an observation at an explicit time (deterministic testing seam)
    pub fn update_progress_at(&mut self, goal_id: &str, progress: f64, now: DateTime<Utc>) {
        let progress = progress.clamp(0.0, 1.0);
        let entry = self
            .metrics
            .entry(goal_id.to_string())
            .or_insert_with(|| ProgressMetrics::new(goal_id));

        let elapsed_hours = (now - entry.updated_at).num_milliseconds() as f64 / 3_600_000.0;
        if elapsed_hours > 0.0 {
            let sample = (progress - entry.progress) / elapsed_hours;
            let window = self.samples.entry(goal_id.to_string()).or_default();
            window.push_back(sample);
            while window.len() > VELOCITY_WINDOW {
                window.pop_front();
            }
        }

        entry.progress = progress;
        entry.velocity = mean_velocity(self.samples.get(goal_id));
        entry.updated_at = now;
    }

    /// Record an explicit velocity sample for a goal
    pub fn record_velocity_sample(&mut self, goal_id: &str, sample: f64) {
        let window = self.samples.entry(goal_id.to_string()).or_default();
        window.push_back(sample);
        while window.len() > VELOCITY_WINDOW {
            window.pop_front();
        }
        let velocity = mean_velocity(Some(&*window));
        self.metrics
            .entry(goal_id.to_string())
            .or_insert_with(|| ProgressMetrics::new(goal_id))
            .velocity = velocity;
    }

    /// Record the current blocker set for a goal
    pub fn record_blockers(&mut self, goal_id: &str, blockers: Vec<GoalId>) {
        self.metrics
            .entry(goal_id.to_string())
            .or_insert_with(|| ProgressMetrics::new(goal_id))
            .blockers = blockers;
    }

    /// Record the effort-efficiency ratio for a goal
    pub fn record_efficiency(&mut self, goal_id: &str, efficiency: f64) {
        self.metrics
            .entry(goal_id.to_string())
            .or_insert_with(|| ProgressMetrics::new(goal_id))
            .efficiency = efficiency;
    }

    /// Current metrics for a goal
    pub fn metrics(&self, goal_id: &str) -> Option<&ProgressMetrics> {
        self.metrics.get(goal_id)
    }

    /// Mean of the last recorded velocity samples; 1.0 with no history
    pub fn velocity(&self, goal_id: &str) -> f64 {
        mean_velocity(self.samples.get(goal_id))
    }

    /// Estimated completion time for a goal
    ///
    /// now + (1 − progress) / velocity hours; a non-positive velocity falls
    /// back to a fixed generous horizon instead of dividing by zero.
    pub fn estimate_completion(&self, goal_id: &str) -> DateTime<Utc> {
        self.estimate_completion_at(goal_id, Utc::now())
    }

    /// Completion estimate against an explicit clock (testing seam)
    pub fn estimate_completion_at(&self, goal_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let (progress, velocity) = self
            .metrics
            .get(goal_id)
            .map(|m| (m.progress, m.velocity))
            .unwrap_or((0.0, DEFAULT_VELOCITY));

        if velocity <= 0.0 {
            return now + Duration::days(FALLBACK_HORIZON_DAYS);
        }
        let hours = (1.0 - progress) / velocity;
        now + Duration::milliseconds((hours * 3_600_000.0) as i64)
    }

    /// Run the risk-detection rules for a goal
    ///
    /// Rules are independent and additive, deduplicated by cause; a risk
    /// leaves the list only through [`resolve_risk`](Self::resolve_risk).
    pub fn detect_risks(&mut self, goal_id: &str) -> Vec<RiskFactor> {
        let scorer = Arc::clone(&self.scorer);
        let Some(entry) = self.metrics.get_mut(goal_id) else {
            return Vec::new();
        };

        let mut detected = Vec::new();
        if entry.velocity < VELOCITY_WARNING {
            detected.push(RiskCause::LowVelocity);
        }
        if !entry.blockers.is_empty() {
            detected.push(RiskCause::ActiveBlockers);
        }

        for cause in detected {
            if entry.risks.iter().any(|r| r.cause == cause) {
                continue;
            }
            let assessment = scorer.score(cause, entry);
            debug!(goal_id, %cause, "risk detected");
            entry.risks.push(RiskFactor::new(
                goal_id,
                cause,
                assessment.severity,
                assessment.probability,
                assessment.impact,
            ));
        }

        entry.risks.clone()
    }

    /// Explicitly resolve a risk; returns whether it existed
    pub fn resolve_risk(&mut self, goal_id: &str, risk_id: &str) -> bool {
        let Some(entry) = self.metrics.get_mut(goal_id) else {
            return false;
        };
        let before = entry.risks.len();
        entry.risks.retain(|r| r.id != risk_id);
        entry.risks.len() != before
    }

    /// Goals that are dragging the run: blocked or below the velocity
    /// warning, worst first (most blockers, then slowest)
    pub fn identify_bottlenecks(&self) -> Vec<GoalId> {
        let mut slow: Vec<&ProgressMetrics> = self
            .metrics
            .values()
            .filter(|m| !m.blockers.is_empty() || m.velocity < VELOCITY_WARNING)
            .collect();
        slow.sort_by(|a, b| {
            b.blockers
                .len()
                .cmp(&a.blockers.len())
                .then(a.velocity.total_cmp(&b.velocity))
        });
        slow.into_iter().map(|m| m.goal_id.clone()).collect()
    }

    /// Whether the goal's observed state warrants replanning
    ///
    /// True iff velocity < 0.2, or more than 2 blockers, or any critical
    /// risk.
    pub fn should_replan(&self, goal_id: &str) -> bool {
        let Some(m) = self.metrics.get(goal_id) else {
            return false;
        };
        m.velocity < VELOCITY_REPLAN
            || m.blockers.len() > BLOCKER_REPLAN
            || m.has_critical_risk()
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_velocity(samples: Option<&VecDeque<f64>>) -> f64 {
    match samples {
        Some(window) if !window.is_empty() => {
            window.iter().sum::<f64>() / window.len() as f64
        }
        _ => DEFAULT_VELOCITY,
    }
}
