//! Execution planning
//!
//! Converts a goal tree into an execution plan: breadth-first phases,
//! aggregate resource requirements, a milestone timeline, declarative
//! contingency templates and an advisory execution strategy.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::tree::GoalTree;
use crate::types::{
    ContingencyPlan, ContingencyTrigger, ExecutionPhase, ExecutionPlan, ExecutionStrategy,
    Milestone, PhaseStatus, PlanStatus, ResourceKind, ResourceRequirement, Timeline,
};

/// Mean dependencies-per-goal above which the plan is sequential
const SEQUENTIAL_DEPENDENCY_RATIO: f64 = 0.5;

/// Mean dependencies-per-goal above which the plan is hybrid
const HYBRID_DEPENDENCY_RATIO: f64 = 0.2;

/// Goals served per agent when sizing the agent requirement
const GOALS_PER_AGENT: f64 = 3.0;

/// Planning errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("goal tree has no root")]
    EmptyTree,
}

/// Execution planner
///
/// Stateless: every call derives the plan from the tree it is given.
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Create a new planner
    pub fn new() -> Self {
        Self
    }

    /// Produce a complete draft plan for a tree
    pub fn plan(&self, tree: &GoalTree) -> Result<ExecutionPlan, PlanError> {
        let root_id = tree.root_id().ok_or(PlanError::EmptyTree)?.clone();
        let phases = self.phases(tree)?;
        let resources = self.resources(tree);
        let timeline = self.timeline(tree, &phases);
        let contingencies = self.contingencies();
        let strategy = self.strategy(tree);

        Ok(ExecutionPlan {
            id: uuid::Uuid::new_v4().to_string(),
            goal_id: root_id,
            strategy,
            phases,
            resources,
            timeline,
            contingencies,
            status: PlanStatus::Draft,
            created_at: Utc::now(),
        })
    }

    /// Breadth-first leveling of the tree into phases
    ///
    /// Level 0 is the root; each phase's duration is the sum of its goals'
    /// estimated effort.
    pub fn phases(&self, tree: &GoalTree) -> Result<Vec<ExecutionPhase>, PlanError> {
        let root_id = tree.root_id().ok_or(PlanError::EmptyTree)?.clone();

        let mut phases = Vec::new();
        let mut level = 0usize;
        let mut frontier = vec![root_id];
        while !frontier.is_empty() {
            let estimated_duration = frontier
                .iter()
                .filter_map(|id| tree.goal(id))
                .map(|g| g.estimated_effort)
                .sum();
            phases.push(ExecutionPhase {
                id: uuid::Uuid::new_v4().to_string(),
                name: format!("Phase {}", level + 1),
                level,
                goal_ids: frontier.clone(),
                status: PhaseStatus::Pending,
                estimated_duration,
            });

            frontier = frontier
                .iter()
                .flat_map(|id| tree.children(id))
                .map(|g| g.id.clone())
                .collect();
            level += 1;
        }
        Ok(phases)
    }

    /// Aggregate resource requirements for the whole tree
    pub fn resources(&self, tree: &GoalTree) -> Vec<ResourceRequirement> {
        let total_complexity: f64 = tree.iter().map(|g| g.complexity).sum();
        let total_effort: f64 = tree.iter().map(|g| g.estimated_effort).sum();
        let agents = (tree.len() as f64 / GOALS_PER_AGENT).ceil();

        vec![
            ResourceRequirement {
                kind: ResourceKind::Computational,
                amount: total_complexity,
                unit: "compute-units".to_string(),
            },
            ResourceRequirement {
                kind: ResourceKind::Agents,
                amount: agents,
                unit: "agents".to_string(),
            },
            ResourceRequirement {
                kind: ResourceKind::Time,
                amount: total_effort,
                unit: "hours".to_string(),
            },
        ]
    }

    /// Build the plan timeline from the phases
    ///
    /// One milestone per phase, deadlines spaced proportionally to phase
    /// duration; the critical path is delegated to the tree heuristic.
    pub fn timeline(&self, tree: &GoalTree, phases: &[ExecutionPhase]) -> Timeline {
        self.timeline_at(tree, phases, Utc::now())
    }

    /// Timeline against an explicit start time (testing seam)
    pub fn timeline_at(
        &self,
        tree: &GoalTree,
        phases: &[ExecutionPhase],
        start: DateTime<Utc>,
    ) -> Timeline {
        let mut milestones = Vec::with_capacity(phases.len());
        let mut cursor = start;
        for phase in phases {
            cursor += hours(phase.estimated_duration);
            milestones.push(Milestone {
                name: format!("{} complete", phase.name),
                phase_id: phase.id.clone(),
                deadline: cursor,
            });
        }

        Timeline {
            start,
            end: cursor,
            milestones,
            critical_path: tree.critical_path(),
        }
    }

    /// The fixed contingency templates, highest priority first
    pub fn contingencies(&self) -> Vec<ContingencyPlan> {
        vec![
            ContingencyPlan {
                trigger: ContingencyTrigger::CriticalRisk,
                priority: 1,
                actions: vec![
                    "Pause phases that depend on the affected goal".to_string(),
                    "Escalate to the operator".to_string(),
                    "Replan with reduced scope".to_string(),
                ],
            },
            ContingencyPlan {
                trigger: ContingencyTrigger::BlockerPresent,
                priority: 2,
                actions: vec![
                    "Identify the blocking dependency".to_string(),
                    "Reassign or descope the blocked goal".to_string(),
                    "Resume once the dependency completes".to_string(),
                ],
            },
            ContingencyPlan {
                trigger: ContingencyTrigger::LowVelocity,
                priority: 3,
                actions: vec![
                    "Review effort estimates against actuals".to_string(),
                    "Add workers to the slowest phase".to_string(),
                    "Trigger replanning".to_string(),
                ],
            },
        ]
    }

    /// Advisory strategy from the dependency density of the tree
    pub fn strategy(&self, tree: &GoalTree) -> ExecutionStrategy {
        if tree.is_empty() {
            return ExecutionStrategy::Parallel;
        }
        let total_deps: usize = tree.iter().map(|g| g.dependencies.len()).sum();
        let ratio = total_deps as f64 / tree.len() as f64;

        if ratio > SEQUENTIAL_DEPENDENCY_RATIO {
            ExecutionStrategy::Sequential
        } else if ratio > HYBRID_DEPENDENCY_RATIO {
            ExecutionStrategy::Hybrid
        } else {
            ExecutionStrategy::Parallel
        }
    }
}

impl Default for ExecutionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GoalNode;

    fn goal(id: &str, effort: f64) -> GoalNode {
        let mut node = GoalNode::new(format!("goal {id}")).with_estimated_effort(effort);
        node.id = id.to_string();
        node
    }

    /// root(1h) ── a(2h) ── a1(4h); root ── b(3h)
    fn sample_tree() -> GoalTree {
        let mut tree = GoalTree::new();
        tree.add_goal(goal("root", 1.0), None).unwrap();
        tree.add_goal(goal("a", 2.0), Some("root")).unwrap();
        tree.add_goal(goal("b", 3.0), Some("root")).unwrap();
        tree.add_goal(goal("a1", 4.0), Some("a")).unwrap();
        tree
    }

    #[test]
    fn test_phases_follow_tree_levels() {
        let planner = ExecutionPlanner::new();
        let phases = planner.phases(&sample_tree()).unwrap();

        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].goal_ids, vec!["root"]);
        assert_eq!(phases[0].estimated_duration, 1.0);
        assert_eq!(phases[1].goal_ids, vec!["a", "b"]);
        assert_eq!(phases[1].estimated_duration, 5.0);
        assert_eq!(phases[2].goal_ids, vec!["a1"]);
        assert_eq!(phases[2].estimated_duration, 4.0);
    }

    #[test]
    fn test_empty_tree_cannot_be_planned() {
        let planner = ExecutionPlanner::new();
        assert!(matches!(
            planner.plan(&GoalTree::new()),
            Err(PlanError::EmptyTree)
        ));
    }

    #[test]
    fn test_resources_are_aggregate() {
        let planner = ExecutionPlanner::new();
        let tree = sample_tree();
        let resources = planner.resources(&tree);

        let agents = resources
            .iter()
            .find(|r| r.kind == ResourceKind::Agents)
            .unwrap();
        // 4 goals / 3 per agent, rounded up
        assert_eq!(agents.amount, 2.0);

        let time = resources
            .iter()
            .find(|r| r.kind == ResourceKind::Time)
            .unwrap();
        assert_eq!(time.amount, 10.0);
    }

    #[test]
    fn test_timeline_spaces_milestones_by_phase_duration() {
        let planner = ExecutionPlanner::new();
        let tree = sample_tree();
        let phases = planner.phases(&tree).unwrap();
        let start = Utc::now();
        let timeline = planner.timeline_at(&tree, &phases, start);

        assert_eq!(timeline.milestones.len(), 3);
        assert_eq!(timeline.milestones[0].deadline, start + hours(1.0));
        assert_eq!(timeline.milestones[1].deadline, start + hours(6.0));
        assert_eq!(timeline.milestones[2].deadline, start + hours(10.0));
        assert_eq!(timeline.end, start + hours(10.0));
    }

    #[test]
    fn test_strategy_follows_dependency_density() {
        let planner = ExecutionPlanner::new();

        let mut sparse = sample_tree();
        assert_eq!(planner.strategy(&sparse), ExecutionStrategy::Parallel);

        sparse.add_dependency("b", "a").unwrap();
        // 1 dependency / 4 goals = 0.25 → hybrid
        assert_eq!(planner.strategy(&sparse), ExecutionStrategy::Hybrid);

        sparse.add_dependency("a1", "b").unwrap();
        sparse.add_dependency("a", "a1").unwrap_err();
        sparse.add_dependency("root", "a1").unwrap();
        // 3 dependencies / 4 goals = 0.75 → sequential
        assert_eq!(planner.strategy(&sparse), ExecutionStrategy::Sequential);
    }

    #[test]
    fn test_plan_assembles_all_sections() {
        let planner = ExecutionPlanner::new();
        let plan = planner.plan(&sample_tree()).unwrap();

        assert_eq!(plan.goal_id, "root");
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.phases.len(), 3);
        assert_eq!(plan.resources.len(), 3);
        assert_eq!(plan.contingencies.len(), 3);
        assert_eq!(plan.total_duration(), 10.0);
        assert!(!plan.timeline.critical_path.is_empty());
    }
}
