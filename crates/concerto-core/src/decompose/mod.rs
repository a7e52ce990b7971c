//! Goal decomposition
//!
//! Turns a goal description into a populated goal tree using a selected
//! decomposition strategy. Recursion is explicitly depth-bounded: any subgoal
//! whose assessed complexity exceeds the hierarchical threshold is expanded
//! one further level, up to `max_depth`.

use thiserror::Error;
use tracing::debug;

use crate::tree::{GoalTree, TreeError};
use crate::types::{GoalClass, GoalId, GoalNode};

/// Complexity above which a goal is decomposed hierarchically (and a subgoal
/// is recursively expanded)
pub const COMPLEXITY_THRESHOLD: f64 = 0.7;

/// Priority decrement applied per subgoal index
const PRIORITY_STEP: f64 = 0.1;

/// Effort is estimated as complexity × this many hours
const EFFORT_PER_COMPLEXITY: f64 = 10.0;

/// Keywords that mark a description as structurally complex
const COMPLEX_KEYWORDS: [&str; 5] = [
    "integrate",
    "optimize",
    "coordinate",
    "synchronize",
    "orchestrate",
];

/// Decomposition errors
#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("goal description is empty")]
    EmptyDescription,

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Constraints supplied with a goal at intake time
#[derive(Debug, Clone)]
pub struct Constraints {
    /// Classification of the goal
    pub class: GoalClass,
    /// Explicit complexity override; assessed from the description when absent
    pub complexity: Option<f64>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            class: GoalClass::Hybrid,
            complexity: None,
        }
    }
}

/// How a goal is broken into subgoals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompositionStrategy {
    /// Phase-oriented breakdown for complex goals
    Hierarchical,
    /// Ordered steps, each depending on the previous
    Sequential,
    /// Independent tracks with no dependencies
    Parallel,
}

impl DecompositionStrategy {
    /// Select a strategy from complexity and classification
    pub fn select(complexity: f64, class: GoalClass) -> Self {
        if complexity > COMPLEXITY_THRESHOLD {
            DecompositionStrategy::Hierarchical
        } else if class == GoalClass::Concrete {
            DecompositionStrategy::Sequential
        } else {
            DecompositionStrategy::Parallel
        }
    }

    /// Ordered subgoal descriptions for a goal
    fn subgoal_descriptions(&self, description: &str) -> Vec<String> {
        match self {
            DecompositionStrategy::Hierarchical => vec![
                format!("Analyze requirements and scope for: {description}"),
                format!("Design the structure and interfaces for: {description}"),
                format!("Implement the components of: {description}"),
                format!("Validate and integrate the results of: {description}"),
            ],
            DecompositionStrategy::Sequential => vec![
                format!("Prepare the groundwork for: {description}"),
                format!("Carry out the main work of: {description}"),
                format!("Review and finalize: {description}"),
            ],
            DecompositionStrategy::Parallel => vec![
                format!("Work on the core track of: {description}"),
                format!("Work on the supporting track of: {description}"),
                format!("Work on the verification track of: {description}"),
            ],
        }
    }
}

/// Assess the complexity of a goal description, in [0, 1]
///
/// Pure and deterministic: scales with description length and the presence of
/// complexity keywords.
pub fn assess_complexity(description: &str) -> f64 {
    let length_score = (description.len() as f64 / 200.0).min(0.5);
    let lowered = description.to_lowercase();
    let keyword_score = COMPLEX_KEYWORDS
        .iter()
        .filter(|k| lowered.contains(*k))
        .count() as f64
        * 0.15;
    (length_score + keyword_score).clamp(0.0, 1.0)
}

/// Goal decomposer
pub struct Decomposer {
    max_depth: usize,
}

impl Decomposer {
    /// Create a decomposer with the default recursion bound
    pub fn new() -> Self {
        Self { max_depth: 2 }
    }

    /// Set the maximum recursion depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decompose a goal description into a populated tree
    ///
    /// The root carries the given priority; subgoal priorities step down from
    /// their parent's by index.
    pub fn decompose(
        &self,
        description: &str,
        constraints: &Constraints,
        priority: f64,
    ) -> Result<GoalTree, DecomposeError> {
        if description.trim().is_empty() {
            return Err(DecomposeError::EmptyDescription);
        }

        let complexity = constraints
            .complexity
            .unwrap_or_else(|| assess_complexity(description))
            .clamp(0.0, 1.0);

        let root = GoalNode::new(description)
            .with_class(constraints.class)
            .with_priority(priority)
            .with_complexity(complexity)
            .with_estimated_effort(complexity * EFFORT_PER_COMPLEXITY);

        let mut tree = GoalTree::new();
        let root_id = tree.add_goal(root, None)?;
        self.expand(&mut tree, &root_id, 0)?;

        debug!(goals = tree.len(), "decomposed goal");
        Ok(tree)
    }

    /// Produce the immediate subgoals of a goal, without inserting them
    ///
    /// Exposed for callers that manage their own tree.
    pub fn subgoals(&self, parent: &GoalNode) -> Vec<GoalNode> {
        let strategy = DecompositionStrategy::select(parent.complexity, parent.class);
        strategy
            .subgoal_descriptions(&parent.description)
            .into_iter()
            .enumerate()
            .map(|(index, description)| {
                let complexity = assess_complexity(&description);
                GoalNode::new(description)
                    .with_class(parent.class)
                    .with_priority(parent.priority - PRIORITY_STEP * index as f64)
                    .with_complexity(complexity)
                    .with_estimated_effort(complexity * EFFORT_PER_COMPLEXITY)
            })
            .collect()
    }

    fn expand(
        &self,
        tree: &mut GoalTree,
        parent_id: &GoalId,
        depth: usize,
    ) -> Result<(), DecomposeError> {
        if depth >= self.max_depth {
            return Ok(());
        }

        let parent = tree
            .goal(parent_id)
            .cloned()
            .ok_or_else(|| TreeError::GoalNotFound(parent_id.clone()))?;
        let strategy = DecompositionStrategy::select(parent.complexity, parent.class);

        let mut previous: Option<GoalId> = None;
        for node in self.subgoals(&parent) {
            let complexity = node.complexity;
            let id = tree.add_goal(node, Some(parent_id))?;

            if strategy == DecompositionStrategy::Sequential {
                if let Some(prev) = &previous {
                    tree.add_dependency(&id, prev)?;
                }
                previous = Some(id.clone());
            }

            if complexity > COMPLEXITY_THRESHOLD {
                self.expand(tree, &id, depth + 1)?;
            }
        }
        Ok(())
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            DecompositionStrategy::select(0.9, GoalClass::Concrete),
            DecompositionStrategy::Hierarchical
        );
        assert_eq!(
            DecompositionStrategy::select(0.3, GoalClass::Concrete),
            DecompositionStrategy::Sequential
        );
        assert_eq!(
            DecompositionStrategy::select(0.3, GoalClass::Abstract),
            DecompositionStrategy::Parallel
        );
    }

    #[test]
    fn test_complexity_keywords_raise_the_score() {
        let plain = assess_complexity("write a readme");
        let keyed = assess_complexity("integrate and optimize the build");
        assert!(keyed > plain);
        assert!((0.0..=1.0).contains(&keyed));
    }

    #[test]
    fn test_hierarchical_decomposition_of_ml_pipeline() {
        let decomposer = Decomposer::new();
        let constraints = Constraints {
            class: GoalClass::Concrete,
            complexity: Some(0.8),
        };
        let tree = decomposer
            .decompose("Build a machine learning pipeline", &constraints, 5.0)
            .unwrap();

        let root_id = tree.root_id().unwrap().clone();
        let root = tree.goal(&root_id).unwrap();
        assert_eq!(root.complexity, 0.8);
        assert_eq!(root.estimated_effort, 8.0);

        // complexity > 0.7 forces the hierarchical template: 4 subgoals
        let children = tree.children(&root_id);
        assert_eq!(children.len(), 4);
        for child in &children {
            assert!((child.estimated_effort - child.complexity * 10.0).abs() < 1e-9);
            // hierarchical subgoals carry no dependency edges
            assert!(child.dependencies.is_empty());
        }
    }

    #[test]
    fn test_sequential_decomposition_chains_dependencies() {
        let decomposer = Decomposer::new();
        let constraints = Constraints {
            class: GoalClass::Concrete,
            complexity: Some(0.4),
        };
        let tree = decomposer
            .decompose("Ship the release notes", &constraints, 2.0)
            .unwrap();

        let root_id = tree.root_id().unwrap().clone();
        let children = tree.children(&root_id);
        assert_eq!(children.len(), 3);
        assert!(children[0].dependencies.is_empty());
        assert_eq!(children[1].dependencies, vec![children[0].id.clone()]);
        assert_eq!(children[2].dependencies, vec![children[1].id.clone()]);
    }

    #[test]
    fn test_subgoal_priority_steps_down() {
        let decomposer = Decomposer::new();
        let parent = GoalNode::new("parent goal")
            .with_class(GoalClass::Abstract)
            .with_priority(3.0)
            .with_complexity(0.4);
        let subgoals = decomposer.subgoals(&parent);
        assert_eq!(subgoals[0].priority, 3.0);
        assert!((subgoals[1].priority - 2.9).abs() < f64::EPSILON);
        assert!((subgoals[2].priority - 2.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recursion_is_depth_bounded() {
        // With a forced high complexity everywhere, depth 1 yields exactly
        // one level of subgoals.
        let decomposer = Decomposer::new().with_max_depth(1);
        let constraints = Constraints {
            class: GoalClass::Abstract,
            complexity: Some(0.95),
        };
        let tree = decomposer
            .decompose(
                "Orchestrate, integrate, synchronize, coordinate and optimize everything \
                 across the whole distributed platform while keeping the subsystems aligned",
                &constraints,
                1.0,
            )
            .unwrap();

        let root_id = tree.root_id().unwrap().clone();
        for id in tree.descendants(&root_id) {
            let node = tree.goal(&id).unwrap();
            assert_eq!(node.parent_id.as_ref(), Some(&root_id));
        }
    }

    #[test]
    fn test_empty_description_is_rejected() {
        let decomposer = Decomposer::new();
        assert!(matches!(
            decomposer.decompose("  ", &Constraints::default(), 1.0),
            Err(DecomposeError::EmptyDescription)
        ));
    }
}
