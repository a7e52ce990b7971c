//! Goal tree
//!
//! Owns the hierarchical + dependency structure of goals. Parent/child edges
//! form a single-rooted tree; dependency edges form a directed acyclic graph
//! overlaid on it. The tree is a pure data structure: all progress values are
//! derived on demand, never cached.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::types::{GoalId, GoalNode, GoalStatus};

/// Number of goals returned by the critical-path heuristic
const CRITICAL_PATH_LEN: usize = 5;

/// Goal tree errors
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("goal not found: {0}")]
    GoalNotFound(GoalId),

    #[error("goal already exists: {0}")]
    DuplicateGoal(GoalId),

    #[error("tree already has a root: {0}")]
    RootExists(GoalId),

    #[error("dependency cycle involving goal: {0}")]
    DependencyCycle(GoalId),
}

/// The goal hierarchy for one orchestration run
#[derive(Debug, Clone, Default)]
pub struct GoalTree {
    nodes: HashMap<GoalId, GoalNode>,
    root_id: Option<GoalId>,
}

impl GoalTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Root goal id, if any goal has been added
    pub fn root_id(&self) -> Option<&GoalId> {
        self.root_id.as_ref()
    }

    /// Number of goals in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check whether a goal exists
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate over all goals
    pub fn iter(&self) -> impl Iterator<Item = &GoalNode> {
        self.nodes.values()
    }

    /// Add a goal under an optional parent
    ///
    /// The first goal added without a parent becomes the root; adding a
    /// second root is an error.
    pub fn add_goal(
        &mut self,
        mut node: GoalNode,
        parent_id: Option<&str>,
    ) -> Result<GoalId, TreeError> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateGoal(node.id));
        }

        match parent_id {
            Some(parent_id) => {
                let parent = self
                    .nodes
                    .get_mut(parent_id)
                    .ok_or_else(|| TreeError::GoalNotFound(parent_id.to_string()))?;
                parent.children_ids.push(node.id.clone());
                node.parent_id = Some(parent_id.to_string());
            }
            None => {
                if let Some(root) = &self.root_id {
                    return Err(TreeError::RootExists(root.clone()));
                }
                node.parent_id = None;
                self.root_id = Some(node.id.clone());
            }
        }

        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a goal and its entire subtree
    ///
    /// Removed ids are scrubbed from every remaining node's dependency list.
    /// Returns the removed ids.
    pub fn remove_goal(&mut self, id: &str) -> Result<Vec<GoalId>, TreeError> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::GoalNotFound(id.to_string()));
        }

        let mut removed = self.descendants(id);
        removed.insert(0, id.to_string());

        if let Some(parent_id) = self.nodes.get(id).and_then(|n| n.parent_id.clone()) {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children_ids.retain(|c| c != id);
            }
        }

        for gone in &removed {
            self.nodes.remove(gone);
        }
        if self.root_id.as_deref() == Some(id) {
            self.root_id = None;
        }

        let gone: HashSet<&GoalId> = removed.iter().collect();
        for node in self.nodes.values_mut() {
            node.dependencies.retain(|d| !gone.contains(d));
        }

        Ok(removed)
    }

    /// Apply a partial update to a goal
    pub fn update_goal(
        &mut self,
        id: &str,
        update: impl FnOnce(&mut GoalNode),
    ) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::GoalNotFound(id.to_string()))?;
        update(node);
        Ok(())
    }

    /// Get a goal by id
    pub fn goal(&self, id: &str) -> Option<&GoalNode> {
        self.nodes.get(id)
    }

    /// Children of a goal, in insertion order
    pub fn children(&self, id: &str) -> Vec<&GoalNode> {
        self.nodes
            .get(id)
            .map(|n| {
                n.children_ids
                    .iter()
                    .filter_map(|c| self.nodes.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parent of a goal, if any
    pub fn parent(&self, id: &str) -> Option<&GoalNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent_id.as_ref())
            .and_then(|p| self.nodes.get(p))
    }

    /// All descendant ids of a goal, breadth-first
    pub fn descendants(&self, id: &str) -> Vec<GoalId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<GoalId> = self
            .nodes
            .get(id)
            .map(|n| n.children_ids.iter().cloned().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&next) {
                queue.extend(node.children_ids.iter().cloned());
            }
            out.push(next);
        }
        out
    }

    /// Path from the root to a goal, inclusive
    pub fn path(&self, id: &str) -> Vec<GoalId> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(id);
        while let Some(node) = current {
            path.push(node.id.clone());
            current = node.parent_id.as_ref().and_then(|p| self.nodes.get(p));
        }
        path.reverse();
        path
    }

    /// Add a dependency edge `from` → `to` (`from` depends on `to`)
    ///
    /// Rejects edges that would create a cycle in the dependency overlay.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), TreeError> {
        if !self.nodes.contains_key(to) {
            return Err(TreeError::GoalNotFound(to.to_string()));
        }
        if from == to || self.depends_transitively(to, from) {
            return Err(TreeError::DependencyCycle(from.to_string()));
        }

        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| TreeError::GoalNotFound(from.to_string()))?;
        if !node.dependencies.iter().any(|d| d == to) {
            node.dependencies.push(to.to_string());
        }
        Ok(())
    }

    /// Check whether `start` reaches `target` through dependency edges
    fn depends_transitively(&self, start: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        while let Some(next) = queue.pop_front() {
            if next == target {
                return true;
            }
            if !seen.insert(next.to_string()) {
                continue;
            }
            if let Some(node) = self.nodes.get(next) {
                queue.extend(node.dependencies.iter().map(String::as_str));
            }
        }
        false
    }

    /// Derived progress of a goal, in [0, 1]
    ///
    /// Completed → 1, failed → 0, in-progress leaf → 0.5, other leaf → 0;
    /// internal nodes are the arithmetic mean of their children. Unknown ids
    /// report 0.
    pub fn progress(&self, id: &str) -> f64 {
        let Some(node) = self.nodes.get(id) else {
            return 0.0;
        };
        match node.status {
            GoalStatus::Completed => 1.0,
            GoalStatus::Failed => 0.0,
            GoalStatus::InProgress if node.is_leaf() => 0.5,
            _ if node.is_leaf() => 0.0,
            _ => {
                let sum: f64 = node
                    .children_ids
                    .iter()
                    .map(|c| self.progress(c))
                    .sum();
                sum / node.children_ids.len() as f64
            }
        }
    }

    /// Whether a goal is blocked
    ///
    /// True if its status is explicitly `Blocked`, or any dependency resolves
    /// to a goal that is not completed.
    pub fn is_blocked(&self, id: &str) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.status == GoalStatus::Blocked {
            return true;
        }
        node.dependencies.iter().any(|d| {
            self.nodes
                .get(d)
                .is_some_and(|dep| dep.status != GoalStatus::Completed)
        })
    }

    /// Whether a goal is ready to start
    ///
    /// Requires `Pending` status and every dependency completed.
    pub fn can_start(&self, id: &str) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        node.status == GoalStatus::Pending
            && node.dependencies.iter().all(|d| {
                self.nodes
                    .get(d)
                    .is_some_and(|dep| dep.status == GoalStatus::Completed)
            })
    }

    /// Heuristic critical path: the top incomplete goals by (priority,
    /// estimated effort), both descending
    ///
    /// Deliberately not a longest-path computation; the simple attention
    /// heuristic is part of the engine's contract.
    pub fn critical_path(&self) -> Vec<GoalId> {
        let mut incomplete: Vec<&GoalNode> = self
            .nodes
            .values()
            .filter(|n| n.status != GoalStatus::Completed)
            .collect();
        incomplete.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(b.estimated_effort.total_cmp(&a.estimated_effort))
        });
        incomplete
            .into_iter()
            .take(CRITICAL_PATH_LEN)
            .map(|n| n.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(id: &str) -> GoalNode {
        let mut node = GoalNode::new(format!("goal {id}"));
        node.id = id.to_string();
        node
    }

    /// root ── a ── a1, a2; root ── b
    fn sample_tree() -> GoalTree {
        let mut tree = GoalTree::new();
        tree.add_goal(goal("root"), None).unwrap();
        tree.add_goal(goal("a"), Some("root")).unwrap();
        tree.add_goal(goal("b"), Some("root")).unwrap();
        tree.add_goal(goal("a1"), Some("a")).unwrap();
        tree.add_goal(goal("a2"), Some("a")).unwrap();
        tree
    }

    #[test]
    fn test_add_goal_wires_both_edges() {
        let tree = sample_tree();
        assert_eq!(tree.root_id(), Some(&"root".to_string()));
        assert_eq!(tree.goal("a").unwrap().parent_id.as_deref(), Some("root"));
        assert_eq!(tree.goal("root").unwrap().children_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_second_root_is_rejected() {
        let mut tree = sample_tree();
        assert!(matches!(
            tree.add_goal(goal("other"), None),
            Err(TreeError::RootExists(_))
        ));
    }

    #[test]
    fn test_progress_is_recursive_mean() {
        let mut tree = sample_tree();
        assert_eq!(tree.progress("root"), 0.0);

        tree.update_goal("a1", |g| g.set_status(GoalStatus::Completed))
            .unwrap();
        tree.update_goal("a2", |g| g.set_status(GoalStatus::InProgress))
            .unwrap();
        // a = mean(1.0, 0.5) = 0.75; root = mean(0.75, 0.0) = 0.375
        assert!((tree.progress("a") - 0.75).abs() < f64::EPSILON);
        assert!((tree.progress("root") - 0.375).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completing_a_leaf_never_decreases_ancestor_progress() {
        let mut tree = sample_tree();
        let before_root = tree.progress("root");
        let before_a = tree.progress("a");

        tree.update_goal("a2", |g| g.set_status(GoalStatus::Completed))
            .unwrap();

        assert!(tree.progress("a") >= before_a);
        assert!(tree.progress("root") >= before_root);
        let root = tree.progress("root");
        assert!((0.0..=1.0).contains(&root));
    }

    #[test]
    fn test_remove_goal_scrubs_dependencies() {
        let mut tree = sample_tree();
        tree.add_dependency("b", "a1").unwrap();

        let removed = tree.remove_goal("a").unwrap();
        assert_eq!(removed.len(), 3);
        assert!(!tree.contains("a1"));
        assert!(tree.goal("b").unwrap().dependencies.is_empty());
        assert_eq!(tree.goal("root").unwrap().children_ids, vec!["b"]);
    }

    #[test]
    fn test_dependency_cycle_is_rejected() {
        let mut tree = sample_tree();
        tree.add_dependency("a1", "a2").unwrap();
        tree.add_dependency("a2", "b").unwrap();
        assert!(matches!(
            tree.add_dependency("b", "a1"),
            Err(TreeError::DependencyCycle(_))
        ));
        assert!(matches!(
            tree.add_dependency("a1", "a1"),
            Err(TreeError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_blocked_and_can_start() {
        let mut tree = sample_tree();
        tree.add_dependency("b", "a1").unwrap();

        assert!(tree.is_blocked("b"));
        assert!(!tree.can_start("b"));

        tree.update_goal("a1", |g| g.set_status(GoalStatus::Completed))
            .unwrap();
        assert!(!tree.is_blocked("b"));
        assert!(tree.can_start("b"));

        tree.update_goal("b", |g| g.set_status(GoalStatus::Blocked))
            .unwrap();
        assert!(tree.is_blocked("b"));
    }

    #[test]
    fn test_path_runs_root_to_node() {
        let tree = sample_tree();
        assert_eq!(tree.path("a2"), vec!["root", "a", "a2"]);
        assert_eq!(tree.path("root"), vec!["root"]);
    }

    #[test]
    fn test_critical_path_orders_by_priority_then_effort() {
        let mut tree = GoalTree::new();
        tree.add_goal(goal("root"), None).unwrap();
        for (id, priority, effort) in [
            ("low", 1.0, 2.0),
            ("high", 5.0, 1.0),
            ("mid_heavy", 3.0, 9.0),
            ("mid_light", 3.0, 1.0),
        ] {
            let node = goal(id)
                .with_priority(priority)
                .with_estimated_effort(effort);
            tree.add_goal(node, Some("root")).unwrap();
        }
        tree.update_goal("low", |g| g.set_status(GoalStatus::Completed))
            .unwrap();

        let path = tree.critical_path();
        assert_eq!(path, vec!["high", "mid_heavy", "mid_light", "root"]);
    }
}
