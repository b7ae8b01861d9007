//! Dependency resolution over a task set.
//!
//! [`DependencyGraph`] keeps both forward edges (dependencies) and reverse
//! edges (dependents) so the coordinator can walk in either direction: forward
//! for ordering, reverse for skipping everything downstream of a failure.
//!
//! [`topological_sort`] is the correctness-critical entry point used by the
//! planner. [`resolve_dependencies`] is informational and never fails.

use crate::error::OrchestratorError;
use crate::task::Task;
use std::collections::{HashMap, HashSet};

/// A directed graph of task dependencies.
///
/// Node and edge insertion order is preserved so every traversal is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node ids in insertion order.
    order: Vec<String>,
    /// Forward edges: task_id -> ids it depends on
    nodes: HashMap<String, Vec<String>>,
    /// Reverse edges: task_id -> ids that depend on it
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from tasks. Dependencies on ids outside `tasks` are dropped.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_node(&task.id);
        }
        for task in tasks {
            for dep in &task.dependencies {
                if graph.contains(dep) {
                    graph.add_dependency(&task.id, dep);
                }
            }
        }
        graph
    }

    /// Adds a node. No-op if it already exists.
    pub fn add_node(&mut self, task_id: &str) {
        if !self.nodes.contains_key(task_id) {
            self.order.push(task_id.to_string());
            self.nodes.insert(task_id.to_string(), Vec::new());
            self.reverse_edges.insert(task_id.to_string(), Vec::new());
        }
    }

    /// Adds an edge: `task_id` depends on `depends_on`. Missing nodes are created.
    pub fn add_dependency(&mut self, task_id: &str, depends_on: &str) {
        self.add_node(task_id);
        self.add_node(depends_on);

        let deps = self.nodes.entry(task_id.to_string()).or_default();
        if !deps.iter().any(|d| d == depends_on) {
            deps.push(depends_on.to_string());
        }

        let dependents = self.reverse_edges.entry(depends_on.to_string()).or_default();
        if !dependents.iter().any(|d| d == task_id) {
            dependents.push(task_id.to_string());
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.nodes.contains_key(task_id)
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Direct dependencies of `task_id`, in declaration order.
    pub fn get_dependencies(&self, task_id: &str) -> &[String] {
        self.nodes.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of `task_id`, in insertion order.
    pub fn get_dependents(&self, task_id: &str) -> &[String] {
        self.reverse_edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every task reachable through reverse edges from `task_id`, excluding itself.
    pub fn transitive_dependents(&self, task_id: &str) -> HashSet<String> {
        let mut to_visit = vec![task_id.to_string()];
        let mut visited = HashSet::new();

        while let Some(current) = to_visit.pop() {
            for dependent in self.get_dependents(&current) {
                if visited.insert(dependent.clone()) {
                    to_visit.push(dependent.clone());
                }
            }
        }

        visited.remove(task_id);
        visited
    }

    /// Returns the first node found on a cycle, if any.
    pub fn find_cycle(&self) -> Option<String> {
        match self.sorted_ids() {
            Err(OrchestratorError::CircularDependency { task_id }) => Some(task_id),
            _ => None,
        }
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Node ids in dependency order, ties broken by insertion order.
    pub fn sorted_ids(&self) -> Result<Vec<String>, OrchestratorError> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.order.len());
        let mut sorted = Vec::with_capacity(self.order.len());

        for id in &self.order {
            self.visit(id, &mut marks, &mut sorted)?;
        }

        Ok(sorted)
    }

    /// Depth-first visit with three-coloring. Reaching an in-progress node is a back edge.
    fn visit<'a>(
        &'a self,
        id: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        sorted: &mut Vec<String>,
    ) -> Result<(), OrchestratorError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(OrchestratorError::CircularDependency {
                    task_id: id.to_string(),
                });
            }
            None => {}
        }

        marks.insert(id, Mark::InProgress);
        for dep in self.get_dependencies(id) {
            self.visit(dep, marks, sorted)?;
        }
        marks.insert(id, Mark::Done);
        sorted.push(id.to_string());

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Reorders `tasks` so every task appears after all of its dependencies.
///
/// Dependencies naming ids outside `tasks` are ignored. Tasks with no
/// ordering constraint between them keep their input order.
///
/// # Errors
///
/// - `CircularDependency` naming a task on the cycle
/// - `InvalidInput` if two tasks share an id
pub fn topological_sort(tasks: &[Task]) -> Result<Vec<Task>, OrchestratorError> {
    let mut by_id: HashMap<&str, &Task> = HashMap::with_capacity(tasks.len());
    for task in tasks {
        if by_id.insert(task.id.as_str(), task).is_some() {
            return Err(OrchestratorError::InvalidInput(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
    }

    let graph = DependencyGraph::from_tasks(tasks);
    let ids = graph.sorted_ids()?;

    Ok(ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|t| (*t).clone()))
        .collect())
}

/// Transitive closure of dependency ids for `task_id`.
///
/// Deepest dependencies come first. Ids missing from `all_tasks` are skipped
/// silently, and shared dependencies are listed once.
pub fn resolve_dependencies(task_id: &str, all_tasks: &[Task]) -> Vec<String> {
    let by_id: HashMap<&str, &Task> = all_tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited = HashSet::new();
    let mut resolved = Vec::new();

    if let Some(task) = by_id.get(task_id) {
        visited.insert(task_id.to_string());
        for dep in &task.dependencies {
            collect(dep, &by_id, &mut visited, &mut resolved);
        }
    }

    resolved
}

fn collect(
    id: &str,
    by_id: &HashMap<&str, &Task>,
    visited: &mut HashSet<String>,
    resolved: &mut Vec<String>,
) {
    if !visited.insert(id.to_string()) {
        return;
    }
    let Some(task) = by_id.get(id) else {
        return;
    };
    for dep in &task.dependencies {
        collect(dep, by_id, visited, resolved);
    }
    resolved.push(id.to_string());
}
