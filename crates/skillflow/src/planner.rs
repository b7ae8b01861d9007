//! Workflow planning: select tasks from the catalog, then order them.

use crate::catalog::TaskCatalog;
use crate::error::OrchestratorError;
use crate::resolver::topological_sort;
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Placeholder cost per task used for `estimated_duration`.
pub const DEFAULT_PER_TASK_ESTIMATE: Duration = Duration::from_secs(60);

/// How the tasks of a workflow are selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum PlanRequest {
    /// The whole catalog.
    Full,
    /// An explicit id list. Unknown ids are dropped without error.
    Subset(Vec<String>),
    /// A named, curated id list.
    Preset(String),
    /// Exactly one task; its dependencies are not pulled in.
    Single(String),
}

impl PlanRequest {
    fn label(&self) -> String {
        match self {
            PlanRequest::Full => "full".to_string(),
            PlanRequest::Subset(_) => "subset".to_string(),
            PlanRequest::Preset(name) => name.clone(),
            PlanRequest::Single(id) => format!("single-{}", id),
        }
    }
}

/// A concrete, dependency-ordered sequence of tasks for one run.
///
/// Created once per planning call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tasks: Vec<Task>,
    /// Estimated duration in seconds. A placeholder, not a scheduling guarantee.
    pub estimated_duration: u64,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builds ordered workflows from a [`TaskCatalog`].
#[derive(Debug, Clone)]
pub struct WorkflowPlanner {
    catalog: TaskCatalog,
    per_task_estimate: Duration,
}

impl WorkflowPlanner {
    pub fn new(catalog: TaskCatalog) -> Self {
        Self {
            catalog,
            per_task_estimate: DEFAULT_PER_TASK_ESTIMATE,
        }
    }

    pub fn with_per_task_estimate(mut self, estimate: Duration) -> Self {
        self.per_task_estimate = estimate;
        self
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Plans a workflow.
    ///
    /// # Errors
    ///
    /// - `PresetNotFound` for an unknown preset name
    /// - `TaskNotFound` for an unknown `Single` id
    /// - `CircularDependency` if the selected tasks contain a cycle
    pub fn plan(&self, request: &PlanRequest) -> Result<Workflow, OrchestratorError> {
        let selected = match request {
            PlanRequest::Full => self.catalog.tasks().to_vec(),
            PlanRequest::Subset(ids) => self.catalog.select(ids),
            PlanRequest::Preset(name) => self.catalog.select(self.catalog.preset(name)?),
            PlanRequest::Single(id) => {
                let task = self.catalog.get(id).ok_or_else(|| {
                    OrchestratorError::task_not_found(
                        id.clone(),
                        self.catalog.tasks().iter().map(|t| t.id.clone()).collect(),
                    )
                })?;
                vec![task.clone()]
            }
        };

        debug!(mode = %request.label(), selected = selected.len(), "Tasks selected for workflow");

        let tasks = topological_sort(&selected)?;
        let workflow = self.build(request, tasks);

        info!(
            workflow_id = %workflow.id,
            tasks = ?workflow.task_ids(),
            estimated_secs = workflow.estimated_duration,
            "Workflow planned"
        );

        Ok(workflow)
    }

    fn build(&self, request: &PlanRequest, tasks: Vec<Task>) -> Workflow {
        let label = request.label();
        let short_id = Uuid::new_v4().simple().to_string();
        let estimated = self.per_task_estimate.as_secs() * tasks.len() as u64;

        Workflow {
            id: format!("workflow-{}-{}", label, &short_id[..8]),
            name: format!("{} workflow", label),
            description: format!("{} task(s) selected in '{}' mode", tasks.len(), label),
            tasks,
            estimated_duration: estimated,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TaskCatalog {
        TaskCatalog::new(vec![
            Task::new("01", "Intake"),
            Task::new("02", "Analysis").with_dependencies(["01"]),
            Task::new("05", "Market").with_dependencies(["01"]),
            Task::new("06", "Financials").with_dependencies(["05"]),
            Task::new("refactor", "Refactor"),
        ])
        .with_preset("fundraising-only", ["06", "05"])
        .with_preset("broken", ["ghost"])
    }

    #[test]
    fn test_plan_full() {
        let workflow = WorkflowPlanner::new(catalog()).plan(&PlanRequest::Full).unwrap();
        assert_eq!(workflow.task_ids(), ["01", "02", "05", "06", "refactor"]);
        assert_eq!(workflow.estimated_duration, 5 * 60);
    }

    #[test]
    fn test_plan_preset_orders_dependencies_first() {
        let workflow = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Preset("fundraising-only".into()))
            .unwrap();
        assert_eq!(workflow.task_ids(), ["05", "06"]);
    }

    #[test]
    fn test_plan_unknown_preset() {
        let err = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Preset("marketing".into()))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PresetNotFound { .. }));
    }

    #[test]
    fn test_plan_subset_drops_unknown_ids() {
        let workflow = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Subset(vec!["02".into(), "ghost".into(), "01".into()]))
            .unwrap();
        assert_eq!(workflow.task_ids(), ["01", "02"]);
    }

    #[test]
    fn test_plan_preset_with_only_unknown_ids_is_empty() {
        let workflow = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Preset("broken".into()))
            .unwrap();
        assert!(workflow.is_empty());
        assert_eq!(workflow.estimated_duration, 0);
    }

    #[test]
    fn test_plan_single() {
        let workflow = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Single("06".into()))
            .unwrap();
        assert_eq!(workflow.task_ids(), ["06"]);
    }

    #[test]
    fn test_plan_single_unknown() {
        let err = WorkflowPlanner::new(catalog())
            .plan(&PlanRequest::Single("99".into()))
            .unwrap_err();
        assert!(err.to_string().contains("99"));
        assert!(err.to_string().contains("refactor"));
    }

    #[test]
    fn test_plan_cycle_is_fatal() {
        let catalog = TaskCatalog::new(vec![
            Task::new("X", "X").with_dependencies(["Y"]),
            Task::new("Y", "Y").with_dependencies(["X"]),
        ]);
        let err = WorkflowPlanner::new(catalog).plan(&PlanRequest::Full).unwrap_err();
        assert!(matches!(err, OrchestratorError::CircularDependency { .. }));
    }

    #[test]
    fn test_custom_estimate() {
        let workflow = WorkflowPlanner::new(catalog())
            .with_per_task_estimate(Duration::from_secs(10))
            .plan(&PlanRequest::Subset(vec!["01".into(), "02".into()]))
            .unwrap();
        assert_eq!(workflow.estimated_duration, 20);
    }

    #[test]
    fn test_workflow_ids_are_unique() {
        let planner = WorkflowPlanner::new(catalog());
        let a = planner.plan(&PlanRequest::Full).unwrap();
        let b = planner.plan(&PlanRequest::Full).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("workflow-full-"));
    }
}
