use super::{ExecutionError, ExecutionState, Progress, RunStatus};
use crate::task::AgentOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable form of [`ExecutionState`].
///
/// `completedTasks` is a sorted array and `results` an object keyed by task
/// id, so the same state always produces the same file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    #[serde(default)]
    pub results: BTreeMap<String, AgentOutput>,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
    #[serde(default)]
    pub progress: Progress,
}

impl From<&ExecutionState> for StateSnapshot {
    fn from(state: &ExecutionState) -> Self {
        let mut completed_tasks: Vec<String> = state.completed_tasks.iter().cloned().collect();
        completed_tasks.sort();

        Self {
            workflow_id: state.workflow_id.clone(),
            status: state.status,
            started_at: state.started_at,
            completed_at: state.completed_at,
            current_task: state.current_task.clone(),
            completed_tasks,
            results: state
                .results
                .iter()
                .map(|(id, output)| (id.clone(), output.clone()))
                .collect(),
            errors: state.errors.clone(),
            progress: state.progress,
        }
    }
}

impl From<StateSnapshot> for ExecutionState {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            workflow_id: snapshot.workflow_id,
            status: snapshot.status,
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
            current_task: snapshot.current_task,
            completed_tasks: snapshot.completed_tasks.into_iter().collect(),
            results: snapshot.results.into_iter().collect(),
            errors: snapshot.errors,
            progress: snapshot.progress,
        }
    }
}
