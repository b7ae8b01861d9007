use super::{ExecutionError, ExecutionState, Progress, RunStatus, StatePersistence, StateSnapshot};
use crate::error::OrchestratorError;
use crate::task::AgentOutput;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owner of one run's [`ExecutionState`].
///
/// Every mutating operation writes the full state through to the configured
/// [`StatePersistence`] before returning. A failed write is an
/// `OrchestratorError::Internal` and the caller must treat it as fatal.
pub struct StateStore {
    state: ExecutionState,
    persistence: Arc<dyn StatePersistence>,
}

impl StateStore {
    /// A pending, not yet persisted, state for `workflow_id`.
    pub fn new(workflow_id: impl Into<String>, persistence: Arc<dyn StatePersistence>) -> Self {
        Self {
            state: ExecutionState::new(workflow_id),
            persistence,
        }
    }

    /// Reconstructs a store from the last persisted snapshot.
    ///
    /// Returns `Ok(None)` if the run was never persisted.
    pub fn load_state(
        workflow_id: &str,
        persistence: Arc<dyn StatePersistence>,
    ) -> Result<Option<Self>, OrchestratorError> {
        let Some(snapshot) = persistence.load(workflow_id)? else {
            return Ok(None);
        };
        debug!(
            workflow_id,
            completed = snapshot.completed_tasks.len(),
            status = %snapshot.status,
            "Loaded persisted state"
        );
        Ok(Some(Self {
            state: ExecutionState::from(snapshot),
            persistence,
        }))
    }

    pub fn workflow_id(&self) -> &str {
        &self.state.workflow_id
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from(&self.state)
    }

    /// `pending -> running` with `progress.total = total`.
    pub fn start(&mut self, total: usize) -> Result<(), OrchestratorError> {
        self.state.status = RunStatus::Running;
        self.state.started_at = Utc::now();
        self.state.completed_at = None;
        self.state.progress = Progress::new(self.state.completed_tasks.len(), total);
        self.persist()
    }

    /// Puts a loaded run back into `running`, keeping results and errors.
    pub fn resume(&mut self, total: usize) -> Result<(), OrchestratorError> {
        self.state.status = RunStatus::Running;
        self.state.completed_at = None;
        self.state.current_task = None;
        self.state.progress = Progress::new(self.state.completed_tasks.len(), total);
        self.persist()
    }

    pub fn set_current_task(&mut self, task_id: &str) -> Result<(), OrchestratorError> {
        self.state.current_task = Some(task_id.to_string());
        self.persist()
    }

    /// Stores `output`, marks `task_id` completed and recomputes progress.
    pub fn save_result(
        &mut self,
        task_id: &str,
        output: AgentOutput,
    ) -> Result<(), OrchestratorError> {
        if self.state.results.contains_key(task_id) {
            warn!(task_id, "Replacing stored result");
        }
        self.state.results.insert(task_id.to_string(), output);
        self.state.completed_tasks.insert(task_id.to_string());
        self.state.current_task = None;
        self.state.refresh_progress();
        self.persist()
    }

    pub fn get_result(&self, task_id: &str) -> Option<&AgentOutput> {
        self.state.results.get(task_id)
    }

    /// `data` of each stored output among `ids`. Ids without a result are
    /// absent from the map; metadata is never exposed.
    pub fn get_context<S: AsRef<str>>(&self, ids: &[S]) -> BTreeMap<String, JsonValue> {
        ids.iter()
            .filter_map(|id| {
                let id = id.as_ref();
                self.state
                    .results
                    .get(id)
                    .map(|output| (id.to_string(), output.data.clone()))
            })
            .collect()
    }

    pub fn record_error(&mut self, error: ExecutionError) -> Result<(), OrchestratorError> {
        self.state.errors.push(error);
        self.state.current_task = None;
        self.persist()
    }

    pub fn complete(&mut self) -> Result<(), OrchestratorError> {
        self.finish(RunStatus::Completed)
    }

    pub fn fail(&mut self) -> Result<(), OrchestratorError> {
        self.finish(RunStatus::Failed)
    }

    pub fn progress(&self) -> Progress {
        self.state.progress
    }

    pub fn all_results(&self) -> &HashMap<String, AgentOutput> {
        &self.state.results
    }

    pub fn errors(&self) -> &[ExecutionError] {
        &self.state.errors
    }

    fn finish(&mut self, status: RunStatus) -> Result<(), OrchestratorError> {
        self.state.status = status;
        self.state.completed_at = Some(Utc::now());
        self.state.current_task = None;
        self.persist()
    }

    fn persist(&self) -> Result<(), OrchestratorError> {
        self.persistence.save(&self.snapshot())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
