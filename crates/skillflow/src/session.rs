//! Runs that outlive the process.
//!
//! [`orchestrate`] plans a workflow, saves it with its input as a
//! [`RunManifest`] next to the run state, then executes it. [`resume`] reads
//! the manifest back by workflow id and continues the persisted run. The
//! manifest and the state file share one sanitized file stem.

use crate::coordinator::{ExecutionCoordinator, RunReport};
use crate::error::OrchestratorError;
use crate::planner::{PlanRequest, Workflow, WorkflowPlanner};
use crate::state::file_stem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Planned workflow plus its input, saved for `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub workflow: Workflow,
    pub data: Map<String, JsonValue>,
}

impl RunManifest {
    pub fn new(workflow: Workflow, data: Map<String, JsonValue>) -> Self {
        Self { workflow, data }
    }

    /// `<state_dir>/<workflow_id>.workflow.json`, with the id sanitized.
    pub fn path(state_dir: &Path, workflow_id: &str) -> PathBuf {
        state_dir.join(format!("{}.workflow.json", file_stem(workflow_id)))
    }

    /// Writes the manifest atomically and returns its path.
    pub fn save(&self, state_dir: &Path) -> Result<PathBuf, OrchestratorError> {
        let path = Self::path(state_dir, &self.workflow.id);
        let json = serde_json::to_string_pretty(self)?;

        std::fs::create_dir_all(state_dir).map_err(|e| {
            OrchestratorError::Internal(format!("failed to create {}: {}", state_dir.display(), e))
        })?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            OrchestratorError::Internal(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            OrchestratorError::Internal(format!("failed to replace {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "Run manifest saved");
        Ok(path)
    }

    /// # Errors
    ///
    /// `InvalidInput` when no manifest exists for `workflow_id`, `Internal`
    /// when it cannot be read or parsed.
    pub fn load(state_dir: &Path, workflow_id: &str) -> Result<Self, OrchestratorError> {
        let path = Self::path(state_dir, workflow_id);
        if !path.exists() {
            return Err(OrchestratorError::InvalidInput(format!(
                "no saved workflow '{}' in {}",
                workflow_id,
                state_dir.display()
            )));
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::Internal(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            OrchestratorError::Internal(format!("malformed manifest {}: {}", path.display(), e))
        })
    }
}

/// Plans `request`, saves the manifest under `state_dir` and runs it.
///
/// Planning errors are returned before anything is written.
pub async fn orchestrate(
    planner: &WorkflowPlanner,
    coordinator: &ExecutionCoordinator,
    state_dir: &Path,
    request: &PlanRequest,
    data: Map<String, JsonValue>,
    cancellation_token: CancellationToken,
) -> Result<RunReport, OrchestratorError> {
    let manifest = RunManifest::new(planner.plan(request)?, data);
    manifest.save(state_dir)?;

    coordinator
        .run(&manifest.workflow, manifest.data, cancellation_token)
        .await
}

/// Continues the run saved under `workflow_id` with its original input.
pub async fn resume(
    coordinator: &ExecutionCoordinator,
    state_dir: &Path,
    workflow_id: &str,
    cancellation_token: CancellationToken,
) -> Result<RunReport, OrchestratorError> {
    let manifest = RunManifest::load(state_dir, workflow_id)?;
    info!(
        workflow_id = %manifest.workflow.id,
        tasks = manifest.workflow.len(),
        "Resuming saved workflow"
    );

    coordinator
        .resume(&manifest.workflow, manifest.data, cancellation_token)
        .await
}

/// Process exit status for a finished run: success only when it completed.
pub fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use chrono::Utc;
    use serde_json::json;

    fn manifest(id: &str) -> RunManifest {
        let workflow = Workflow {
            id: id.to_string(),
            name: "full workflow".into(),
            description: String::new(),
            tasks: vec![Task::new("01", "Intake")],
            estimated_duration: 60,
            created_at: Utc::now(),
        };
        let mut data = Map::new();
        data.insert("research".into(), json!("coffee subscriptions"));
        RunManifest::new(workflow, data)
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let saved = manifest("workflow-full-1a2b3c4d");

        let path = saved.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("workflow-full-1a2b3c4d.workflow.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = RunManifest::load(dir.path(), "workflow-full-1a2b3c4d").unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_path_stays_inside_state_dir() {
        let dir = Path::new("/srv/state");
        assert_eq!(
            RunManifest::path(dir, "../x"),
            PathBuf::from("/srv/state/.._x.workflow.json")
        );
        assert_eq!(
            RunManifest::path(dir, "a/b c"),
            PathBuf::from("/srv/state/a_b_c.workflow.json")
        );
    }

    #[test]
    fn test_missing_manifest_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunManifest::load(dir.path(), "workflow-gone").unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("workflow-gone"));
    }

    #[test]
    fn test_corrupt_manifest_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(RunManifest::path(dir.path(), "wf-1"), "{").unwrap();
        assert!(RunManifest::load(dir.path(), "wf-1").unwrap_err().is_internal());
    }
}
