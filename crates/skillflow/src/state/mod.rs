//! Execution state of a workflow run and its durable representation.
//!
//! - [`ExecutionState`]: in-memory form, using sets and maps.
//! - [`StateSnapshot`]: on-disk form, arrays and ordered maps only.
//! - [`StatePersistence`]: where snapshots go ([`JsonFileStore`], [`InMemoryStore`]).
//! - [`StateStore`]: the only writer, persisting after every mutation.

mod persistence;
mod snapshot;
mod store;

pub use persistence::{InMemoryStore, JsonFileStore, StatePersistence, file_stem};
pub use snapshot::StateSnapshot;
pub use store::StateStore;

use crate::error::OrchestratorError;
use crate::task::AgentOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Lifecycle of a run: `pending -> running -> {completed | failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// `round(100 * completed / total)`, 0 for an empty run.
    pub percentage: u32,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u32
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// A task failure recorded during a run. Appended, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub task_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
    /// Machine-readable error code, see [`OrchestratorError::code`].
    #[serde(default)]
    pub code: String,
}

impl ExecutionError {
    pub fn new(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            recoverable: false,
            code: "EXECUTION_FAILED".to_string(),
        }
    }

    pub fn from_error(task_id: impl Into<String>, error: &OrchestratorError) -> Self {
        Self {
            recoverable: error.is_recoverable(),
            code: error.code().to_string(),
            ..Self::new(task_id, error.to_string())
        }
    }
}

/// In-memory state of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_task: Option<String>,
    pub completed_tasks: HashSet<String>,
    pub results: HashMap<String, AgentOutput>,
    pub errors: Vec<ExecutionError>,
    pub progress: Progress,
}

impl ExecutionState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            current_task: None,
            completed_tasks: HashSet::new(),
            results: HashMap::new(),
            errors: Vec::new(),
            progress: Progress::default(),
        }
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed_tasks.contains(task_id)
    }

    pub(crate) fn refresh_progress(&mut self) {
        self.progress = Progress::new(self.completed_tasks.len(), self.progress.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_progress_percentage() {
        assert_eq!(Progress::new(4, 5).percentage, 80);
        assert_eq!(Progress::new(5, 5).percentage, 100);
        assert_eq!(Progress::new(1, 3).percentage, 33);
        assert_eq!(Progress::new(2, 3).percentage, 67);
        assert_eq!(Progress::new(0, 0).percentage, 0);
    }

    #[test]
    fn test_execution_error_from_error() {
        let timeout = OrchestratorError::Timeout {
            task_id: "05".into(),
            timeout: Duration::from_secs(3),
        };
        let err = ExecutionError::from_error("05", &timeout);
        assert!(err.recoverable);
        assert_eq!(err.code, "TIMEOUT");

        let failed = OrchestratorError::ExecutionFailed {
            task_id: "05".into(),
            message: "boom".into(),
        };
        let err = ExecutionError::from_error("05", &failed);
        assert!(!err.recoverable);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn test_run_status_wire_names() {
        assert_eq!(serde_json::to_value(RunStatus::Running).unwrap(), "running");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }
}
