//! Error types for planning, execution and persistence.

use std::time::Duration;
use thiserror::Error;

/// Errors a skill returns from its own `execute` logic.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The input handed to the skill was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The skill ran but its logic failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Spawning or talking to an external process failed.
    #[error("Process error: {0}")]
    ProcessError(String),

    /// The skill could not parse an upstream response.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// I/O error during execution.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else.
    #[error("Task error: {0}")]
    Other(String),
}

impl TaskError {
    /// Check if this error should trigger an automatic retry.
    ///
    /// Process, parse and I/O failures are usually transient. Logical
    /// failures and bad input are reported immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::ProcessError(_) | TaskError::ParseError(_) | TaskError::Io(_)
        )
    }
}

/// Errors that can occur while planning or running a workflow.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed task input (duplicate ids, unreadable input file, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No executable unit is registered under the requested id.
    #[error("Task '{id}' not found. Registered tasks: [{}]", .registered.join(", "))]
    TaskNotFound { id: String, registered: Vec<String> },

    /// The dependency relation contains a cycle through `task_id`.
    #[error("Circular dependency detected involving task '{task_id}'")]
    CircularDependency { task_id: String },

    /// Unknown workflow preset name.
    #[error("Workflow preset '{name}' not found. Available presets: [{}]", .available.join(", "))]
    PresetNotFound { name: String, available: Vec<String> },

    /// A task's own logic failed.
    #[error("Task '{task_id}' failed: {message}")]
    ExecutionFailed { task_id: String, message: String },

    /// A task did not finish within its deadline.
    #[error("Task '{task_id}' timed out after {timeout:?}")]
    Timeout { task_id: String, timeout: Duration },

    /// The run was cancelled while `task_id` was executing.
    #[error("Task '{task_id}' was cancelled")]
    Cancelled { task_id: String },

    /// A task output carried a provenance tag outside the closed set.
    #[error("Invalid provenance marking: {0}")]
    InvalidProvenance(String),

    /// Serialization or persistence failure. Always fatal to a run.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Builds a `TaskNotFound` with the registered ids sorted for stable messages.
    pub fn task_not_found(id: impl Into<String>, mut registered: Vec<String>) -> Self {
        registered.sort();
        Self::TaskNotFound {
            id: id.into(),
            registered,
        }
    }

    /// Wraps a skill failure, attributing it to `task_id`.
    pub fn from_task_error(task_id: &str, error: TaskError) -> Self {
        match error {
            TaskError::InvalidInput(msg) => {
                Self::InvalidInput(format!("task '{}': {}", task_id, msg))
            }
            other => Self::ExecutionFailed {
                task_id: task_id.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Stable machine-readable code, used in protocol error messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            Self::PresetNotFound { .. } => "PRESET_NOT_FOUND",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled { .. } => "CANCELLED",
            Self::InvalidProvenance(_) => "INVALID_PROVENANCE",
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// True for serialization/persistence failures.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Io(_) | Self::Json(_))
    }

    /// True when re-running the task may succeed (timeouts, cancellation).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }

    /// True for errors raised before any task runs.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. }
                | Self::CircularDependency { .. }
                | Self::PresetNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_retryable() {
        assert!(TaskError::ProcessError("crashed".into()).is_retryable());
        assert!(TaskError::ParseError("bad json".into()).is_retryable());
        assert!(
            TaskError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t")).is_retryable()
        );
    }

    #[test]
    fn test_task_error_not_retryable() {
        assert!(!TaskError::ExecutionFailed("logic".into()).is_retryable());
        assert!(!TaskError::InvalidInput("missing field".into()).is_retryable());
        assert!(!TaskError::Other("?".into()).is_retryable());
    }

    #[test]
    fn test_task_not_found_lists_registered_ids() {
        let err = OrchestratorError::task_not_found("99", vec!["02".into(), "01".into()]);
        let msg = err.to_string();
        assert!(msg.contains("99"));
        assert!(msg.contains("01, 02"));
    }

    #[test]
    fn test_preset_not_found_message() {
        let err = OrchestratorError::PresetNotFound {
            name: "nope".into(),
            available: vec!["fundraising-only".into()],
        };
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains("fundraising-only"));
    }

    #[test]
    fn test_from_task_error() {
        let err =
            OrchestratorError::from_task_error("05", TaskError::ExecutionFailed("boom".into()));
        assert!(matches!(
            err,
            OrchestratorError::ExecutionFailed { ref task_id, .. } if task_id == "05"
        ));

        let err = OrchestratorError::from_task_error("05", TaskError::InvalidInput("x".into()));
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_codes_and_classification() {
        let io = OrchestratorError::from(std::io::Error::other("disk full"));
        assert_eq!(io.code(), "INTERNAL_ERROR");
        assert!(io.is_internal());

        let cycle = OrchestratorError::CircularDependency {
            task_id: "X".into(),
        };
        assert!(cycle.is_planning_error());
        assert!(!cycle.is_internal());
    }
}
