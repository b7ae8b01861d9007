//! File-backed configuration for the CLI and embedders.
//!
//! Every field has a default, so an empty JSON object is a valid file:
//!
//! ```json
//! {
//!   "output_dir": "./output",
//!   "failure_policy": "continue",
//!   "task_timeout_secs": 300,
//!   "retry": { "maxRetries": 2, "delayMs": 500, "exponentialBackoff": true },
//!   "catalog": {
//!     "tasks": [
//!       { "id": "01", "name": "Intake", "command": ["python3", "skills/intake.py"] },
//!       { "id": "05", "name": "Market", "dependencies": ["01"], "command": ["./market"] }
//!     ],
//!     "presets": { "fundraising-only": ["05", "06"] }
//!   }
//! }
//! ```

use crate::catalog::TaskCatalog;
use crate::coordinator::{CoordinatorConfig, FailurePolicy};
use crate::error::OrchestratorError;
use crate::planner::WorkflowPlanner;
use crate::process::ProcessSkill;
use crate::protocol::{RetryPolicy, duration_ms};
use crate::registry::TaskRegistry;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A catalog task, optionally bound to an external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    #[serde(flatten)]
    pub task: Task,
    /// `[program, args..]` run as a [`ProcessSkill`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl From<Task> for TaskEntry {
    fn from(task: Task) -> Self {
        Self {
            task,
            command: None,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub tasks: Vec<TaskEntry>,
    pub presets: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillflowConfig {
    /// Where reports and standalone outputs are written.
    pub output_dir: PathBuf,
    /// Where run state files live. Defaults to `<output_dir>/state`.
    pub state_dir: Option<PathBuf>,
    pub failure_policy: FailurePolicy,
    pub task_timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
    pub min_task_interval_ms: u64,
    /// Placeholder cost per task used for workflow estimates.
    pub per_task_estimate_secs: u64,
    /// Task planned by the CLI's `--refactor` mode.
    pub refactor_task: String,
    /// Default tracing level when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    pub catalog: CatalogConfig,
}

impl Default for SkillflowConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            state_dir: None,
            failure_policy: FailurePolicy::default(),
            task_timeout_secs: None,
            retry: RetryPolicy::default(),
            min_task_interval_ms: 0,
            per_task_estimate_secs: 60,
            refactor_task: "refactor".to_string(),
            log_level: None,
            catalog: CatalogConfig::default(),
        }
    }
}

impl SkillflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the file is unreadable, malformed or fails
    /// [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::InvalidInput(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            OrchestratorError::InvalidInput(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!(path = %path.display(), tasks = config.catalog.tasks.len(), "Loaded configuration");
        Ok(config)
    }

    /// Rejects duplicate task ids and empty commands. Preset entries naming
    /// unknown tasks only produce a warning, since presets are lenient.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let mut seen = HashSet::new();
        for entry in &self.catalog.tasks {
            if !seen.insert(entry.task.id.as_str()) {
                return Err(OrchestratorError::InvalidInput(format!(
                    "duplicate task id '{}' in catalog",
                    entry.task.id
                )));
            }
            if matches!(&entry.command, Some(cmd) if cmd.is_empty()) {
                return Err(OrchestratorError::InvalidInput(format!(
                    "task '{}' has an empty command",
                    entry.task.id
                )));
            }
        }

        for (name, ids) in &self.catalog.presets {
            for id in ids.iter().filter(|id| !seen.contains(id.as_str())) {
                warn!(preset = %name, task_id = %id, "Preset references an unknown task");
            }
        }
        Ok(())
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_task_interval(mut self, interval: Duration) -> Self {
        self.min_task_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_task(mut self, entry: impl Into<TaskEntry>) -> Self {
        self.catalog.tasks.push(entry.into());
        self
    }

    pub fn with_preset<I, S>(mut self, name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog
            .presets
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("state"))
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::new()
            .with_failure_policy(self.failure_policy)
            .with_retry_policy(self.retry)
            .with_min_task_interval(Duration::from_millis(self.min_task_interval_ms));
        if let Some(secs) = self.task_timeout_secs {
            config = config.with_task_timeout(Duration::from_secs(secs));
        }
        config
    }

    pub fn task_catalog(&self) -> TaskCatalog {
        let tasks = self.catalog.tasks.iter().map(|e| e.task.clone()).collect();
        self.catalog
            .presets
            .iter()
            .fold(TaskCatalog::new(tasks), |catalog, (name, ids)| {
                catalog.with_preset(name.clone(), ids.iter().cloned())
            })
    }

    pub fn planner(&self) -> WorkflowPlanner {
        WorkflowPlanner::new(self.task_catalog())
            .with_per_task_estimate(Duration::from_secs(self.per_task_estimate_secs))
    }

    /// Registry of every catalog entry that has a `command`.
    pub fn process_registry(&self) -> Result<TaskRegistry, OrchestratorError> {
        let mut registry = TaskRegistry::new();
        for entry in &self.catalog.tasks {
            let Some(command) = &entry.command else {
                continue;
            };
            let skill = ProcessSkill::from_command(entry.task.clone(), command)
                .map_err(|e| OrchestratorError::from_task_error(&entry.task.id, e))?
                .with_envs(entry.env.clone());
            registry.register(Arc::new(skill));
        }
        Ok(registry)
    }
}
