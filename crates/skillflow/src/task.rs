//! Task descriptors, the `Skill` capability trait and the standardized output envelope.
//!
//! A [`Task`] is the static identity of a unit of work: its id, display
//! metadata and the ids it depends on. A [`Skill`] is the executable side of
//! the same unit. Skills never see global run state; the coordinator hands
//! them a [`SkillInput`] containing only the outputs of their declared
//! dependencies, and they answer with an [`AgentOutput`].
//!
//! # Example
//!
//! ```rust,ignore
//! use skillflow::task::{AgentOutput, Skill, SkillInput, Task};
//! use skillflow::TaskError;
//!
//! struct MarketAnalysis {
//!     task: Task,
//! }
//!
//! #[async_trait::async_trait]
//! impl Skill for MarketAnalysis {
//!     fn identity(&self) -> &Task {
//!         &self.task
//!     }
//!
//!     async fn execute(&self, input: SkillInput) -> Result<AgentOutput, TaskError> {
//!         let summary = skillflow::provenance::mark_suggested("Target SMB retail first");
//!         Ok(AgentOutput::success(&self.task.id, serde_json::json!({ "summary": summary })))
//!     }
//! }
//! ```

use crate::error::TaskError;
use crate::provenance;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Static identity of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within a catalog (e.g. `"05"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Ids that must complete before this task runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Informational ordering hint. Never used for correctness.
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            priority: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds dependency ids, ignoring ones already declared.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true if `id` is a declared dependency.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }
}

/// Outputs of completed dependencies plus a read-only view of run state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillContext {
    /// Dependency id -> that task's `data` payload. Only declared dependencies
    /// that actually completed appear here.
    #[serde(default)]
    pub previous_outputs: BTreeMap<String, JsonValue>,
    /// Informational snapshot (workflow id, progress, optional metrics).
    #[serde(default)]
    pub execution_state: JsonValue,
}

/// What a skill receives when invoked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillInput {
    /// Caller-supplied data for the whole run.
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    #[serde(default)]
    pub context: SkillContext,
}

impl SkillInput {
    pub fn new(data: Map<String, JsonValue>) -> Self {
        Self {
            data,
            context: SkillContext::default(),
        }
    }

    pub fn with_context(mut self, context: SkillContext) -> Self {
        self.context = context;
        self
    }

    /// Output of dependency `id`, if it completed in this run.
    pub fn previous_output(&self, id: &str) -> Option<&JsonValue> {
        self.context.previous_outputs.get(id)
    }
}

/// Outcome classification reported by a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Partial,
    Failed,
}

/// Self-assessed quality of the produced data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    High,
    #[default]
    Medium,
    Low,
}

/// Which pieces of `data` came from user material, were suggested, or assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Markings {
    #[serde(default)]
    pub from_plan: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl Markings {
    pub fn is_empty(&self) -> bool {
        self.from_plan.is_empty() && self.suggestions.is_empty() && self.assumptions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    #[serde(default)]
    pub markings: Markings,
    #[serde(default)]
    pub dependencies_used: Vec<String>,
    /// Wall-clock execution time in milliseconds.
    #[serde(default)]
    pub execution_time: u64,
    #[serde(default)]
    pub data_quality: DataQuality,
}

/// The standardized result envelope returned by a skill.
///
/// Immutable once stored by the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    pub task_id: String,
    pub generated_at: DateTime<Utc>,
    pub status: OutputStatus,
    pub data: JsonValue,
    #[serde(default)]
    pub metadata: OutputMetadata,
}

impl AgentOutput {
    /// Successful output. Provenance markings are collected from `data`.
    pub fn success(task_id: impl Into<String>, data: JsonValue) -> Self {
        Self::with_status(task_id, OutputStatus::Success, data)
    }

    pub fn partial(task_id: impl Into<String>, data: JsonValue) -> Self {
        Self::with_status(task_id, OutputStatus::Partial, data)
    }

    pub fn with_status(task_id: impl Into<String>, status: OutputStatus, data: JsonValue) -> Self {
        let markings = provenance::collect_markings(&data);
        Self {
            task_id: task_id.into(),
            generated_at: Utc::now(),
            status,
            data,
            metadata: OutputMetadata {
                markings,
                ..Default::default()
            },
        }
    }

    pub fn with_quality(mut self, quality: DataQuality) -> Self {
        self.metadata.data_quality = quality;
        self
    }

    pub fn with_dependencies_used<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.dependencies_used = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.metadata.execution_time = millis;
        self
    }
}

/// The executable side of a task.
///
/// Implementations compose this trait; shared helpers (provenance tagging,
/// output construction) are free functions rather than inherited methods.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Identity: id, name, dependencies and description.
    fn identity(&self) -> &Task;

    /// Runs the skill against an assembled input.
    async fn execute(&self, input: SkillInput) -> Result<AgentOutput, TaskError>;

    fn id(&self) -> &str {
        &self.identity().id
    }

    fn name(&self) -> &str {
        &self.identity().name
    }

    fn description(&self) -> &str {
        &self.identity().description
    }

    fn dependencies(&self) -> &[String] {
        &self.identity().dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder_dedupes_dependencies() {
        let task = Task::new("C", "Task C")
            .with_dependencies(["A", "B"])
            .with_dependencies(["A"]);

        assert_eq!(task.dependencies, vec!["A", "B"]);
        assert!(task.depends_on("B"));
        assert!(!task.depends_on("C"));
    }

    #[test]
    fn test_task_deserialize_defaults() {
        let task: Task = serde_json::from_value(json!({"id": "01", "name": "Intake"})).unwrap();
        assert!(task.dependencies.is_empty());
        assert_eq!(task.priority, 0);
        assert_eq!(task.description, "");
    }

    #[test]
    fn test_agent_output_wire_shape() {
        let output = AgentOutput::success("01", json!({"summary": "[FROM_PLAN] Bakery"}))
            .with_quality(DataQuality::High)
            .with_dependencies_used(["00"])
            .with_execution_time(12);

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["taskId"], "01");
        assert_eq!(value["status"], "success");
        assert_eq!(value["metadata"]["dataQuality"], "high");
        assert_eq!(value["metadata"]["dependenciesUsed"], json!(["00"]));
        assert_eq!(value["metadata"]["executionTime"], 12);
        assert_eq!(
            value["metadata"]["markings"]["fromPlan"],
            json!(["[FROM_PLAN] Bakery"])
        );
        assert!(value["generatedAt"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_skill_input_previous_output() {
        let mut context = SkillContext::default();
        context
            .previous_outputs
            .insert("A".to_string(), json!({"x": 1}));
        let input = SkillInput::default().with_context(context);

        assert_eq!(input.previous_output("A"), Some(&json!({"x": 1})));
        assert!(input.previous_output("B").is_none());
    }
}
