//! Task registry: maps a task id to the skill that executes it.

use crate::error::OrchestratorError;
use crate::task::{Skill, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Introspection view of a registered skill (e.g. for a "list skills" command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCapability {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl From<&Task> for SkillCapability {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            dependencies: task.dependencies.clone(),
        }
    }
}

/// Router from task id to executable unit.
///
/// Registration is last-write-wins so tests and callers can override a
/// skill by registering another one under the same id.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    skills: BTreeMap<String, Arc<dyn Skill>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a skill under its own id, replacing any previous one.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let id = skill.id().to_string();
        if self.skills.insert(id.clone(), skill).is_some() {
            warn!(task_id = %id, "Skill re-registered; previous registration replaced");
        } else {
            debug!(task_id = %id, "Skill registered");
        }
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.register(skill);
        self
    }

    /// Looks up a skill.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` listing every registered id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Skill>, OrchestratorError> {
        self.skills
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::task_not_found(id, self.ids()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    /// Registered skills, sorted by id.
    pub fn list(&self) -> Vec<Arc<dyn Skill>> {
        self.skills.values().cloned().collect()
    }

    /// Task descriptors of every registered skill, sorted by id.
    pub fn tasks(&self) -> Vec<Task> {
        self.skills
            .values()
            .map(|s| s.identity().clone())
            .collect()
    }

    pub fn capabilities(&self) -> Vec<SkillCapability> {
        self.skills
            .values()
            .map(|s| SkillCapability::from(s.identity()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("skills", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::{AgentOutput, SkillInput};
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticSkill {
        task: Task,
        marker: &'static str,
    }

    impl StaticSkill {
        fn new(id: &str, marker: &'static str) -> Arc<Self> {
            Arc::new(Self {
                task: Task::new(id, format!("Skill {}", id)).with_description("static"),
                marker,
            })
        }
    }

    #[async_trait]
    impl Skill for StaticSkill {
        fn identity(&self) -> &Task {
            &self.task
        }

        async fn execute(&self, _input: SkillInput) -> Result<AgentOutput, TaskError> {
            Ok(AgentOutput::success(&self.task.id, json!(self.marker)))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = TaskRegistry::new().with_skill(StaticSkill::new("01", "a"));
        let skill = registry.get("01").unwrap();
        assert_eq!(skill.id(), "01");
        assert_eq!(skill.name(), "Skill 01");
    }

    #[test]
    fn test_get_missing_lists_registered_ids() {
        let registry = TaskRegistry::new().with_skill(StaticSkill::new("01", "a"));
        let err = registry.get("99").err().unwrap();
        let msg = err.to_string();

        assert!(matches!(err, OrchestratorError::TaskNotFound { .. }));
        assert!(msg.contains("99"));
        assert!(msg.contains("01"));
    }

    #[test]
    fn test_get_missing_on_empty_registry() {
        let registry = TaskRegistry::new();
        match registry.get("01").err().unwrap() {
            OrchestratorError::TaskNotFound { id, registered } => {
                assert_eq!(id, "01");
                assert!(registered.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = TaskRegistry::new();
        registry.register(StaticSkill::new("01", "first"));
        registry.register(StaticSkill::new("01", "second"));

        assert_eq!(registry.len(), 1);
        let output = registry
            .get("01")
            .unwrap()
            .execute(SkillInput::default())
            .await
            .unwrap();
        assert_eq!(output.data, json!("second"));
    }

    #[test]
    fn test_list_and_capabilities_sorted() {
        let registry = TaskRegistry::new()
            .with_skill(StaticSkill::new("02", "b"))
            .with_skill(StaticSkill::new("01", "a"));

        let ids: Vec<String> = registry.list().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["01", "02"]);

        let caps = registry.capabilities();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[0].id, "01");
        assert_eq!(caps[0].description, "static");
    }
}
