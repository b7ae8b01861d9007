//! The canonical task catalog and its named presets.

use crate::error::OrchestratorError;
use crate::registry::TaskRegistry;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered list of every known task plus curated subsets of it.
///
/// Catalog order is the tie-breaker the resolver uses for tasks with no
/// ordering constraint between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCatalog {
    #[serde(default)]
    tasks: Vec<Task>,
    /// Preset name -> task ids.
    #[serde(default)]
    presets: BTreeMap<String, Vec<String>>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            presets: BTreeMap::new(),
        }
    }

    /// Catalog of every registered skill, in id order.
    pub fn from_registry(registry: &TaskRegistry) -> Self {
        Self::new(registry.tasks())
    }

    pub fn with_preset<I, S>(mut self, name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_preset(name, ids);
        self
    }

    pub fn add_preset<I, S>(&mut self, name: impl Into<String>, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
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

    /// Ids of a named preset.
    ///
    /// # Errors
    ///
    /// `PresetNotFound` listing the available preset names.
    pub fn preset(&self, name: &str) -> Result<&[String], OrchestratorError> {
        self.presets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| OrchestratorError::PresetNotFound {
                name: name.to_string(),
                available: self.preset_names(),
            })
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn presets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.presets
    }

    /// Catalog entries for `ids`, in the order requested.
    ///
    /// Unknown ids are dropped and repeated ids kept once. This is a lenient
    /// filter, not a validation step.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Task> {
        let by_id: HashMap<&str, &Task> = self.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut selected: Vec<Task> = Vec::with_capacity(ids.len());

        for id in ids {
            let id = id.as_ref();
            if selected.iter().any(|t| t.id == id) {
                continue;
            }
            if let Some(task) = by_id.get(id) {
                selected.push((*task).clone());
            }
        }

        selected
    }
}
