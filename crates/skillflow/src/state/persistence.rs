use super::StateSnapshot;
use crate::error::OrchestratorError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Durable storage for run snapshots, one per workflow id.
pub trait StatePersistence: Send + Sync {
    /// Replaces the stored snapshot for `snapshot.workflow_id`.
    ///
    /// Must not return before the snapshot is durable.
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), OrchestratorError>;

    /// Returns `None` if nothing was ever saved for `workflow_id`.
    fn load(&self, workflow_id: &str) -> Result<Option<StateSnapshot>, OrchestratorError>;
}

/// Stores each run as `<dir>/<workflow_id>.json`.
///
/// Writes are atomic: the snapshot goes to a `.tmp` sibling first and is then
/// renamed over the previous file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot of `workflow_id`.
    pub fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(workflow_id)))
    }
}

/// `workflow_id` with every character outside `[A-Za-z0-9._-]` replaced by
/// `_`, so it can never name a path outside its directory.
pub fn file_stem(workflow_id: &str) -> String {
    workflow_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn internal(action: &str, path: &Path, err: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::Internal(format!("{} {}: {}", action, path.display(), err))
}

impl StatePersistence for JsonFileStore {
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), OrchestratorError> {
        let path = self.path_for(&snapshot.workflow_id);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| internal("failed to serialize state for", &path, e))?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| internal("failed to create state directory", &self.dir, e))?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| internal("failed to write", &tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| internal("failed to replace", &path, e))?;

        Ok(())
    }

    fn load(&self, workflow_id: &str) -> Result<Option<StateSnapshot>, OrchestratorError> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| internal("failed to read", &path, e))?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| internal("failed to parse state file", &path, e))?;

        Ok(Some(snapshot))
    }
}

/// Keeps snapshots in memory. Counts writes so tests can check write-through.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: Mutex<HashMap<String, StateSnapshot>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, StateSnapshot>>, OrchestratorError> {
        self.snapshots
            .lock()
            .map_err(|_| OrchestratorError::Internal("state store lock poisoned".to_string()))
    }
}

impl StatePersistence for InMemoryStore {
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), OrchestratorError> {
        self.lock()?
            .insert(snapshot.workflow_id.clone(), snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> Result<Option<StateSnapshot>, OrchestratorError> {
        Ok(self.lock()?.get(workflow_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionState;

    #[test]
    fn test_json_file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state"));
        let snapshot = StateSnapshot::from(&ExecutionState::new("wf-1"));

        store.save(&snapshot).unwrap();

        assert!(dir.path().join("state/wf-1.json").exists());
        assert!(!dir.path().join("state/wf-1.json.tmp").exists());
        assert_eq!(store.load("wf-1").unwrap(), Some(snapshot));
    }

    #[test]
    fn test_json_file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("never-ran").unwrap().is_none());
    }

    #[test]
    fn test_json_file_store_corrupt_file_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wf-1.json"), "{not json").unwrap();

        let err = JsonFileStore::new(dir.path()).load("wf-1").unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_path_for_sanitizes_ids() {
        let store = JsonFileStore::new("/tmp/state");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/tmp/state/.._etc_passwd.json")
        );
    }

    #[test]
    fn test_in_memory_store_counts_writes() {
        let store = InMemoryStore::new();
        let snapshot = StateSnapshot::from(&ExecutionState::new("wf-1"));

        store.save(&snapshot).unwrap();
        store.save(&snapshot).unwrap();

        assert_eq!(store.write_count(), 2);
        assert!(store.load("wf-1").unwrap().is_some());
        assert!(store.load("wf-2").unwrap().is_none());
    }
}
