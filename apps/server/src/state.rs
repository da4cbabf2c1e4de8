//! Persisted per-instance schedule and options.
//!
//! The whole state is one small JSON document, rewritten on every change
//! through a temporary file and a rename.

use std::collections::BTreeMap;
use std::fs::{self, rename};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use light_schedule::AnchorPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::config::InstanceId;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file io error: {0}")]
    Io(#[from] io::Error),

    #[error("state file is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    pub schedule_points: Vec<AnchorPoint>,
    /// Seconds between refreshes.
    pub update_interval: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    schedulers: BTreeMap<InstanceId, InstanceState>,
}

#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl StateFile {
    /// Open the state at `path`; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let state = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn instance(&self, id: &str) -> Option<InstanceState> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.schedulers.get(id).cloned()
    }

    fn record(&self, id: &str, instance: InstanceState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.schedulers.insert(id.to_string(), instance);
    }

    /// Record the state of one instance and rewrite the file.
    pub fn save(&self, id: &str, instance: InstanceState) -> Result<(), StateError> {
        self.record(id, instance);
        self.flush()
    }

    /// Record the state of one instance now and rewrite the file on the
    /// blocking pool. Errors are logged.
    pub fn save_in_background(self: &Arc<Self>, id: &str, instance: InstanceState) {
        self.record(id, instance);

        let state = Arc::clone(self);
        let id = id.to_string();
        let write = move || {
            if let Err(e) = state.flush() {
                error!(instance = %id, error = %e, "failed to persist state");
            }
        };
        match Handle::try_current() {
            Ok(handle) => drop(handle.spawn_blocking(write)),
            Err(_) => write(),
        }
    }

    /// Write the current state to disk.
    pub fn flush(&self) -> Result<(), StateError> {
        // Every flush writes the latest state under the lock, so the last
        // one to run leaves the newest document on disk.
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let tmp_path = self.path.with_extension("json.new");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&*state)?)?;
        rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), schedulers = state.schedulers.len(), "saved state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstanceState {
        InstanceState {
            schedule_points: vec![AnchorPoint::new(7.5, 60), AnchorPoint::new(22.0, 5)],
            update_interval: 300,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.instance("desk"), None);
    }

    #[test]
    fn saved_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let state = StateFile::load(&path).unwrap();
        state.save("desk", sample()).unwrap();
        state
            .save(
                "hall",
                InstanceState {
                    schedule_points: Vec::new(),
                    update_interval: 30,
                },
            )
            .unwrap();

        let reloaded = StateFile::load(&path).unwrap();
        assert_eq!(reloaded.instance("desk"), Some(sample()));
        assert_eq!(reloaded.instance("hall").unwrap().schedule_points, Vec::new());
        assert!(!path.with_extension("json.new").exists());
    }

    #[tokio::test]
    async fn background_save_reaches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = Arc::new(StateFile::load(&path).unwrap());

        state.save_in_background("desk", sample());
        assert_eq!(state.instance("desk"), Some(sample()));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !path.exists() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let reloaded = StateFile::load(&path).unwrap();
        assert_eq!(reloaded.instance("desk"), Some(sample()));
    }

    #[test]
    fn background_save_without_runtime_writes_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = Arc::new(StateFile::load(&path).unwrap());

        state.save_in_background("desk", sample());
        assert_eq!(StateFile::load(&path).unwrap().instance("desk"), Some(sample()));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(StateFile::load(&path), Err(StateError::Json(_))));
    }
}
