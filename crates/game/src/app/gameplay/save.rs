use std::path::{Path, PathBuf};

use engine::storage::{read_json, sha256_hex, write_json_atomic};
use engine::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::scene_state::{CountedSnapshot, SceneSnapshot, SnapshotError};
use super::types::ComposeCounters;

pub(crate) const LOCAL_SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum SaveError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("save file {path} validation failed at {field}: {message}")]
    Validation {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalSave {
    save_version: u32,
    counters: ComposeCounters,
    scene_data: String,
    scene_digest: String,
}

/// The playfield save file. Written whole and atomically.
#[derive(Debug, Clone)]
pub(crate) struct LocalSaveStore {
    path: PathBuf,
}

impl LocalSaveStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn in_dir(saves_dir: &Path, file_name: &str) -> Self {
        Self::new(saves_dir.join(file_name))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn save(
        &self,
        counters: ComposeCounters,
        snapshot: &SceneSnapshot,
    ) -> Result<(), SaveError> {
        let scene_data = snapshot.to_json()?;
        let save = LocalSave {
            save_version: LOCAL_SAVE_VERSION,
            counters,
            scene_digest: sha256_hex(scene_data.as_bytes()),
            scene_data,
        };
        write_json_atomic(&self.path, &save)?;
        info!(
            path = %self.path.display(),
            items = snapshot.items.len(),
            "local_save_written"
        );
        Ok(())
    }

    /// `Ok(None)` when no save exists yet.
    pub(crate) fn load(&self) -> Result<Option<CountedSnapshot>, SaveError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let save: LocalSave = read_json(&self.path)?;
        if save.save_version != LOCAL_SAVE_VERSION {
            return Err(self.invalid(
                "saveVersion",
                format!("expected {LOCAL_SAVE_VERSION}, got {}", save.save_version),
            ));
        }
        let digest = sha256_hex(save.scene_data.as_bytes());
        if digest != save.scene_digest {
            return Err(self.invalid(
                "sceneDigest",
                format!("expected {digest}, got {}", save.scene_digest),
            ));
        }
        let snapshot = SceneSnapshot::from_json(&save.scene_data)?;
        Ok(Some(CountedSnapshot {
            counters: save.counters,
            snapshot: Some(snapshot),
        }))
    }

    fn invalid(&self, field: &'static str, message: String) -> SaveError {
        SaveError::Validation {
            path: self.path.clone(),
            field,
            message,
        }
    }
}
