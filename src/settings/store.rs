//! Settings tiers and their JSON snapshots
//!
//! The remote tier lives in `remote_settings.json`; the local tier is the
//! config file's fallback table with its phrase catalog replaced by the
//! merged catalog in `local_settings.json` once a sync has produced one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::SettingsLayer;
use crate::dialogue::PhraseRecord;
use crate::Result;

/// Remote snapshot file name
pub const REMOTE_SNAPSHOT: &str = "remote_settings.json";

/// Local catalog snapshot file name
pub const LOCAL_SNAPSHOT: &str = "local_settings.json";

/// Holds the remote and local settings tiers
#[derive(Debug)]
pub struct SettingsStore {
    remote: RwLock<Option<SettingsLayer>>,
    local: RwLock<SettingsLayer>,
    snapshot_dir: Option<PathBuf>,
}

impl SettingsStore {
    /// Store without any on-disk snapshots
    #[must_use]
    pub const fn in_memory(local: SettingsLayer) -> Self {
        Self {
            remote: RwLock::new(None),
            local: RwLock::new(local),
            snapshot_dir: None,
        }
    }

    /// Open the store in `data_dir`, loading any previous snapshots
    ///
    /// Unreadable snapshots are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns error if `data_dir` cannot be created
    pub fn open(data_dir: &Path, fallback: SettingsLayer) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let remote = load_snapshot::<SettingsLayer>(&data_dir.join(REMOTE_SNAPSHOT));

        let mut local = fallback;
        if let Some(snapshot) = load_snapshot::<SettingsLayer>(&data_dir.join(LOCAL_SNAPSHOT)) {
            if snapshot.dialogues.is_some() {
                local.dialogues = snapshot.dialogues;
            }
        }

        tracing::debug!(
            dir = %data_dir.display(),
            has_remote = remote.is_some(),
            local_dialogues = local.dialogues.as_ref().map_or(0, Vec::len),
            "settings store opened"
        );

        Ok(Self {
            remote: RwLock::new(remote),
            local: RwLock::new(local),
            snapshot_dir: Some(data_dir.to_path_buf()),
        })
    }

    /// Last downloaded remote settings
    #[must_use]
    pub fn remote(&self) -> Option<SettingsLayer> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Local fallback settings
    #[must_use]
    pub fn local(&self) -> SettingsLayer {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the remote tier and persist it
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written; the in-memory tier
    /// is updated regardless
    pub fn replace_remote(&self, layer: SettingsLayer) -> Result<()> {
        let persisted = self
            .snapshot_dir
            .as_ref()
            .map(|dir| write_snapshot(&dir.join(REMOTE_SNAPSHOT), &layer));

        *self.remote.write().unwrap_or_else(PoisonError::into_inner) = Some(layer);
        persisted.transpose().map(|_| ())
    }

    /// Replace the local phrase catalog and persist it
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written; the in-memory tier
    /// is updated regardless
    pub fn replace_local_catalog(&self, catalog: Vec<PhraseRecord>) -> Result<()> {
        let snapshot = SettingsLayer {
            dialogues: Some(catalog.clone()),
            ..Default::default()
        };
        let persisted = self
            .snapshot_dir
            .as_ref()
            .map(|dir| write_snapshot(&dir.join(LOCAL_SNAPSHOT), &snapshot));

        self.local
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .dialogues = Some(catalog);
        persisted.transpose().map(|_| ())
    }
}

/// Read a JSON snapshot, `None` if missing or unparsable
fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse settings snapshot, ignoring"
                );
                None
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read settings snapshot"
            );
            None
        }
    }
}

/// Write `value` as pretty JSON via a temp file in the same directory
pub(crate) fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "wrote snapshot");
    Ok(())
}
