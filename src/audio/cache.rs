//! On-disk audio artifact cache
//!
//! Layout: internal artifacts in `<audio>/`, generated artifacts in
//! `<audio>/generated/`, one `<file id>.wav` per artifact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ArtifactKind, InternalPhrase};
use crate::settings::SettingsCascade;
use crate::speech::SpeechSynthesizer;
use crate::{Error, Result};

/// Subdirectory holding generated artifacts
const GENERATED_DIR: &str = "generated";

/// Artifact file extension
const EXTENSION: &str = "wav";

/// Which namespaces a purge clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    Generated,
    Internal,
    Both,
}

impl std::str::FromStr for PurgeScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "generated" => Ok(Self::Generated),
            "internal" => Ok(Self::Internal),
            "both" | "all" => Ok(Self::Both),
            other => Err(Error::Config(format!("unknown purge scope: {other}"))),
        }
    }
}

/// Tracks which audio artifacts exist and renders missing ones
pub struct AudioCache {
    internal_dir: PathBuf,
    generated_dir: PathBuf,
    settings: SettingsCascade,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AudioCache {
    /// Create a cache rooted at `audio_dir`
    #[must_use]
    pub fn new(
        audio_dir: PathBuf,
        settings: SettingsCascade,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            generated_dir: audio_dir.join(GENERATED_DIR),
            internal_dir: audio_dir,
            settings,
            synthesizer,
        }
    }

    /// Create both storage directories if missing
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created
    pub fn setup_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.internal_dir)?;
        std::fs::create_dir_all(&self.generated_dir)?;
        Ok(())
    }

    /// Path of the artifact for `file_id`, which must be a plain file name
    ///
    /// # Errors
    ///
    /// Returns `InvalidFileId` for empty ids or ids containing path components
    pub fn artifact_path(&self, file_id: &str, kind: ArtifactKind) -> Result<PathBuf> {
        if file_id.is_empty()
            || file_id.contains(['/', '\\'])
            || file_id.contains("..")
        {
            return Err(Error::InvalidFileId(file_id.to_string()));
        }

        let file_name = if Path::new(file_id)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
        {
            file_id.to_string()
        } else {
            format!("{file_id}.{EXTENSION}")
        };

        Ok(self.dir(kind).join(file_name))
    }

    /// Whether a usable artifact exists
    ///
    /// Generated artifacts count as absent while the persist policy is off,
    /// so every request renders them afresh.
    #[must_use]
    pub fn exists(&self, file_id: &str, kind: ArtifactKind) -> bool {
        self.exists_with_override(file_id, kind, false)
    }

    /// Whether an artifact is on disk, optionally ignoring the persist policy
    #[must_use]
    pub fn exists_with_override(
        &self,
        file_id: &str,
        kind: ArtifactKind,
        ignore_policy: bool,
    ) -> bool {
        if kind == ArtifactKind::Generated
            && !ignore_policy
            && !self.settings.resolve().save_previous_audio_files
        {
            return false;
        }

        self.artifact_path(file_id, kind)
            .is_ok_and(|path| path.is_file())
    }

    /// Make sure the artifact exists, synthesizing it if needed
    ///
    /// Never retries; the caller decides what a failure means.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the artifact cannot be written
    pub async fn ensure(&self, file_id: &str, kind: ArtifactKind, text: &str) -> Result<()> {
        if self.exists(file_id, kind) {
            tracing::debug!(file_id, %kind, "audio cache hit");
            return Ok(());
        }

        let path = self.artifact_path(file_id, kind)?;
        let voice = self.settings.resolve().voice;

        tracing::info!(file_id, %kind, "generating audio");
        let audio = self.synthesizer.synthesize(text, &voice).await?;

        let bytes = audio.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &audio))
            .await
            .map_err(|e| Error::Audio(format!("artifact write task failed: {e}")))??;
        tracing::debug!(path = %path.display(), bytes, "audio stored");
        Ok(())
    }

    /// Delete one artifact; missing artifacts are not an error
    ///
    /// # Errors
    ///
    /// Returns error if the id is invalid or the file cannot be removed
    pub fn invalidate_one(&self, file_id: &str, kind: ArtifactKind) -> Result<()> {
        let path = self.artifact_path(file_id, kind)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(file_id, %kind, "audio invalidated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every artifact in `scope` and recreate the empty directories
    ///
    /// Returns the number of artifacts removed.
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be read or recreated
    pub fn purge(&self, scope: PurgeScope) -> Result<usize> {
        let mut removed = 0;

        if matches!(scope, PurgeScope::Generated | PurgeScope::Both) {
            removed += clear_files(&self.generated_dir)?;
        }
        if matches!(scope, PurgeScope::Internal | PurgeScope::Both) {
            removed += clear_files(&self.internal_dir)?;
        }

        self.setup_directories()?;
        tracing::info!(?scope, removed, "audio purged");
        Ok(removed)
    }

    /// Boot-time purge of generated audio when it is not meant to persist
    ///
    /// # Errors
    ///
    /// Returns error if the purge fails
    pub fn purge_if_not_persisting(&self) -> Result<()> {
        if !self.settings.resolve().save_previous_audio_files {
            self.purge(PurgeScope::Generated)?;
        }
        Ok(())
    }

    /// Render any missing internal phrase
    ///
    /// Returns how many phrases could not be rendered.
    pub async fn prepare_internal_phrases(&self) -> usize {
        let phrases = self.settings.resolve().internal_phrases;
        let mut failed = 0;

        for phrase in InternalPhrase::ALL {
            if let Err(e) = self
                .ensure(phrase.file_id(), ArtifactKind::Internal, phrase.text(&phrases))
                .await
            {
                tracing::warn!(file_id = phrase.file_id(), error = %e, "failed to render internal phrase");
                failed += 1;
            }
        }

        failed
    }

    fn dir(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Internal => &self.internal_dir,
            ArtifactKind::Generated => &self.generated_dir,
        }
    }
}

/// Remove regular files directly inside `dir`, leaving subdirectories alone
fn clear_files(dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write via a temp file so playback never sees a partial artifact
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidFileId(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
