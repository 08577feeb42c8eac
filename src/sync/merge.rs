//! Catalog merge and settings diffing for remote sync

use std::collections::{BTreeSet, HashMap};

use crate::dialogue::PhraseRecord;
use crate::settings::EffectiveSettings;

/// Merge `remote` phrase records into `local` by file id
///
/// - Records with a known id overwrite the local text and properties in place
/// - Unseen ids are appended in remote order
/// - Local records absent from `remote` are kept
#[must_use]
pub fn merge_catalog(local: &[PhraseRecord], remote: &[PhraseRecord]) -> Vec<PhraseRecord> {
    let mut merged = local.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.file_id.clone(), i))
        .collect();

    for record in remote {
        if let Some(&i) = index.get(&record.file_id) {
            merged[i].text.clone_from(&record.text);
            merged[i].properties.clone_from(&record.properties);
        } else {
            index.insert(record.file_id.clone(), merged.len());
            merged.push(record.clone());
        }
    }

    merged
}

/// What a sync changed in the effective settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsChanges {
    /// Phrase ids whose audio no longer matches the catalog
    /// (text changed, newly added, or removed)
    pub changed_ids: BTreeSet<String>,

    /// Voice parameters changed; every generated artifact is stale
    pub voice_changed: bool,

    /// Generated audio stopped being persisted
    pub persist_disabled: bool,

    pub sync_interval_changed: bool,

    pub poll_interval_changed: bool,
}

impl SettingsChanges {
    /// Diff two effective settings snapshots
    #[must_use]
    pub fn between(before: &EffectiveSettings, after: &EffectiveSettings) -> Self {
        let old: HashMap<&str, &str> = before
            .dialogues
            .iter()
            .map(|r| (r.file_id.as_str(), r.text.as_str()))
            .collect();
        let new: HashMap<&str, &str> = after
            .dialogues
            .iter()
            .map(|r| (r.file_id.as_str(), r.text.as_str()))
            .collect();

        let mut changed_ids: BTreeSet<String> = new
            .iter()
            .filter(|(id, text)| old.get(*id) != Some(*text))
            .map(|(id, _)| (*id).to_string())
            .collect();
        changed_ids.extend(
            old.keys()
                .filter(|id| !new.contains_key(*id))
                .map(|id| (*id).to_string()),
        );

        Self {
            changed_ids,
            voice_changed: before.voice != after.voice,
            persist_disabled: before.save_previous_audio_files && !after.save_previous_audio_files,
            sync_interval_changed: before.settings_sync_interval_secs
                != after.settings_sync_interval_secs,
            poll_interval_changed: before.weather_poll_interval_secs
                != after.weather_poll_interval_secs,
        }
    }

    /// Whether generated audio must be purged wholesale
    #[must_use]
    pub const fn needs_purge(&self) -> bool {
        self.voice_changed || self.persist_disabled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_ids.is_empty()
            && !self.voice_changed
            && !self.persist_disabled
            && !self.sync_interval_changed
            && !self.poll_interval_changed
    }
}
