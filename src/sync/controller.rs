//! One remote settings sync cycle and its side effects

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::client::RemoteSettingsSource;
use super::merge::{SettingsChanges, merge_catalog};
use crate::audio::{ArtifactKind, AudioCache, PurgeScope};
use crate::oplog::OperationalLog;
use crate::settings::{SettingsCascade, default_dialogues, resolve_layers};
use crate::Result;

/// Pulls remote settings and keeps the cache and intervals consistent with them
pub struct RemoteSyncController {
    source: Arc<dyn RemoteSettingsSource>,
    settings: SettingsCascade,
    cache: Arc<AudioCache>,
    log: OperationalLog,
    download_also_checks_in: bool,
    sync_interval: watch::Sender<Duration>,
    poll_interval: watch::Sender<Option<Duration>>,
}

impl RemoteSyncController {
    #[must_use]
    pub fn new(
        source: Arc<dyn RemoteSettingsSource>,
        settings: SettingsCascade,
        cache: Arc<AudioCache>,
        log: OperationalLog,
        download_also_checks_in: bool,
    ) -> Self {
        let current = settings.resolve();
        let (sync_interval, _) = watch::channel(current.settings_sync_interval());
        let (poll_interval, _) = watch::channel(current.weather_poll_interval());

        Self {
            source,
            settings,
            cache,
            log,
            download_also_checks_in,
            sync_interval,
            poll_interval,
        }
    }

    /// Period of the sync loop; changes when a sync changes it
    #[must_use]
    pub fn subscribe_sync_interval(&self) -> watch::Receiver<Duration> {
        self.sync_interval.subscribe()
    }

    /// Period of the knowledge refresh loop, `None` when disabled
    #[must_use]
    pub fn subscribe_poll_interval(&self) -> watch::Receiver<Option<Duration>> {
        self.poll_interval.subscribe()
    }

    /// Run one download, merge and apply cycle
    ///
    /// # Errors
    ///
    /// Returns error if the download fails or the snapshots cannot be
    /// written; nothing is applied to the cache in that case
    pub async fn sync_once(&self) -> Result<SettingsChanges> {
        let downloaded = self.source.download().await;

        if downloaded.is_err() || !self.download_also_checks_in {
            if let Err(e) = self.source.check_in().await {
                tracing::debug!(error = %e, "check-in failed");
            }
        }

        let layer = downloaded?;
        let store = self.settings.store();
        let before = self.settings.resolve();

        let mut local = store.local();
        let merged = layer.dialogues.as_ref().map(|remote| {
            let base = local.dialogues.clone().unwrap_or_else(default_dialogues);
            merge_catalog(&base, remote)
        });
        if let Some(catalog) = &merged {
            local.dialogues = Some(catalog.clone());
        }

        let after = resolve_layers(Some(&layer), &local);
        let changes = SettingsChanges::between(&before, &after);

        store.replace_remote(layer)?;
        if let Some(catalog) = merged {
            store.replace_local_catalog(catalog)?;
        }

        self.apply(&changes);
        self.sync_interval
            .send_if_modified(|current| replace_if_changed(current, after.settings_sync_interval()));
        self.poll_interval
            .send_if_modified(|current| replace_if_changed(current, after.weather_poll_interval()));

        if changes.is_empty() {
            tracing::debug!("remote settings unchanged");
        } else {
            tracing::info!(
                changed_ids = changes.changed_ids.len(),
                voice_changed = changes.voice_changed,
                persist_disabled = changes.persist_disabled,
                "remote settings applied"
            );
            self.log
                .record(
                    "sync",
                    &format!(
                        "Settings updated: {} phrase(s) changed, voice changed: {}, persist disabled: {}",
                        changes.changed_ids.len(),
                        changes.voice_changed,
                        changes.persist_disabled
                    ),
                )
                .await;
        }

        Ok(changes)
    }

    fn apply(&self, changes: &SettingsChanges) {
        if changes.needs_purge() {
            if let Err(e) = self.cache.purge(PurgeScope::Generated) {
                tracing::error!(error = %e, "failed to purge generated audio");
            }
            return;
        }

        for id in &changes.changed_ids {
            if let Err(e) = self.cache.invalidate_one(id, ArtifactKind::Generated) {
                tracing::warn!(file_id = %id, error = %e, "failed to invalidate audio");
            }
        }
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}
