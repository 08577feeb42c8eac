//! Daemon - the appliance service
//!
//! Wires the production collaborators together, runs the boot sequence, keeps
//! the settings sync and knowledge refresh intervals going, and turns trigger
//! events into pipeline runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::{
    ArtifactKind, AudioCache, AudioSink, CpalSink, NullSink, PlaybackQueue, Volume,
};
use crate::connectivity::HttpConnectivityCheck;
use crate::dialogue::DialogueSelector;
use crate::oplog::OperationalLog;
use crate::orchestrator::{Orchestrator, RunOutcome, Services};
use crate::settings::{SettingsCascade, SettingsStore};
use crate::speech::AzureSpeech;
use crate::sync::{MotherClient, RemoteSyncController};
use crate::trigger::TriggerEvent;
use crate::weather::{IitClient, WeatherProperties};
use crate::{Config, Error, Result};

/// The raincheck daemon
pub struct Daemon {
    orchestrator: Arc<Orchestrator>,
    sync: Arc<RemoteSyncController>,
    volume: Volume,
    step_timeout: Duration,
}

impl Daemon {
    /// Create a daemon with the production collaborators
    ///
    /// Falls back to a silent sink when no audio output is available.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or an HTTP client cannot be set up
    pub fn new(config: Config) -> Result<Self> {
        let Config {
            auth,
            service,
            fallback_settings,
        } = config;

        let store = Arc::new(SettingsStore::open(&service.data_dir, fallback_settings)?);
        let settings = SettingsCascade::new(store);

        let synthesizer = Arc::new(AzureSpeech::new(
            auth.speech_key,
            &auth.speech_region,
            service.request_timeout,
        )?);
        let cache = Arc::new(AudioCache::new(
            service.audio_dir(),
            settings.clone(),
            synthesizer,
        ));

        let volume = Volume::new(service.initial_volume);
        let sink: Arc<dyn AudioSink> = match CpalSink::new(volume.clone()) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "audio output unavailable, playback disabled");
                Arc::new(NullSink)
            }
        };
        let queue = PlaybackQueue::new(Arc::clone(&cache), sink);

        let log = OperationalLog::in_dir(&service.data_dir);
        let services = Services {
            settings: settings.clone(),
            cache: Arc::clone(&cache),
            queue,
            weather: Arc::new(IitClient::new(
                &service.iit_url,
                auth.iit_token,
                service.request_timeout,
            )?),
            connectivity: Arc::new(HttpConnectivityCheck::new(service.request_timeout)?),
            log: log.clone(),
        };

        let mother = Arc::new(MotherClient::new(
            &service.mother_url,
            auth.mother_token,
            service.sync_timeout,
        )?);
        let sync = RemoteSyncController::new(
            mother,
            settings,
            cache,
            log,
            service.download_also_checks_in,
        );

        tracing::debug!(
            data_dir = %service.data_dir.display(),
            iit_url = %service.iit_url,
            mother_url = %service.mother_url,
            "daemon initialized"
        );

        Ok(Self::from_parts(services, sync, volume, service.request_timeout))
    }

    /// Create a daemon from already-built parts
    #[must_use]
    pub fn from_parts(
        services: Services,
        sync: RemoteSyncController,
        volume: Volume,
        step_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::with_step_timeout(services, step_timeout)),
            sync: Arc::new(sync),
            volume,
            step_timeout,
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub const fn sync_controller(&self) -> &Arc<RemoteSyncController> {
        &self.sync
    }

    #[must_use]
    pub const fn volume(&self) -> &Volume {
        &self.volume
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.orchestrator.services().cache
    }

    /// Prepare storage and internal phrases
    ///
    /// Runs one sync first so the phrases are rendered with the current voice;
    /// a failed sync only means the previous snapshot is used.
    ///
    /// # Errors
    ///
    /// Returns error if the audio directories cannot be prepared
    pub async fn boot(&self) -> Result<()> {
        let cache = self.cache();
        cache.setup_directories()?;

        if let Err(e) = self.sync.sync_once().await {
            tracing::warn!(error = %e, "initial settings sync failed, using saved settings");
        }

        cache.purge_if_not_persisting()?;

        let failed = cache.prepare_internal_phrases().await;
        if failed > 0 {
            tracing::warn!(failed, "some internal phrases are unavailable");
        }

        tracing::info!("boot complete");
        Ok(())
    }

    /// Run until interrupted, handling events from `triggers`
    ///
    /// # Errors
    ///
    /// Returns error if boot fails
    pub async fn run(self, mut triggers: mpsc::Receiver<TriggerEvent>) -> Result<()> {
        self.boot().await?;

        let sync = Arc::clone(&self.sync);
        let sync_task = spawn_interval("settings sync", self.sync.subscribe_sync_interval(), move || {
            let sync = Arc::clone(&sync);
            async move {
                if let Err(e) = sync.sync_once().await {
                    tracing::warn!(error = %e, "settings sync failed");
                }
            }
        });

        let services = self.orchestrator.services().clone();
        let step_timeout = self.step_timeout;
        let refresh_task = spawn_interval(
            "knowledge refresh",
            self.sync.subscribe_poll_interval(),
            move || {
                let services = services.clone();
                async move {
                    match refresh_knowledge(&services, step_timeout).await {
                        Ok(warmed) => tracing::debug!(warmed, "knowledge refreshed"),
                        Err(e) => tracing::warn!(error = %e, "knowledge refresh failed"),
                    }
                }
            },
        );

        tracing::info!("daemon running, waiting for triggers");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = triggers.recv() => {
                    let Some(event) = event else {
                        tracing::info!("trigger sources closed");
                        break;
                    };
                    self.dispatch(event);
                }
            }
        }

        sync_task.abort();
        refresh_task.abort();
        Ok(())
    }

    /// Act on one trigger without waiting for it to finish
    ///
    /// Pipeline runs are spawned so that a second press while one is in
    /// flight reaches the orchestrator and is rejected there.
    pub fn dispatch(&self, event: TriggerEvent) -> Option<JoinHandle<RunOutcome>> {
        tracing::debug!(?event, "trigger");

        match event {
            TriggerEvent::Ask => {
                let orchestrator = Arc::clone(&self.orchestrator);
                Some(tokio::spawn(async move { orchestrator.run().await }))
            }
            TriggerEvent::SecretReset => {
                let orchestrator = Arc::clone(&self.orchestrator);
                Some(tokio::spawn(async move { orchestrator.secret_reset().await }))
            }
            TriggerEvent::VolumeChanged(level) => {
                self.volume.set(level);
                None
            }
        }
    }
}

/// Warm the generated-audio cache for the current weather
///
/// Selects phrases the same way a request would and makes sure their audio
/// exists, without playing anything or touching the in-flight guard. Skipped
/// while generated audio is not persisted. Returns how many phrases were
/// checked.
///
/// # Errors
///
/// Returns error if the weather cannot be fetched or audio generation fails
pub async fn refresh_knowledge(services: &Services, step_timeout: Duration) -> Result<usize> {
    let settings = services.settings.resolve();
    if !settings.save_previous_audio_files {
        tracing::debug!("generated audio not persisted, skipping knowledge refresh");
        return Ok(0);
    }

    let facts = tokio::time::timeout(step_timeout, services.weather.fetch(&settings.location))
        .await
        .map_err(|_| Error::Weather("weather fetch timed out".to_string()))??;
    let properties = WeatherProperties::derive(&facts, &settings);

    let selector = DialogueSelector::new(services.settings.clone());
    let mut phrases = Vec::new();
    phrases.extend(selector.select(&properties.current));
    if settings.say_future_prediction {
        phrases.extend(selector.select(&properties.future));
    }

    for phrase in &phrases {
        tokio::time::timeout(
            step_timeout,
            services
                .cache
                .ensure(&phrase.file_id, ArtifactKind::Generated, &phrase.text),
        )
        .await
        .map_err(|_| Error::Tts(format!("generation of {} timed out", phrase.file_id)))??;
    }

    Ok(phrases.len())
}

/// Run `task` every period published on `period`, restarting when it changes
///
/// The first tick is skipped. `None` or a zero period pauses the loop until
/// a usable period is published.
pub fn spawn_interval<P, F, Fut>(
    name: &'static str,
    mut period: watch::Receiver<P>,
    task: F,
) -> JoinHandle<()>
where
    P: Copy + Into<Option<Duration>> + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            let current: Option<Duration> = (*period.borrow_and_update()).into();

            let Some(every) = current.filter(|d| !d.is_zero()) else {
                tracing::info!(name, "interval disabled");
                if period.changed().await.is_err() {
                    break;
                }
                continue;
            };

            tracing::info!(name, secs = every.as_secs(), "interval started");
            let mut interval = tokio::time::interval(every);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => task().await,
                    changed = period.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        tracing::info!(name, "interval changed, restarting");
                        break;
                    }
                }
            }
        }
    })
}
