//! Request orchestration
//!
//! One button press runs the whole pipeline: connectivity check, weather
//! fetch, property derivation, dialogue selection, audio generation and
//! playback. Any failing step drops into the failure ladder, which plays the
//! most specific internal phrase that is actually on disk.
//!
//! At most one run is in flight. A trigger that arrives while a run is in
//! progress is rejected rather than queued or cancelling the current run.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;

use crate::audio::{ArtifactKind, AudioCache, InternalPhrase, PlaybackItem, PlaybackQueue, PurgeScope};
use crate::connectivity::ConnectivityCheck;
use crate::dialogue::{DialogueSelector, PhraseRecord, describe};
use crate::oplog::OperationalLog;
use crate::settings::{EffectiveSettings, SettingsCascade};
use crate::weather::{WeatherProperties, WeatherSource};

/// Default bound on each collaborator call
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a run failed, with the stable code written to the operational log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u8)]
pub enum RuntimeError {
    #[error("no internet connection")]
    NoInternet = 0,

    #[error("no weather data")]
    NoWeatherData = 1,

    #[error("no phrase matches the current weather")]
    NoCurrentMatch = 2,

    #[error("no phrase matches the next-hour forecast")]
    NoFutureMatch = 3,

    #[error("failed to generate audio for the selected phrases")]
    GenerationFailed = 4,
}

impl RuntimeError {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    CheckingConnectivity,
    FetchingWeather,
    DerivingProperties,
    SelectingDialogue,
    EnsuringAudio,
    Enqueued,
    Failed(RuntimeError),
    Resetting,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CheckingConnectivity => f.write_str("checking-connectivity"),
            Self::FetchingWeather => f.write_str("fetching-weather"),
            Self::DerivingProperties => f.write_str("deriving-properties"),
            Self::SelectingDialogue => f.write_str("selecting-dialogue"),
            Self::EnsuringAudio => f.write_str("ensuring-audio"),
            Self::Enqueued => f.write_str("enqueued"),
            Self::Failed(reason) => write!(f, "failed({})", reason.code()),
            Self::Resetting => f.write_str("resetting"),
        }
    }
}

/// How a trigger was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The pipeline ran to completion
    Completed,
    /// Another run was in flight; nothing happened
    Rejected,
    /// The pipeline failed and the failure ladder ran
    Failed(RuntimeError),
}

/// Collaborators shared by the orchestrator and the background tasks
#[derive(Clone)]
pub struct Services {
    pub settings: SettingsCascade,
    pub cache: Arc<AudioCache>,
    pub queue: PlaybackQueue,
    pub weather: Arc<dyn WeatherSource>,
    pub connectivity: Arc<dyn ConnectivityCheck>,
    pub log: OperationalLog,
}

/// Clears the in-flight flag however the run ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The request state machine
pub struct Orchestrator {
    services: Services,
    selector: DialogueSelector,
    step_timeout: Duration,
    in_flight: AtomicBool,
    phase: watch::Sender<RequestPhase>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self::with_step_timeout(services, DEFAULT_STEP_TIMEOUT)
    }

    /// Create an orchestrator bounding each collaborator call by `step_timeout`
    #[must_use]
    pub fn with_step_timeout(services: Services, step_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(RequestPhase::Idle);
        Self {
            selector: DialogueSelector::new(services.settings.clone()),
            services,
            step_timeout,
            in_flight: AtomicBool::new(false),
            phase,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RequestPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestPhase> {
        self.phase.subscribe()
    }

    /// Whether a run or reset is in progress
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Handle one "is it raining" trigger
    pub async fn run(&self) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::info!(phase = %self.phase(), "request already in flight, ignoring trigger");
            return RunOutcome::Rejected;
        };

        let settings = self.services.settings.resolve();
        tracing::info!("request started");

        let outcome = match self.pipeline(&settings).await {
            Ok(()) => {
                tracing::info!("request finished");
                RunOutcome::Completed
            }
            Err(reason) => {
                self.set_phase(RequestPhase::Failed(reason));
                self.fail_state(reason, settings.wait_for_playback).await;
                RunOutcome::Failed(reason)
            }
        };

        self.set_phase(RequestPhase::Idle);
        outcome
    }

    /// Wipe all audio, re-render the internal phrases and confirm out loud
    ///
    /// Shares the in-flight guard with [`run`](Self::run).
    pub async fn secret_reset(&self) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::info!(phase = %self.phase(), "busy, ignoring secret reset");
            return RunOutcome::Rejected;
        };

        self.set_phase(RequestPhase::Resetting);
        tracing::warn!("secret reset requested");
        self.services.log.record("runtime", "Secret reset").await;

        let cache = &self.services.cache;
        if let Err(e) = cache.purge(PurgeScope::Both) {
            tracing::error!(error = %e, "failed to purge audio during reset");
        }

        let failed = cache.prepare_internal_phrases().await;
        if failed > 0 {
            tracing::warn!(failed, "some internal phrases could not be rendered");
        }

        let wait = self.services.settings.resolve().wait_for_playback;
        if !self.play_internal(InternalPhrase::SecretReset, wait).await {
            tracing::warn!("secret reset phrase unavailable");
        }

        self.set_phase(RequestPhase::Idle);
        RunOutcome::Completed
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    fn set_phase(&self, phase: RequestPhase) {
        tracing::debug!(%phase, "request phase");
        self.phase.send_replace(phase);
    }

    async fn pipeline(&self, settings: &EffectiveSettings) -> Result<(), RuntimeError> {
        let services = &self.services;

        self.set_phase(RequestPhase::CheckingConnectivity);
        let online = tokio::time::timeout(
            self.step_timeout,
            services.connectivity.is_reachable(&settings.connectivity_check_url),
        )
        .await
        .unwrap_or(false);
        if !online {
            return Err(RuntimeError::NoInternet);
        }

        self.set_phase(RequestPhase::FetchingWeather);
        let facts = match tokio::time::timeout(
            self.step_timeout,
            services.weather.fetch(&settings.location),
        )
        .await
        {
            Ok(Ok(facts)) => facts,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "weather fetch failed");
                return Err(RuntimeError::NoWeatherData);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.step_timeout, "weather fetch timed out");
                return Err(RuntimeError::NoWeatherData);
            }
        };

        self.set_phase(RequestPhase::DerivingProperties);
        let properties = WeatherProperties::derive(&facts, settings);
        tracing::debug!(
            current = %describe(&properties.current),
            future = %describe(&properties.future),
            "derived properties"
        );

        self.set_phase(RequestPhase::SelectingDialogue);
        let phrases = self.select_phrases(&properties, settings)?;

        self.set_phase(RequestPhase::EnsuringAudio);
        self.ensure_all(&phrases).await?;

        self.set_phase(RequestPhase::Enqueued);
        for phrase in &phrases {
            services
                .queue
                .enqueue(PlaybackItem::new(&phrase.file_id, ArtifactKind::Generated));
        }

        if settings.wait_for_playback {
            services.queue.wait_until_idle().await;
        }

        Ok(())
    }

    /// Pick the current phrase and, if wanted, the next-hour phrase
    fn select_phrases(
        &self,
        properties: &WeatherProperties,
        settings: &EffectiveSettings,
    ) -> Result<Vec<PhraseRecord>, RuntimeError> {
        let current = self
            .selector
            .select(&properties.current)
            .ok_or(RuntimeError::NoCurrentMatch)?;
        tracing::info!(file_id = %current.file_id, "selected current phrase");

        let mut phrases = vec![current];
        if !settings.say_future_prediction {
            return Ok(phrases);
        }

        match self.selector.select(&properties.future) {
            Some(future) if !phrases[0].is_raining() && !future.is_raining() => {
                tracing::debug!(file_id = %future.file_id, "no rain now or next hour, skipping future phrase");
            }
            Some(future) => {
                tracing::info!(file_id = %future.file_id, "selected future phrase");
                phrases.push(future);
            }
            None if settings.fail_on_no_future => return Err(RuntimeError::NoFutureMatch),
            None => tracing::warn!("no phrase for the next-hour forecast, continuing"),
        }

        Ok(phrases)
    }

    async fn ensure_all(&self, phrases: &[PhraseRecord]) -> Result<(), RuntimeError> {
        let cache = &self.services.cache;
        let results = join_all(phrases.iter().map(|phrase| {
            tokio::time::timeout(
                self.step_timeout,
                cache.ensure(&phrase.file_id, ArtifactKind::Generated, &phrase.text),
            )
        }))
        .await;

        let mut failed = false;
        for (phrase, result) in phrases.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(file_id = %phrase.file_id, error = %e, "audio generation failed");
                    failed = true;
                }
                Err(_) => {
                    tracing::warn!(file_id = %phrase.file_id, "audio generation timed out");
                    failed = true;
                }
            }
        }

        if failed {
            Err(RuntimeError::GenerationFailed)
        } else {
            Ok(())
        }
    }

    async fn fail_state(&self, reason: RuntimeError, wait: bool) {
        tracing::error!(code = reason.code(), %reason, "request failed");
        self.services
            .log
            .record("runtime", &format!("Runtime Error: {}", reason.code()))
            .await;

        let specific = match reason {
            RuntimeError::NoInternet => Some(InternalPhrase::NoInternet),
            RuntimeError::NoCurrentMatch => Some(InternalPhrase::UnknownWeather),
            _ => None,
        };

        for phrase in specific.into_iter().chain([InternalPhrase::RandomError]) {
            if self.play_internal(phrase, wait).await {
                return;
            }
            tracing::warn!(file_id = phrase.file_id(), "internal phrase missing, falling back");
        }

        tracing::error!("no internal phrase available to report the failure");
    }

    /// Enqueue an internal phrase if its artifact exists
    async fn play_internal(&self, phrase: InternalPhrase, wait: bool) -> bool {
        let services = &self.services;
        if !services
            .cache
            .exists_with_override(phrase.file_id(), ArtifactKind::Internal, true)
        {
            return false;
        }

        services.queue.enqueue(PlaybackItem::internal(phrase));
        if wait {
            services.queue.wait_until_idle().await;
        }
        true
    }
}
