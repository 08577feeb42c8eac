//! Shared test utilities
//!
//! In-memory stand-ins for the network, speech service and speakers, plus a
//! harness that wires them into real settings, cache and queue instances.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use raincheck::dialogue::{PhraseRecord, Property};
use raincheck::settings::{LocationSpec, VoiceParams};
use raincheck::weather::NextHour;
use raincheck::{
    AudioCache, AudioSink, ConnectivityCheck, Error, OperationalLog, Orchestrator, PlaybackQueue,
    RemoteSettingsSource, RemoteSyncController, Result, Services, SettingsCascade, SettingsLayer,
    SettingsStore, SpeechSynthesizer, WeatherFacts, WeatherSource,
};

/// Step timeout used by test orchestrators
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Calm, mild weather with nothing interesting next hour
#[must_use]
pub fn calm() -> WeatherFacts {
    WeatherFacts {
        is_raining_now: false,
        temp_feel_c: 15.0,
        temp_real_c: 16.0,
        wind_now_kph: 5.0,
        from_cache: false,
        next_hour: NextHour {
            is_raining: false,
            wind_kph: 5.0,
        },
    }
}

/// Small catalog with exactly one best match per common case
#[must_use]
pub fn catalog() -> Vec<PhraseRecord> {
    vec![
        PhraseRecord::new("It is not raining.", "clear", []),
        PhraseRecord::new("It is raining.", "raining", [Property::Raining]),
        PhraseRecord::new("It will stay dry.", "future-clear", [Property::Future]),
        PhraseRecord::new(
            "It will rain within the hour.",
            "future-raining",
            [Property::Future, Property::Raining],
        ),
    ]
}

/// Local settings layer with the test catalog
#[must_use]
pub fn local_layer() -> SettingsLayer {
    SettingsLayer {
        dialogues: Some(catalog()),
        ..Default::default()
    }
}

/// Weather service returning whatever was last set
pub struct FakeWeather {
    facts: Mutex<Option<WeatherFacts>>,
    pub calls: AtomicUsize,
}

impl FakeWeather {
    #[must_use]
    pub fn new(facts: WeatherFacts) -> Self {
        Self {
            facts: Mutex::new(Some(facts)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer with `facts` from now on; `None` makes every fetch fail
    pub fn set(&self, facts: Option<WeatherFacts>) {
        *self.facts.lock().unwrap() = facts;
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch(&self, _location: &LocationSpec) -> Result<WeatherFacts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.facts
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Weather("service down".to_string()))
    }
}

/// Speech service that echoes text as audio bytes
///
/// Can be made to fail, or held closed so synthesis blocks until released.
pub struct FakeSynth {
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
    pub voices: Mutex<Vec<VoiceParams>>,
    fail: AtomicBool,
    gate: watch::Sender<bool>,
}

impl Default for FakeSynth {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            voices: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            gate,
        }
    }
}

impl FakeSynth {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Block synthesis until [`open`](Self::open) is called
    pub fn close(&self) {
        self.gate.send_replace(false);
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        self.voices.lock().unwrap().push(voice.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tts("synthesis unavailable".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Connectivity check with a switch
pub struct FakeConnectivity {
    online: AtomicBool,
}

impl Default for FakeConnectivity {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }
}

impl FakeConnectivity {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityCheck for FakeConnectivity {
    async fn is_reachable(&self, _target: &str) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Speakers that remember what they played
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// File ids played so far, in order
    #[must_use]
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, path: &Path) -> Result<()> {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.played.lock().unwrap().push(id);
        Ok(())
    }
}

/// Remote settings service serving a fixed layer
#[derive(Default)]
pub struct FakeRemote {
    layer: Mutex<Option<SettingsLayer>>,
    pub downloads: AtomicUsize,
    pub check_ins: AtomicUsize,
}

impl FakeRemote {
    /// Serve `layer` from now on; `None` makes downloads fail
    pub fn set(&self, layer: Option<SettingsLayer>) {
        *self.layer.lock().unwrap() = layer;
    }
}

#[async_trait]
impl RemoteSettingsSource for FakeRemote {
    async fn download(&self) -> Result<SettingsLayer> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.layer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Sync("no config for this device".to_string()))
    }

    async fn check_in(&self) -> Result<()> {
        self.check_ins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Real settings, cache and queue over fake collaborators in a temp dir
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SettingsStore>,
    pub settings: SettingsCascade,
    pub cache: Arc<AudioCache>,
    pub queue: PlaybackQueue,
    pub weather: Arc<FakeWeather>,
    pub synth: Arc<FakeSynth>,
    pub connectivity: Arc<FakeConnectivity>,
    pub sink: Arc<RecordingSink>,
    pub remote: Arc<FakeRemote>,
    pub log: OperationalLog,
}

impl Harness {
    /// Harness with the test catalog and calm weather
    #[must_use]
    pub fn new() -> Self {
        Self::with_local(local_layer())
    }

    #[must_use]
    pub fn with_local(local: SettingsLayer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");

        let store = Arc::new(SettingsStore::open(&data_dir, local).unwrap());
        let settings = SettingsCascade::new(Arc::clone(&store));
        let synth = Arc::new(FakeSynth::default());
        let cache = Arc::new(AudioCache::new(
            data_dir.join("audio"),
            settings.clone(),
            Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>,
        ));
        cache.setup_directories().unwrap();

        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::with_trailing_delay(
            Arc::clone(&cache),
            Arc::clone(&sink) as Arc<dyn AudioSink>,
            Duration::ZERO,
        );

        Self {
            store,
            settings,
            cache,
            queue,
            weather: Arc::new(FakeWeather::new(calm())),
            synth,
            connectivity: Arc::new(FakeConnectivity::default()),
            sink,
            remote: Arc::new(FakeRemote::default()),
            log: OperationalLog::in_dir(&data_dir),
            dir,
        }
    }

    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            settings: self.settings.clone(),
            cache: Arc::clone(&self.cache),
            queue: self.queue.clone(),
            weather: Arc::clone(&self.weather) as Arc<dyn WeatherSource>,
            connectivity: Arc::clone(&self.connectivity) as Arc<dyn ConnectivityCheck>,
            log: self.log.clone(),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::with_step_timeout(self.services(), STEP_TIMEOUT)
    }

    #[must_use]
    pub fn sync_controller(&self, download_also_checks_in: bool) -> RemoteSyncController {
        RemoteSyncController::new(
            Arc::clone(&self.remote) as Arc<dyn RemoteSettingsSource>,
            self.settings.clone(),
            Arc::clone(&self.cache),
            self.log.clone(),
            download_also_checks_in,
        )
    }

    /// Render the internal phrases, as boot does
    pub async fn prepare_internal(&self) {
        assert_eq!(self.cache.prepare_internal_phrases().await, 0);
    }

    #[must_use]
    pub fn played(&self) -> Vec<String> {
        self.sink.played()
    }
}
