//! raincheck - a voice appliance that tells you whether it is raining
//!
//! This library provides the speech response pipeline behind the button:
//! - Settings resolution across remote, local and built-in tiers
//! - Dialogue selection from weather properties
//! - Generated audio caching with invalidation
//! - Ordered, non-overlapping playback
//! - Request orchestration with a failure ladder
//! - Remote settings sync
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Triggers                         │
//! │        Button  │  Volume knob  │  Secret reset       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Orchestrator                       │
//! │  Connectivity │ Weather │ Selector │ Cache │ Queue   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Settings Cascade                       │
//! │     Remote (sync)  │  Local fallback  │  Defaults    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod connectivity;
pub mod daemon;
pub mod dialogue;
pub mod error;
pub mod oplog;
pub mod orchestrator;
pub mod settings;
pub mod speech;
pub mod sync;
pub mod trigger;
pub mod weather;

pub use audio::{
    ArtifactKind, AudioCache, AudioSink, InternalPhrase, PlaybackItem, PlaybackQueue, PurgeScope,
    Volume,
};
pub use config::Config;
pub use connectivity::{ConnectivityCheck, HttpConnectivityCheck};
pub use daemon::Daemon;
pub use dialogue::{DialogueSelector, PhraseRecord, Property};
pub use error::{Error, Result};
pub use oplog::OperationalLog;
pub use orchestrator::{Orchestrator, RequestPhase, RunOutcome, RuntimeError, Services};
pub use settings::{EffectiveSettings, SettingsCascade, SettingsLayer, SettingsStore};
pub use speech::SpeechSynthesizer;
pub use sync::{RemoteSettingsSource, RemoteSyncController};
pub use trigger::TriggerEvent;
pub use weather::{WeatherFacts, WeatherProperties, WeatherSource};
