//! Settings resolution
//!
//! Every field of [`EffectiveSettings`] is resolved through three tiers:
//! the settings last downloaded from the remote service, the local fallback
//! settings, and the compiled-in defaults. Defaults are total, so resolution
//! cannot fail.

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialogue::{PhraseRecord, Property};

pub use store::SettingsStore;

/// Voice parameters passed to speech synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// Synthesis voice name (e.g. "en-US-JennyNeural")
    pub speaker: String,

    /// Relative pitch (e.g. "+0%", "-5%", "high")
    pub pitch: String,

    /// Speaking rate multiplier
    pub rate: f32,

    /// Speaking style (e.g. "cheerful")
    pub style: Option<String>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speaker: "en-US-JennyNeural".to_string(),
            pitch: "+0%".to_string(),
            rate: 1.2,
            style: None,
        }
    }
}

/// One tier's voice overrides; each parameter resolves on its own
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,

    #[serde(default, alias = "dialogueSpeed", skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Where to ask about the weather
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum LocationSpec {
    /// Latitude and longitude in degrees
    #[serde(rename = "latlng")]
    LatLng([f64; 2]),

    /// Free-form place name resolved by the weather service
    #[serde(rename = "location")]
    Query(String),
}

impl Default for LocationSpec {
    fn default() -> Self {
        Self::LatLng([49.258_500, -123.250_640])
    }
}

/// Texts for the long-lived system phrases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternalPhrases {
    pub no_internet: String,
    pub random_error: String,
    pub unknown_weather: String,
    pub secret_reset: String,
}

impl Default for InternalPhrases {
    fn default() -> Self {
        Self {
            no_internet: "I can't reach the internet right now, so I don't know if it's raining."
                .to_string(),
            random_error: "Something went wrong while checking the weather. Please try again."
                .to_string(),
            unknown_weather: "I'm not sure how to describe the weather right now.".to_string(),
            secret_reset: "All of my saved voice lines have been cleared.".to_string(),
        }
    }
}

/// One tier of settings; every field is optional
///
/// This is both the remote JSON schema and the `[fallback_settings]` table
/// of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogues: Option<Vec<PhraseRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceLayer>,

    /// Speaking rate at the top level, as older payloads send it;
    /// `voice.rate` in the same tier wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_speed: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_previous_audio_files: Option<bool>,

    #[serde(
        default,
        rename = "coldFeelThreshold_c",
        skip_serializing_if = "Option::is_none"
    )]
    pub cold_feel_threshold_c: Option<f64>,

    #[serde(
        default,
        rename = "windThreshold_kph",
        skip_serializing_if = "Option::is_none"
    )]
    pub wind_threshold_kph: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub say_future_prediction: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_no_future: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_playback: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_check_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_sync_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_poll_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_phrases: Option<InternalPhrases>,
}

/// Fully resolved settings snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    /// Phrase catalog
    pub dialogues: Vec<PhraseRecord>,

    /// Voice used for generated and internal audio
    pub voice: VoiceParams,

    /// Weather location
    pub location: LocationSpec,

    /// Keep generated audio between requests
    pub save_previous_audio_files: bool,

    /// Feels-like temperature at or below which it counts as cold
    pub cold_feel_threshold_c: f64,

    /// Wind speed at or above which it counts as windy
    pub wind_threshold_kph: f64,

    /// Also speak the next-hour forecast
    pub say_future_prediction: bool,

    /// Treat a missing next-hour phrase as a failed request
    pub fail_on_no_future: bool,

    /// Hold the request open until playback has drained
    pub wait_for_playback: bool,

    /// Target of the connectivity check
    pub connectivity_check_url: String,

    /// Remote settings sync period
    pub settings_sync_interval_secs: u64,

    /// Background knowledge refresh period, 0 disables it
    pub weather_poll_interval_secs: u64,

    /// Texts for the internal system phrases
    pub internal_phrases: InternalPhrases,
}

impl EffectiveSettings {
    /// Remote settings sync period
    #[must_use]
    pub const fn settings_sync_interval(&self) -> Duration {
        Duration::from_secs(self.settings_sync_interval_secs)
    }

    /// Background knowledge refresh period, `None` when disabled
    #[must_use]
    pub const fn weather_poll_interval(&self) -> Option<Duration> {
        if self.weather_poll_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.weather_poll_interval_secs))
        }
    }
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            dialogues: default_dialogues(),
            voice: VoiceParams::default(),
            location: LocationSpec::default(),
            save_previous_audio_files: true,
            cold_feel_threshold_c: 5.0,
            wind_threshold_kph: 35.0,
            say_future_prediction: true,
            fail_on_no_future: false,
            wait_for_playback: true,
            connectivity_check_url: "https://www.google.com/generate_204".to_string(),
            settings_sync_interval_secs: 300,
            weather_poll_interval_secs: 900,
            internal_phrases: InternalPhrases::default(),
        }
    }
}

/// Built-in phrase catalog used when neither remote nor local settings carry one
#[must_use]
pub fn default_dialogues() -> Vec<PhraseRecord> {
    use Property::{Cold, Future, Raining, RecentlyAsked, Wildcard, Windy};

    vec![
        PhraseRecord::new("No, it's not raining right now.", "clear", []),
        PhraseRecord::new("Yes, it's raining right now.", "raining", [Raining]),
        PhraseRecord::new(
            "It's raining and windy, so hold on to your umbrella.",
            "raining-windy",
            [Raining, Windy],
        ),
        PhraseRecord::new(
            "It's raining, and it's cold out there too.",
            "raining-cold",
            [Raining, Cold],
        ),
        PhraseRecord::new(
            "It's not raining, but it is cold. Bring a jacket.",
            "cold",
            [Cold],
        ),
        PhraseRecord::new("It's not raining, but it's pretty windy.", "windy", [Windy]),
        PhraseRecord::new(
            "Just like last time you asked, it's not raining.",
            "recent-clear",
            [RecentlyAsked],
        ),
        PhraseRecord::new(
            "Just like last time you asked, it's still raining.",
            "recent-raining",
            [RecentlyAsked, Raining],
        ),
        PhraseRecord::new(
            "It should stay dry for the next hour.",
            "future-clear",
            [Future],
        ),
        PhraseRecord::new(
            "You should bring your umbrella though, it might be raining in an hour.",
            "future-raining",
            [Future, Raining],
        ),
        PhraseRecord::new(
            "I'm not quite sure what the weather is doing right now.",
            "wildcard",
            [Wildcard],
        ),
        PhraseRecord::new(
            "I can't tell what the next hour will bring.",
            "future-wildcard",
            [Future, Wildcard],
        ),
    ]
}

/// Take a field from the remote tier, else the local tier, else `default`
fn pick<T: Clone>(
    remote: Option<&SettingsLayer>,
    local: &SettingsLayer,
    field: impl Fn(&SettingsLayer) -> &Option<T>,
    default: T,
) -> T {
    remote
        .and_then(|r| field(r).clone())
        .or_else(|| field(local).clone())
        .unwrap_or(default)
}

/// Take a value from the first tier that sets it
fn first_set<T>(
    remote: Option<&SettingsLayer>,
    local: &SettingsLayer,
    field: impl Fn(&SettingsLayer) -> Option<T>,
) -> Option<T> {
    remote.and_then(&field).or_else(|| field(local))
}

/// Resolve each voice parameter through remote, local and `default`
fn resolve_voice(
    remote: Option<&SettingsLayer>,
    local: &SettingsLayer,
    default: VoiceParams,
) -> VoiceParams {
    VoiceParams {
        speaker: first_set(remote, local, |l| l.voice.as_ref()?.speaker.clone())
            .unwrap_or(default.speaker),
        pitch: first_set(remote, local, |l| l.voice.as_ref()?.pitch.clone())
            .unwrap_or(default.pitch),
        rate: first_set(remote, local, |l| {
            l.voice.as_ref().and_then(|v| v.rate).or(l.dialogue_speed)
        })
        .unwrap_or(default.rate),
        style: first_set(remote, local, |l| l.voice.as_ref()?.style.clone()).or(default.style),
    }
}

/// Resolve every field through remote, local and compiled defaults
#[must_use]
pub fn resolve_layers(remote: Option<&SettingsLayer>, local: &SettingsLayer) -> EffectiveSettings {
    let d = EffectiveSettings::default();

    EffectiveSettings {
        dialogues: pick(remote, local, |l| &l.dialogues, d.dialogues),
        voice: resolve_voice(remote, local, d.voice),
        location: pick(remote, local, |l| &l.location, d.location),
        save_previous_audio_files: pick(
            remote,
            local,
            |l| &l.save_previous_audio_files,
            d.save_previous_audio_files,
        ),
        cold_feel_threshold_c: pick(
            remote,
            local,
            |l| &l.cold_feel_threshold_c,
            d.cold_feel_threshold_c,
        ),
        wind_threshold_kph: pick(remote, local, |l| &l.wind_threshold_kph, d.wind_threshold_kph),
        say_future_prediction: pick(
            remote,
            local,
            |l| &l.say_future_prediction,
            d.say_future_prediction,
        ),
        fail_on_no_future: pick(remote, local, |l| &l.fail_on_no_future, d.fail_on_no_future),
        wait_for_playback: pick(remote, local, |l| &l.wait_for_playback, d.wait_for_playback),
        connectivity_check_url: pick(
            remote,
            local,
            |l| &l.connectivity_check_url,
            d.connectivity_check_url,
        ),
        settings_sync_interval_secs: pick(
            remote,
            local,
            |l| &l.settings_sync_interval_secs,
            d.settings_sync_interval_secs,
        ),
        weather_poll_interval_secs: pick(
            remote,
            local,
            |l| &l.weather_poll_interval_secs,
            d.weather_poll_interval_secs,
        ),
        internal_phrases: pick(remote, local, |l| &l.internal_phrases, d.internal_phrases),
    }
}

/// Read-through view over the settings store
///
/// Holds no cache of its own; each [`resolve`](Self::resolve) reflects the
/// latest remote download.
#[derive(Clone)]
pub struct SettingsCascade {
    store: Arc<SettingsStore>,
}

impl SettingsCascade {
    /// Create a cascade over `store`
    #[must_use]
    pub const fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }

    /// Resolve the effective settings as of now
    #[must_use]
    pub fn resolve(&self) -> EffectiveSettings {
        let remote = self.store.remote();
        let local = self.store.local();
        resolve_layers(remote.as_ref(), &local)
    }

    /// Underlying store, for the sync controller
    #[must_use]
    pub const fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_tier_has_value() {
        let settings = resolve_layers(None, &SettingsLayer::default());
        assert_eq!(settings, EffectiveSettings::default());
        assert!(!settings.dialogues.is_empty());
    }

    #[test]
    fn test_local_overrides_default() {
        let local = SettingsLayer {
            cold_feel_threshold_c: Some(-2.0),
            ..Default::default()
        };

        let settings = resolve_layers(None, &local);
        assert!((settings.cold_feel_threshold_c - -2.0).abs() < f64::EPSILON);
        assert!((settings.wind_threshold_kph - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remote_overrides_local_per_field() {
        let local = SettingsLayer {
            say_future_prediction: Some(false),
            save_previous_audio_files: Some(false),
            ..Default::default()
        };
        let remote = SettingsLayer {
            say_future_prediction: Some(true),
            ..Default::default()
        };

        let settings = resolve_layers(Some(&remote), &local);
        assert!(settings.say_future_prediction);
        // Field absent remotely falls through to local, not default
        assert!(!settings.save_previous_audio_files);
    }

    #[test]
    fn test_remote_json_uses_field_names() {
        let json = r#"{
            "coldFeelThreshold_c": 3,
            "windThreshold_kph": 20.5,
            "sayFuturePrediction": false,
            "location": {"type": "location", "value": "Vancouver"},
            "voice": {"speaker": "en-GB-SoniaNeural", "dialogueSpeed": 1.0},
            "dialogues": [{"text": "wet", "properties": ["Raining"], "fileName": "wet"}]
        }"#;

        let remote: SettingsLayer = serde_json::from_str(json).unwrap();
        let settings = resolve_layers(Some(&remote), &SettingsLayer::default());

        assert!((settings.cold_feel_threshold_c - 3.0).abs() < f64::EPSILON);
        assert!(!settings.say_future_prediction);
        assert_eq!(settings.location, LocationSpec::Query("Vancouver".to_string()));
        assert_eq!(settings.voice.speaker, "en-GB-SoniaNeural");
        assert!((settings.voice.rate - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.voice.pitch, "+0%");
        assert_eq!(settings.dialogues.len(), 1);
    }

    #[test]
    fn test_voice_parameters_resolve_independently() {
        let local = SettingsLayer {
            voice: Some(VoiceLayer {
                pitch: Some("-10%".to_string()),
                style: Some("cheerful".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let remote: SettingsLayer =
            serde_json::from_str(r#"{"voice": {"speaker": "en-GB-SoniaNeural"}}"#).unwrap();

        let voice = resolve_layers(Some(&remote), &local).voice;
        assert_eq!(voice.speaker, "en-GB-SoniaNeural");
        assert_eq!(voice.pitch, "-10%");
        assert_eq!(voice.style.as_deref(), Some("cheerful"));
        assert!((voice.rate - 1.2).abs() < f32::EPSILON);

        // Same effective voice whether or not the remote restates local values
        let restated = SettingsLayer {
            voice: Some(VoiceLayer {
                speaker: Some("en-GB-SoniaNeural".to_string()),
                pitch: Some("-10%".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(resolve_layers(Some(&restated), &local).voice, voice);
    }

    #[test]
    fn test_top_level_dialogue_speed() {
        let remote: SettingsLayer = serde_json::from_str(
            r#"{
                "dialogueSpeed": 1.0,
                "location": {"type": "latlng", "value": [49.2585, -123.25064]},
                "savePreviousAudioFiles": true,
                "coldFeelThreshold_c": 5,
                "windThreshold_kph": 35,
                "sayFuturePrediction": true
            }"#,
        )
        .unwrap();
        let settings = resolve_layers(Some(&remote), &SettingsLayer::default());
        assert!((settings.voice.rate - 1.0).abs() < f32::EPSILON);

        // A remote speed outranks a local nested rate
        let local = SettingsLayer {
            voice: Some(VoiceLayer {
                rate: Some(0.8),
                ..Default::default()
            }),
            ..Default::default()
        };
        let settings = resolve_layers(Some(&remote), &local);
        assert!((settings.voice.rate - 1.0).abs() < f32::EPSILON);

        // Within one tier the nested rate wins
        let both = SettingsLayer {
            voice: Some(VoiceLayer {
                rate: Some(1.5),
                ..Default::default()
            }),
            dialogue_speed: Some(0.9),
            ..Default::default()
        };
        let settings = resolve_layers(None, &both);
        assert!((settings.voice.rate - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_poll_interval_zero_disables() {
        let local = SettingsLayer {
            weather_poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(resolve_layers(None, &local).weather_poll_interval().is_none());
    }

    #[test]
    fn test_cascade_reads_fresh() {
        let store = Arc::new(SettingsStore::in_memory(SettingsLayer::default()));
        let cascade = SettingsCascade::new(Arc::clone(&store));
        assert!(cascade.resolve().say_future_prediction);

        store
            .replace_remote(SettingsLayer {
                say_future_prediction: Some(false),
                ..Default::default()
            })
            .unwrap();

        assert!(!cascade.resolve().say_future_prediction);
    }
}
