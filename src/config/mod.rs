//! Process configuration
//!
//! Layered env > TOML file > default. Only credentials are required; anything
//! else has a working default.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::audio::MAX_VOLUME;
use crate::settings::SettingsLayer;
use crate::sync::{DEFAULT_MOTHER_URL, DEFAULT_SYNC_TIMEOUT};
use crate::weather::DEFAULT_IIT_URL;
use crate::{Error, Result};

pub use file::{RaincheckConfigFile, config_file_path, load_config_file};

/// Default bound on weather, speech and connectivity calls
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// raincheck configuration
#[derive(Debug)]
pub struct Config {
    /// Service credentials
    pub auth: AuthConfig,

    /// Endpoints, storage and timing
    pub service: ServiceConfig,

    /// Local fallback settings tier
    pub fallback_settings: SettingsLayer,
}

/// Credentials for the remote services
#[derive(Debug)]
pub struct AuthConfig {
    /// Weather service token
    pub iit_token: SecretString,

    /// Remote settings service token
    pub mother_token: SecretString,

    /// Speech synthesis subscription key
    pub speech_key: SecretString,

    /// Speech synthesis region (e.g. "westus2")
    pub speech_region: String,
}

/// Service endpoints and runtime knobs
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub iit_url: String,
    pub mother_url: String,

    /// Snapshots, operational log and `audio/` live here
    pub data_dir: PathBuf,

    pub request_timeout: Duration,
    pub sync_timeout: Duration,

    /// A successful settings download also counts as a check-in
    pub download_also_checks_in: bool,

    /// Volume knob position at startup
    pub initial_volume: u8,
}

impl ServiceConfig {
    /// Root of the audio cache
    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is unusable or a credential is missing
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming every missing credential
    pub fn from_sources(
        fc: RaincheckConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let nonempty = |s: String| (!s.trim().is_empty()).then_some(s);

        // Credentials (env > toml), all required
        let iit_token = env("RAINCHECK_IIT_TOKEN").or(fc.auth.iit_token).and_then(nonempty);
        let mother_token = env("RAINCHECK_MOTHER_TOKEN")
            .or(fc.auth.mother_token)
            .and_then(nonempty);
        let speech_key = env("RAINCHECK_SPEECH_KEY")
            .or(fc.auth.speech_key)
            .and_then(nonempty);
        let speech_region = env("RAINCHECK_SPEECH_REGION")
            .or(fc.auth.speech_region)
            .and_then(nonempty);

        let (Some(iit_token), Some(mother_token), Some(speech_key), Some(speech_region)) =
            (iit_token.clone(), mother_token.clone(), speech_key.clone(), speech_region.clone())
        else {
            let missing: Vec<&str> = [
                ("iit_token", iit_token.is_none()),
                ("mother_token", mother_token.is_none()),
                ("speech_key", speech_key.is_none()),
                ("speech_region", speech_region.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            return Err(Error::Config(format!(
                "missing required auth fields: {}",
                missing.join(", ")
            )));
        };

        let auth = AuthConfig {
            iit_token: SecretString::from(iit_token),
            mother_token: SecretString::from(mother_token),
            speech_key: SecretString::from(speech_key),
            speech_region,
        };

        // Service config (env > toml > default)
        let data_dir = env("RAINCHECK_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.service.data_dir)
            .unwrap_or_else(default_data_dir);

        let request_timeout = env("RAINCHECK_REQUEST_TIMEOUT")
            .and_then(|s| s.parse().ok())
            .or(fc.service.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let service = ServiceConfig {
            iit_url: env("RAINCHECK_IIT_URL")
                .or(fc.service.iit_url)
                .unwrap_or_else(|| DEFAULT_IIT_URL.to_string()),
            mother_url: env("RAINCHECK_MOTHER_URL")
                .or(fc.service.mother_url)
                .unwrap_or_else(|| DEFAULT_MOTHER_URL.to_string()),
            data_dir,
            request_timeout: Duration::from_secs(request_timeout.max(1)),
            sync_timeout: fc
                .service
                .sync_timeout_secs
                .map_or(DEFAULT_SYNC_TIMEOUT, |s| Duration::from_secs(s.max(1))),
            download_also_checks_in: fc.service.download_also_checks_in.unwrap_or(true),
            initial_volume: fc
                .service
                .initial_volume
                .unwrap_or(MAX_VOLUME)
                .min(MAX_VOLUME),
        };

        Ok(Self {
            auth,
            service,
            fallback_settings: fc.fallback_settings,
        })
    }
}

/// `~/.local/share/raincheck` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("data"), |d| d.data_dir().join("raincheck"))
}
