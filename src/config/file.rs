//! TOML configuration file loading
//!
//! Supports `~/.config/raincheck/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//!
//! ```toml
//! [auth]
//! iit_token = "..."
//! mother_token = "..."
//! speech_key = "..."
//! speech_region = "westus2"
//!
//! [service]
//! request_timeout_secs = 10
//!
//! [fallback_settings]
//! savePreviousAudioFiles = true
//! coldFeelThreshold_c = 4
//! location = { type = "location", value = "Vancouver" }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::settings::SettingsLayer;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RaincheckConfigFile {
    /// Service credentials
    #[serde(default)]
    pub auth: AuthFileConfig,

    /// Endpoints, storage and timing
    #[serde(default)]
    pub service: ServiceFileConfig,

    /// Local fallback settings tier (same keys as the remote settings JSON)
    #[serde(default)]
    pub fallback_settings: SettingsLayer,
}

/// Credentials for the remote services
#[derive(Debug, Default, Deserialize)]
pub struct AuthFileConfig {
    pub iit_token: Option<String>,
    pub mother_token: Option<String>,
    pub speech_key: Option<String>,
    pub speech_region: Option<String>,
}

/// Service endpoints and runtime knobs
#[derive(Debug, Default, Deserialize)]
pub struct ServiceFileConfig {
    /// Weather service root URL
    pub iit_url: Option<String>,

    /// Remote settings service root URL
    pub mother_url: Option<String>,

    /// Directory for snapshots, audio and the operational log
    pub data_dir: Option<PathBuf>,

    /// Bound on each weather, speech and connectivity call
    pub request_timeout_secs: Option<u64>,

    /// Bound on each remote settings call
    pub sync_timeout_secs: Option<u64>,

    /// A successful settings download also counts as a check-in
    pub download_also_checks_in: Option<bool>,

    /// Volume knob position at startup (0 to 10)
    pub initial_volume: Option<u8>,
}

/// Load the TOML config file from `path`, or the standard path if `None`
///
/// A missing or unparsable file at the standard path yields defaults; an
/// explicitly requested file must exist and parse.
///
/// # Errors
///
/// Returns error if an explicit `path` cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<RaincheckConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(RaincheckConfigFile::default());
    };

    if !path.exists() {
        return Ok(RaincheckConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RaincheckConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RaincheckConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/raincheck/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("raincheck").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LocationSpec;

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            [auth]
            iit_token = "iit"
            mother_token = "mother"

            [service]
            request_timeout_secs = 7
            download_also_checks_in = false

            [fallback_settings]
            savePreviousAudioFiles = false
            coldFeelThreshold_c = 2.5
            location = { type = "location", value = "Vancouver" }
            dialogueSpeed = 1.0

            [fallback_settings.voice]
            pitch = "-5%"
        "#;

        let config: RaincheckConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.iit_token.as_deref(), Some("iit"));
        assert!(config.auth.speech_key.is_none());
        assert_eq!(config.service.request_timeout_secs, Some(7));
        assert_eq!(config.service.download_also_checks_in, Some(false));
        assert_eq!(config.fallback_settings.save_previous_audio_files, Some(false));
        assert_eq!(config.fallback_settings.cold_feel_threshold_c, Some(2.5));
        assert_eq!(
            config.fallback_settings.location,
            Some(LocationSpec::Query("Vancouver".to_string()))
        );
        assert_eq!(config.fallback_settings.dialogue_speed, Some(1.0));
        assert_eq!(
            config
                .fallback_settings
                .voice
                .as_ref()
                .and_then(|v| v.pitch.as_deref()),
            Some("-5%")
        );
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_file(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[auth]\nspeech_region = \"westus\"\n").unwrap();

        let config = load_config_file(Some(&path)).unwrap();
        assert_eq!(config.auth.speech_region.as_deref(), Some("westus"));
    }
}
