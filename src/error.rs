//! Error types for raincheck

use thiserror::Error;

/// Result type alias for raincheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in raincheck
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio decode or output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Weather service error
    #[error("weather error: {0}")]
    Weather(String),

    /// Remote settings service error
    #[error("sync error: {0}")]
    Sync(String),

    /// Artifact file id is not a plain file name
    #[error("invalid audio file id: {0}")]
    InvalidFileId(String),

    /// A required artifact is not on disk
    #[error("audio artifact not found: {0}")]
    ArtifactMissing(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
