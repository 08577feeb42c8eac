//! Audio artifacts, their on-disk cache, and ordered playback

mod cache;
mod playback;
mod queue;

use std::fmt;

use crate::settings::InternalPhrases;

pub use cache::{AudioCache, PurgeScope};
pub use playback::{CpalSink, MAX_VOLUME, NullSink, Volume, decode_audio};
pub use queue::{AudioSink, DEFAULT_TRAILING_DELAY, PlaybackQueue};

/// Which storage namespace an artifact lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Long-lived system phrases
    Internal,
    /// Weather phrase renders; subject to the persist policy and invalidation
    Generated,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::Generated => f.write_str("generated"),
        }
    }
}

/// A unit of work for the playback queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackItem {
    pub file_id: String,
    pub kind: ArtifactKind,
}

impl PlaybackItem {
    #[must_use]
    pub fn new(file_id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            file_id: file_id.into(),
            kind,
        }
    }

    #[must_use]
    pub fn internal(phrase: InternalPhrase) -> Self {
        Self::new(phrase.file_id(), ArtifactKind::Internal)
    }
}

/// System phrases kept in the internal namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalPhrase {
    NoInternet,
    RandomError,
    UnknownWeather,
    SecretReset,
}

impl InternalPhrase {
    pub const ALL: [Self; 4] = [
        Self::NoInternet,
        Self::RandomError,
        Self::UnknownWeather,
        Self::SecretReset,
    ];

    /// File id in the internal namespace
    #[must_use]
    pub const fn file_id(self) -> &'static str {
        match self {
            Self::NoInternet => "no-internet",
            Self::RandomError => "random-error",
            Self::UnknownWeather => "unknown-weather",
            Self::SecretReset => "secret-reset",
        }
    }

    /// Configured text for this phrase
    #[must_use]
    pub fn text(self, phrases: &InternalPhrases) -> &str {
        match self {
            Self::NoInternet => &phrases.no_internet,
            Self::RandomError => &phrases.random_error,
            Self::UnknownWeather => &phrases.unknown_weather,
            Self::SecretReset => &phrases.secret_reset,
        }
    }
}
