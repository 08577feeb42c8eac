//! Speech synthesis
//!
//! The cache only needs "text plus voice in, audio bytes out"; the Azure
//! backend is the one used on the device.

mod azure;

use async_trait::async_trait;

use crate::Result;
use crate::settings::VoiceParams;

pub use azure::AzureSpeech;

/// Renders text to audio bytes
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`
    ///
    /// Returns a complete audio file (WAV or MP3)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or times out
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>>;
}
