//! Azure Cognitive Services text-to-speech

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::SpeechSynthesizer;
use crate::settings::VoiceParams;
use crate::{Error, Result};

/// Output format requested from the service; matches the playback rate
const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

/// Synthesizes speech through the Azure REST endpoint
pub struct AzureSpeech {
    client: reqwest::Client,
    key: SecretString,
    endpoint: String,
}

impl AzureSpeech {
    /// Create a client for `region` (e.g. "westus2")
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty or the HTTP client cannot be built
    pub fn new(key: SecretString, region: &str, timeout: Duration) -> Result<Self> {
        if key.expose_secret().is_empty() {
            return Err(Error::Config("speech key required for TTS".to_string()));
        }

        let endpoint = format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1");
        Self::with_endpoint(key, endpoint, timeout)
    }

    /// Create a client against an explicit endpoint URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_endpoint(key: SecretString, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("raincheck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            key,
            endpoint,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>> {
        let ssml = build_ssml(text, voice);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", self.key.expose_secret())
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Azure TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Tts("Azure TTS returned no audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), speaker = %voice.speaker, "synthesized speech");
        Ok(audio.to_vec())
    }
}

/// Build the SSML document for one utterance
fn build_ssml(text: &str, voice: &VoiceParams) -> String {
    let mut ssml = String::from(
        r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xmlns:mstts="https://www.w3.org/2001/mstts" xml:lang="en-US">"#,
    );

    let _ = write!(ssml, r#"<voice name="{}">"#, escape_xml(&voice.speaker));
    if let Some(style) = &voice.style {
        let _ = write!(ssml, r#"<mstts:express-as style="{}">"#, escape_xml(style));
    }
    let _ = write!(
        ssml,
        r#"<prosody pitch="{}" rate="{}">{}</prosody>"#,
        escape_xml(&voice.pitch),
        voice.rate,
        escape_xml(text)
    );
    if voice.style.is_some() {
        ssml.push_str("</mstts:express-as>");
    }
    ssml.push_str("</voice></speak>");

    ssml
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
