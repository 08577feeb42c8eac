//! HTTP client for the remote settings service

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::settings::SettingsLayer;
use crate::{Error, Result};

/// Default service root
pub const DEFAULT_MOTHER_URL: &str = "https://mother.beamacdonald.ca";

/// Default timeout for remote settings calls
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Where remote settings come from
#[async_trait]
pub trait RemoteSettingsSource: Send + Sync {
    /// Download the settings published for this device
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable or has nothing for us
    async fn download(&self) -> Result<SettingsLayer>;

    /// Tell the service the device is alive
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable
    async fn check_in(&self) -> Result<()>;
}

/// Client for the remote settings service
#[derive(Clone)]
pub struct MotherClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl MotherClient {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("raincheck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{endpoint}/{}",
            self.base_url,
            urlencoding::encode(self.token.expose_secret())
        )
    }
}

#[async_trait]
impl RemoteSettingsSource for MotherClient {
    async fn download(&self) -> Result<SettingsLayer> {
        let response = self.client.get(self.url("config")).send().await?;

        if !response.status().is_success() {
            return Err(Error::Sync(format!(
                "settings download returned {}",
                response.status()
            )));
        }

        let layer: SettingsLayer = response.json().await?;
        tracing::debug!(
            dialogues = layer.dialogues.as_ref().map_or(0, Vec::len),
            "remote settings downloaded"
        );
        Ok(layer)
    }

    async fn check_in(&self) -> Result<()> {
        let response = self.client.get(self.url("checkin")).send().await?;
        if !response.status().is_success() {
            return Err(Error::Sync(format!("check-in returned {}", response.status())));
        }
        Ok(())
    }
}
