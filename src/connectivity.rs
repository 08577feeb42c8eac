//! Internet reachability check

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Answers whether the device can reach the internet
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// Whether `target` answered at all
    async fn is_reachable(&self, target: &str) -> bool;
}

/// Checks with an HTTP HEAD request; any response counts as reachable
pub struct HttpConnectivityCheck {
    client: reqwest::Client,
}

impl HttpConnectivityCheck {
    /// Create a check whose requests give up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConnectivityCheck for HttpConnectivityCheck {
    async fn is_reachable(&self, target: &str) -> bool {
        match self.client.head(target).send().await {
            Ok(response) => {
                tracing::debug!(target, status = %response.status(), "connectivity ok");
                true
            }
            Err(e) => {
                tracing::debug!(target, error = %e, "connectivity check failed");
                false
            }
        }
    }
}
