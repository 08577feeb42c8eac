//! Client for the "is it raining" weather service

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{WeatherFacts, WeatherSource};
use crate::settings::LocationSpec;
use crate::{Error, Result};

/// Default service root
pub const DEFAULT_IIT_URL: &str = "https://isitraining.beamacdonald.ca";

/// Fetches weather facts over HTTP
pub struct IitClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl IitClient {
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

    fn url_for(&self, location: &LocationSpec) -> String {
        match location {
            LocationSpec::LatLng([lat, lng]) => format!(
                "{}/latlng/{}/{lat},{lng}",
                self.base_url,
                urlencoding::encode(self.token.expose_secret())
            ),
            LocationSpec::Query(query) => {
                format!("{}/location/{}", self.base_url, urlencoding::encode(query))
            }
        }
    }
}

#[async_trait]
impl WeatherSource for IitClient {
    async fn fetch(&self, location: &LocationSpec) -> Result<WeatherFacts> {
        let response = self.client.get(self.url_for(location)).send().await?;

        if !response.status().is_success() {
            return Err(Error::Weather(format!(
                "weather service returned {}",
                response.status()
            )));
        }

        let facts: WeatherFacts = response.json().await?;
        tracing::debug!(
            raining = facts.is_raining_now,
            feel_c = facts.temp_feel_c,
            wind_kph = facts.wind_now_kph,
            from_cache = facts.from_cache,
            "weather fetched"
        );
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IitClient {
        IitClient::new(
            "https://weather.test/",
            SecretString::from("tok en".to_string()),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_latlng_url_carries_token() {
        let url = client().url_for(&LocationSpec::LatLng([49.2585, -123.25064]));
        assert_eq!(url, "https://weather.test/latlng/tok%20en/49.2585,-123.25064");
    }

    #[test]
    fn test_location_url_is_encoded() {
        let url = client().url_for(&LocationSpec::Query("Vancouver, BC".to_string()));
        assert_eq!(url, "https://weather.test/location/Vancouver%2C%20BC");
    }
}
