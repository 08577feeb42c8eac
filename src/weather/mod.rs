//! Weather facts and the properties derived from them

mod iit;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::dialogue::Property;
use crate::settings::{EffectiveSettings, LocationSpec};

pub use iit::{DEFAULT_IIT_URL, IitClient};

/// Conditions reported by the weather service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherFacts {
    #[serde(rename = "isRaining")]
    pub is_raining_now: bool,

    /// Feels-like temperature
    #[serde(rename = "temperature_c_feel")]
    pub temp_feel_c: f64,

    #[serde(rename = "temperature_c_real")]
    pub temp_real_c: f64,

    #[serde(rename = "wind_kph")]
    pub wind_now_kph: f64,

    /// The service answered from its own recent cache
    #[serde(rename = "fromCache", default)]
    pub from_cache: bool,

    #[serde(rename = "nextHour")]
    pub next_hour: NextHour,
}

/// Prediction for the hour mark closest to an hour from now
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextHour {
    #[serde(rename = "isRaining")]
    pub is_raining: bool,

    pub wind_kph: f64,
}

/// Source of weather facts for a location
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch current and next-hour conditions
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable or answers badly
    async fn fetch(&self, location: &LocationSpec) -> Result<WeatherFacts>;
}

/// Properties describing now and the next hour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherProperties {
    pub current: BTreeSet<Property>,
    /// Always contains [`Property::Future`]
    pub future: BTreeSet<Property>,
}

impl WeatherProperties {
    /// Derive properties from `facts` using the configured thresholds
    #[must_use]
    pub fn derive(facts: &WeatherFacts, settings: &EffectiveSettings) -> Self {
        let mut current = BTreeSet::new();
        if facts.from_cache {
            current.insert(Property::RecentlyAsked);
        }
        if facts.is_raining_now {
            current.insert(Property::Raining);
        }
        if facts.temp_feel_c <= settings.cold_feel_threshold_c {
            current.insert(Property::Cold);
        }
        if facts.wind_now_kph >= settings.wind_threshold_kph {
            current.insert(Property::Windy);
        }

        let mut future = BTreeSet::from([Property::Future]);
        if facts.next_hour.is_raining {
            future.insert(Property::Raining);
        }
        if facts.next_hour.wind_kph >= settings.wind_threshold_kph {
            future.insert(Property::Windy);
        }

        Self { current, future }
    }
}
