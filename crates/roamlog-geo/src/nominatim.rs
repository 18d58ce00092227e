//! Nominatim-compatible reverse geocoding backend.

use std::time::Duration;

use async_trait::async_trait;
use roamlog_core::{defaults, Error, PlaceNameBackend, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::GeocoderConfig;

/// Reverse geocoder speaking the Nominatim `/reverse` JSON API.
pub struct NominatimBackend {
    base_url: String,
    language: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl NominatimBackend {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build geocoder client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
    /// Set instead of `address` when nothing is found ("Unable to geocode").
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
}

impl Address {
    /// First non-empty of city, town, village, municipality, county.
    fn place_name(self) -> Option<String> {
        [
            self.city,
            self.town,
            self.village,
            self.municipality,
            self.county,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
    }
}

#[async_trait]
impl PlaceNameBackend for NominatimBackend {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let zoom = defaults::GEOCODE_ZOOM.to_string();
        let lat = latitude.to_string();
        let lon = longitude.to_string();

        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("format", "json"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", zoom.as_str()),
                ("addressdetails", "1"),
            ])
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(language) = &self.language {
            request = request.header(reqwest::header::ACCEPT_LANGUAGE, language);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Request(format!("Geocoder request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "Geocoder returned {}: {}",
                status, body
            )));
        }

        let result: ReverseResponse = response.json().await.map_err(|e| {
            Error::Serialization(format!("Failed to parse geocoder response: {}", e))
        })?;

        if let Some(error) = result.error {
            debug!(latitude, longitude, error = %error, "Geocoder found no place");
            return Ok(None);
        }

        Ok(result.address.and_then(Address::place_name))
    }

    fn name(&self) -> &str {
        "nominatim"
    }
}
