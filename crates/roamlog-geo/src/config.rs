//! Reverse geocoder configuration.

use std::time::Duration;

use roamlog_core::defaults;

/// Settings for the reverse-geocoding backend and enricher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocoderConfig {
    /// When false, lookups are skipped and every place name is `None`.
    pub enabled: bool,
    /// Nominatim-compatible base URL, without trailing slash.
    pub base_url: String,
    pub user_agent: String,
    /// Upper bound on one lookup, including connect time.
    pub timeout_secs: u64,
    /// Preferred result language (`accept-language`), e.g. "en" or "fr".
    pub language: Option<String>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: defaults::GEOCODER_URL.to_string(),
            user_agent: defaults::GEOCODER_USER_AGENT.to_string(),
            timeout_secs: defaults::GEOCODE_TIMEOUT_SECS,
            language: None,
        }
    }
}

impl GeocoderConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ROAMLOG_GEOCODER_ENABLED` | `true` |
    /// | `ROAMLOG_GEOCODER_URL` | `https://nominatim.openstreetmap.org` |
    /// | `ROAMLOG_GEOCODER_USER_AGENT` | `roamlog/2026 (...)` |
    /// | `ROAMLOG_GEOCODER_TIMEOUT_SECS` | `5` |
    /// | `ROAMLOG_GEOCODER_LANGUAGE` | unset |
    pub fn from_env() -> Self {
        let enabled = std::env::var(defaults::ENV_GEOCODER_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let base_url = std::env::var(defaults::ENV_GEOCODER_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| defaults::GEOCODER_URL.to_string());

        let user_agent = std::env::var(defaults::ENV_GEOCODER_USER_AGENT)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::GEOCODER_USER_AGENT.to_string());

        let timeout_secs = std::env::var(defaults::ENV_GEOCODER_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults::GEOCODE_TIMEOUT_SECS);

        let language = std::env::var(defaults::ENV_GEOCODER_LANGUAGE)
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            enabled,
            base_url,
            user_agent,
            timeout_secs,
            language,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
