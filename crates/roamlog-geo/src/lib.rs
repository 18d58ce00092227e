//! # roamlog-geo
//!
//! Reverse geocoding for roamlog: turns photo GPS positions into a
//! human-readable place name, best-effort and bounded by a short timeout.

pub mod config;
pub mod enricher;
pub mod nominatim;

pub use config::GeocoderConfig;
pub use enricher::GeocodingEnricher;
pub use nominatim::NominatimBackend;
