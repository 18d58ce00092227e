//! Best-effort place-name enrichment for extracted metadata.
//!
//! Lookups are bounded by a timeout and never fail the caller: any error
//! or expiry yields `None`. Answers are memoised per coordinate pair so a
//! session sees a stable name for the same position. Concurrent callers for
//! the same pair share one lookup; a failed lookup is shared by the callers
//! waiting on it and then forgotten.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use roamlog_core::{defaults, ExtractedMetadata, PlaceNameBackend, Result};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::GeocoderConfig;
use crate::nominatim::NominatimBackend;

type CacheKey = (i64, i64);

/// Outcome of one lookup. Only `Answer` stays cached.
#[derive(Debug, Clone)]
enum Lookup {
    Answer(Option<String>),
    Failed,
}

type Slot = Arc<OnceCell<Lookup>>;

/// Resolves GPS coordinates to place names.
pub struct GeocodingEnricher {
    backend: Option<Arc<dyn PlaceNameBackend>>,
    timeout: Duration,
    cache: Mutex<HashMap<CacheKey, Slot>>,
}

impl GeocodingEnricher {
    pub fn new(backend: Arc<dyn PlaceNameBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enricher that never looks anything up.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_secs(defaults::GEOCODE_TIMEOUT_SECS),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build the Nominatim-backed enricher, or a disabled one.
    pub fn from_config(config: &GeocoderConfig) -> Result<Self> {
        if !config.enabled {
            debug!("Reverse geocoding disabled by configuration");
            return Ok(Self::disabled());
        }
        let backend = NominatimBackend::new(config)?;
        debug!(url = %config.base_url, timeout_secs = config.timeout_secs, "Reverse geocoder configured");
        Ok(Self::new(Arc::new(backend), config.timeout()))
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Place name for a coordinate pair, or `None` on any failure.
    pub async fn resolve_place_name(&self, latitude: f64, longitude: f64) -> Option<String> {
        let backend = self.backend.as_ref()?;
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }

        let key = cache_key(latitude, longitude);
        let slot = self.slot(key);
        let lookup = slot
            .get_or_init(|| self.lookup(backend.as_ref(), latitude, longitude))
            .await
            .clone();

        match lookup {
            Lookup::Answer(place) => place,
            Lookup::Failed => {
                self.forget(key, &slot);
                None
            }
        }
    }

    async fn lookup(
        &self,
        backend: &dyn PlaceNameBackend,
        latitude: f64,
        longitude: f64,
    ) -> Lookup {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, backend.reverse(latitude, longitude)).await {
            Ok(Ok(place)) => {
                debug!(
                    backend = backend.name(),
                    place = place.as_deref().unwrap_or("-"),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Reverse geocode resolved"
                );
                Lookup::Answer(place)
            }
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "Reverse geocode failed, continuing without place name");
                Lookup::Failed
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Reverse geocode timed out, continuing without place name"
                );
                Lookup::Failed
            }
        }
    }

    /// Fill `place_name` when coordinates are present and no name is set.
    pub async fn enrich(&self, metadata: &mut ExtractedMetadata) {
        if metadata.place_name.is_some() {
            return;
        }
        if let Some(point) = metadata.location {
            metadata.place_name = self.resolve_place_name(point.latitude, point.longitude).await;
        }
    }

    /// The shared slot for a coordinate pair, created on first use.
    fn slot(&self, key: CacheKey) -> Slot {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_default())
    }

    /// Drop a failed slot so a later call looks the pair up again.
    fn forget(&self, key: CacheKey, slot: &Slot) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            cache.remove(&key);
        }
    }
}

fn cache_key(latitude: f64, longitude: f64) -> CacheKey {
    let scale = 10f64.powi(defaults::GEOCODE_CACHE_PRECISION);
    (
        (latitude * scale).round() as i64,
        (longitude * scale).round() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roamlog_core::{Error, GeoPoint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        answer: Option<String>,
    }

    #[async_trait]
    impl PlaceNameBackend for CountingBackend {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[derive(Default)]
    struct FailingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlaceNameBackend for FailingBackend {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Request("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowBackend;

    /// Answers after a short pause so concurrent callers overlap.
    struct PausingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlaceNameBackend for PausingBackend {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some("Paris".to_string()))
        }

        fn name(&self) -> &str {
            "pausing"
        }
    }

    #[async_trait]
    impl PlaceNameBackend for SlowBackend {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some("too late".to_string()))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn counting(answer: Option<&str>) -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            answer: answer.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_resolves_and_memoises() {
        let backend = counting(Some("Paris"));
        let enricher = GeocodingEnricher::new(backend.clone(), Duration::from_secs(5));

        assert_eq!(enricher.resolve_place_name(48.8566, 2.3522).await.as_deref(), Some("Paris"));
        // Sub-metre jitter hits the same cache slot.
        assert_eq!(
            enricher.resolve_place_name(48.856601, 2.352201).await.as_deref(),
            Some("Paris")
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_answer_is_memoised() {
        let backend = counting(None);
        let enricher = GeocodingEnricher::new(backend.clone(), Duration::from_secs(5));
        assert!(enricher.resolve_place_name(0.0, -140.0).await.is_none());
        assert!(enricher.resolve_place_name(0.0, -140.0).await.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_error_yields_none_and_is_not_memoised() {
        let backend = Arc::new(FailingBackend::default());
        let enricher = GeocodingEnricher::new(backend.clone(), Duration::from_secs(5));
        assert!(enricher.resolve_place_name(45.764, 4.8357).await.is_none());
        assert!(enricher.resolve_place_name(45.764, 4.8357).await.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_lookup() {
        let backend = Arc::new(PausingBackend {
            calls: AtomicUsize::new(0),
        });
        let enricher = GeocodingEnricher::new(backend.clone(), Duration::from_secs(5));

        let answers = futures::future::join_all(
            (0..4).map(|_| enricher.resolve_place_name(48.8566, 2.3522)),
        )
        .await;

        assert!(answers.iter().all(|a| a.as_deref() == Some("Paris")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_none() {
        let enricher = GeocodingEnricher::new(Arc::new(SlowBackend), Duration::from_secs(5));
        assert!(enricher.resolve_place_name(45.764, 4.8357).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_never_calls_out() {
        let enricher = GeocodingEnricher::disabled();
        assert!(!enricher.is_enabled());
        assert!(enricher.resolve_place_name(48.8566, 2.3522).await.is_none());
    }

    #[tokio::test]
    async fn test_enrich_only_with_coordinates() {
        let backend = counting(Some("Lyon"));
        let enricher = GeocodingEnricher::new(backend.clone(), Duration::from_secs(5));

        let mut without = ExtractedMetadata::default();
        enricher.enrich(&mut without).await;
        assert!(without.place_name.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let mut with = ExtractedMetadata {
            location: GeoPoint::new(45.764, 4.8357),
            ..Default::default()
        };
        enricher.enrich(&mut with).await;
        assert_eq!(with.place_name.as_deref(), Some("Lyon"));
    }

    #[test]
    fn test_cache_key_precision() {
        assert_eq!(cache_key(48.8566, 2.3522), (4_885_660, 235_220));
        assert_eq!(cache_key(-33.86882, 151.20929), (-3_386_882, 15_120_929));
    }

    #[test]
    fn test_from_config_disabled() {
        let enricher =
            GeocodingEnricher::from_config(&GeocoderConfig::default().with_enabled(false)).unwrap();
        assert!(!enricher.is_enabled());
    }
}
