//! Core traits for roamlog's external collaborators.
//!
//! The ingest pipeline only talks to storage, record persistence and the
//! reverse geocoder through these traits, so each can be swapped for a
//! test double.

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;
use crate::models::NewMediaAsset;

// =============================================================================
// BINARY STORAGE
// =============================================================================

/// Object storage for media binaries, addressed by bucket and path.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store a binary under `bucket/path`, returning the stored path.
    async fn store(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String>;

    /// Public URL for an object previously stored.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

// =============================================================================
// RECORD PERSISTENCE
// =============================================================================

/// Remote persistence of media asset records.
#[async_trait]
pub trait MediaAssetRepository: Send + Sync {
    /// Insert a record and return its id.
    async fn create_media_asset(&self, asset: NewMediaAsset) -> Result<Uuid>;
}

// =============================================================================
// REVERSE GEOCODING
// =============================================================================

/// Backend that resolves coordinates to a human-readable place name.
#[async_trait]
pub trait PlaceNameBackend: Send + Sync {
    /// Resolve a coordinate pair. `Ok(None)` means the backend answered but
    /// knows no place there.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
