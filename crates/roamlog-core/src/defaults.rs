//! Centralized default constants for roamlog.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and binaries should reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by pipeline stage.

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum accepted photo size in bytes (20 MiB).
///
/// Configurable via `ROAMLOG_MAX_PHOTO_BYTES`.
pub const MAX_PHOTO_SIZE_BYTES: u64 = 20 * 1024 * 1024;

/// Maximum accepted video size in bytes (200 MiB).
///
/// Configurable via `ROAMLOG_MAX_VIDEO_BYTES`.
pub const MAX_VIDEO_SIZE_BYTES: u64 = 200 * 1024 * 1024;

/// Maximum filename length kept in storage object paths.
pub const FILENAME_MAX_LENGTH: usize = 255;

pub const ENV_MAX_PHOTO_BYTES: &str = "ROAMLOG_MAX_PHOTO_BYTES";
pub const ENV_MAX_VIDEO_BYTES: &str = "ROAMLOG_MAX_VIDEO_BYTES";

// =============================================================================
// METADATA EXTRACTION
// =============================================================================

/// Files above this size skip the header-decode dimension fallback.
pub const DIMENSION_DECODE_MAX_BYTES: u64 = 64 * 1024 * 1024;

// =============================================================================
// GEOCODING
// =============================================================================

/// Default reverse-geocoding endpoint (Nominatim-compatible).
pub const GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// User-Agent sent to the geocoder. Nominatim rejects anonymous clients.
pub const GEOCODER_USER_AGENT: &str = "roamlog/2026 (travel journal media ingest)";

/// Hard bound on a single reverse-geocoding round trip.
pub const GEOCODE_TIMEOUT_SECS: u64 = 5;

/// Nominatim zoom level; 10 resolves to city granularity.
pub const GEOCODE_ZOOM: u8 = 10;

/// Decimal places kept when memoising lookups (~1.1 m at the equator).
pub const GEOCODE_CACHE_PRECISION: i32 = 5;

pub const ENV_GEOCODER_URL: &str = "ROAMLOG_GEOCODER_URL";
pub const ENV_GEOCODER_ENABLED: &str = "ROAMLOG_GEOCODER_ENABLED";
pub const ENV_GEOCODER_TIMEOUT_SECS: &str = "ROAMLOG_GEOCODER_TIMEOUT_SECS";
pub const ENV_GEOCODER_USER_AGENT: &str = "ROAMLOG_GEOCODER_USER_AGENT";
pub const ENV_GEOCODER_LANGUAGE: &str = "ROAMLOG_GEOCODER_LANGUAGE";

// =============================================================================
// UPLOAD
// =============================================================================

/// Storage bucket for journal media.
pub const MEDIA_BUCKET: &str = "journal-media";

/// Maximum number of items uploading at the same time during a drain.
pub const UPLOAD_MAX_CONCURRENT: usize = 3;

/// Progress reported when the binary transfer starts.
pub const PROGRESS_TRANSFER_STARTED: u8 = 10;

/// Progress reported once storage acknowledged the binary.
pub const PROGRESS_TRANSFER_ACKNOWLEDGED: u8 = 60;

/// Progress reported once the remote asset record exists.
pub const PROGRESS_RECORD_PERSISTED: u8 = 100;

pub const ENV_UPLOAD_CONCURRENCY: &str = "ROAMLOG_UPLOAD_CONCURRENCY";
pub const ENV_MEDIA_BUCKET: &str = "ROAMLOG_MEDIA_BUCKET";

// =============================================================================
// STORAGE
// =============================================================================

/// Base directory of the filesystem blob store.
pub const STORAGE_DIR: &str = "./data/storage";

/// Public base URL objects are served from.
pub const PUBLIC_URL: &str = "http://localhost:3000/storage";

/// File name of the JSON-lines media asset ledger inside the storage dir.
pub const ASSET_LEDGER_FILE: &str = "media_assets.jsonl";

pub const ENV_STORAGE_DIR: &str = "ROAMLOG_STORAGE_DIR";
pub const ENV_PUBLIC_URL: &str = "ROAMLOG_PUBLIC_URL";

// =============================================================================
// EVENTS / PREVIEWS
// =============================================================================

/// Default ingest event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Scheme prefix of preview handle URLs.
pub const PREVIEW_URL_PREFIX: &str = "blob:roamlog/";
