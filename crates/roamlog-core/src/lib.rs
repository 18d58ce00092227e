//! # roamlog-core
//!
//! Core types, traits, and pure pipeline stages for roamlog's travel-journal
//! media ingest.
//!
//! This crate holds everything that needs no runtime: file validation,
//! EXIF and ISO-BMFF header parsing, the auto-fill ranking, and the traits
//! the storage/geocoding backends implement.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | An upload or record write failed and the item went to `error` |
//! | WARN  | Recoverable issue, automatic fallback applied (no metadata, geocode timeout) |
//! | INFO  | Batch intake, drain start/finish, session submit/cancel |
//! | DEBUG | Decision points: rejection reasons, auto-fill choices, config values |
//! | TRACE | Per-item progress and per-tag parsing |
//!
//! Structured fields use the names `item_id`, `trip_id`, `file`, `kind`,
//! `status`, `progress` and `duration_ms` across all crates.

pub mod autofill;
pub mod container;
pub mod defaults;
pub mod error;
pub mod exif;
pub mod models;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use autofill::{propose, select_candidate, CandidatePolicy};
pub use container::{read_video_header, VideoHeader};
pub use error::{Error, Result};
pub use exif::{extract_photo_metadata, extract_raw_exif, PhotoExif};
pub use models::*;
pub use traits::*;
pub use validation::{
    detect_content_type, object_path, sanitize_filename, FileValidator, RejectReason, Validation,
    ValidatorConfig,
};
