//! Core data models for the media ingest pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{Error, Result};

// =============================================================================
// MEDIA KIND / STATUS
// =============================================================================

/// Kind of media a source file was classified as. Fixed at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// Content type used when nothing better is known about the payload.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Self::Photo => "image/jpeg",
            Self::Video => "video/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            _ => Err(Error::InvalidInput(format!("Unknown media kind: {}", s))),
        }
    }
}

/// Upload lifecycle status of a media item.
///
/// ```text
/// pending -> uploading -> completed
///                     \-> error -(retry)-> pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Forward edges of the upload state machine.
    ///
    /// `Error -> Pending` is deliberately absent: retry is a separate,
    /// explicit action and does not go through this check.
    pub fn can_advance_to(&self, next: MediaStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading)
                | (Self::Uploading, Self::Completed)
                | (Self::Uploading, Self::Error)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SOURCE FILE
// =============================================================================

/// Handle to a user-selected file: name, declared type, size and payload.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    /// MIME type as declared by the picker/OS. May be missing or generic.
    pub content_type: Option<String>,
    pub size_bytes: u64,
    /// Filesystem last-modified time, the capture-time fallback.
    pub last_modified: Option<DateTime<Utc>>,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            content_type: None,
            size_bytes: data.len() as u64,
            last_modified: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.content_type = if content_type.trim().is_empty() {
            None
        } else {
            Some(content_type)
        };
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Lowercased filename extension, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

// =============================================================================
// EXTRACTED METADATA
// =============================================================================

/// A latitude/longitude pair in decimal degrees.
///
/// Coordinates only ever travel together, so a half-resolved position
/// cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns `None` for non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

/// Best-effort capture metadata for one media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub location: Option<GeoPoint>,
    pub place_name: Option<String>,
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub camera: Option<String>,
    /// Source-format specific fields kept for persistence only.
    pub raw: Option<JsonValue>,
}

impl ExtractedMetadata {
    pub fn latitude(&self) -> Option<f64> {
        self.location.map(|p| p.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.location.map(|p| p.longitude)
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }
}

// =============================================================================
// AUTO-FILL
// =============================================================================

/// Parent-form fields the pipeline may auto-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormField {
    Date,
    Location,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => f.write_str("date"),
            Self::Location => f.write_str("location"),
        }
    }
}

/// Values proposed for the parent form after a batch was added.
///
/// Ephemeral: consumed by the form and then discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoFillProposal {
    pub date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub location: Option<GeoPoint>,
    pub place_name: Option<String>,
    pub filled_fields: BTreeSet<FormField>,
}

impl AutoFillProposal {
    pub fn is_empty(&self) -> bool {
        self.filled_fields.is_empty()
    }

    /// Human readable "date, location" list for the auto-filled affordance.
    pub fn summary(&self) -> String {
        self.filled_fields
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Where a form field's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    /// Implicit value set when the form opened.
    #[default]
    Default,
    AutoFilled,
    UserEdited,
}

/// The parent journal-entry form's date and location fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    pub date: NaiveDate,
    /// The date the form opened with ("today").
    pub default_date: NaiveDate,
    pub date_origin: FieldOrigin,
    pub location: Option<GeoPoint>,
    pub place_name: Option<String>,
    pub location_origin: FieldOrigin,
}

impl FormState {
    /// Fresh form opened on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            default_date: today,
            date_origin: FieldOrigin::Default,
            location: None,
            place_name: None,
            location_origin: FieldOrigin::Default,
        }
    }

    pub fn set_date_by_user(&mut self, date: NaiveDate) {
        self.date = date;
        self.date_origin = FieldOrigin::UserEdited;
    }

    pub fn set_location_by_user(&mut self, place_name: Option<String>, location: Option<GeoPoint>) {
        self.place_name = place_name.filter(|p| !p.trim().is_empty());
        self.location = location;
        self.location_origin = FieldOrigin::UserEdited;
    }

    /// True while the date still holds the implicit value from form-open.
    pub fn date_is_default(&self) -> bool {
        self.date_origin == FieldOrigin::Default && self.date == self.default_date
    }

    /// True while nothing (and nobody) has put a location into the form.
    pub fn location_is_empty(&self) -> bool {
        self.location_origin != FieldOrigin::UserEdited
            && self.location.is_none()
            && self.place_name.as_deref().map_or(true, |p| p.trim().is_empty())
    }

    /// Write a proposal's filled fields into the form.
    pub fn apply(&mut self, proposal: &AutoFillProposal) {
        if proposal.filled_fields.contains(&FormField::Date) {
            if let Some(date) = proposal.date {
                self.date = date.date_naive();
                self.date_origin = FieldOrigin::AutoFilled;
            }
        }
        if proposal.filled_fields.contains(&FormField::Location) {
            self.location = proposal.location;
            self.place_name = proposal.place_name.clone();
            self.location_origin = FieldOrigin::AutoFilled;
        }
    }
}

// =============================================================================
// MEDIA ASSET RECORDS
// =============================================================================

/// Fields sent to record persistence when an upload completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMediaAsset {
    pub trip_id: Uuid,
    pub journal_entry_id: Option<Uuid>,
    pub kind: MediaKind,
    pub url: String,
    pub storage_path: String,
    pub filename: String,
    pub content_type: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub place_name: Option<String>,
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub size_bytes: Option<u64>,
    pub camera: Option<String>,
    pub raw: Option<JsonValue>,
}

/// A persisted media asset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    #[serde(flatten)]
    pub asset: NewMediaAsset,
    pub created_at: DateTime<Utc>,
}
