//! Best-effort metadata extraction for accepted media files.
//!
//! Extraction never fails: every parse error degrades to "field not
//! available". Parsing is CPU-bound and runs on the blocking pool; place-name
//! enrichment follows once coordinates are known.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use image::ImageReader;
use roamlog_core::{
    defaults, extract_photo_metadata, read_video_header, ExtractedMetadata, MediaKind, SourceFile,
};
use roamlog_geo::GeocodingEnricher;
use tracing::{debug, trace, warn};

/// Produces an [`ExtractedMetadata`] record for each accepted file.
#[derive(Clone)]
pub struct MetadataExtractor {
    geocoder: Arc<GeocodingEnricher>,
}

impl MetadataExtractor {
    pub fn new(geocoder: Arc<GeocodingEnricher>) -> Self {
        Self { geocoder }
    }

    /// Extractor that never performs place-name lookups.
    pub fn without_geocoding() -> Self {
        Self::new(Arc::new(GeocodingEnricher::disabled()))
    }

    pub fn geocoder(&self) -> &GeocodingEnricher {
        &self.geocoder
    }

    /// Extract and enrich metadata for one file.
    pub async fn extract(&self, file: &SourceFile, kind: MediaKind) -> ExtractedMetadata {
        let start = Instant::now();
        let owned = file.clone();
        let mut metadata =
            match tokio::task::spawn_blocking(move || Self::extract_local(&owned, kind)).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Metadata extraction task failed, using file attributes only");
                    ExtractedMetadata {
                        captured_at: file.last_modified,
                        ..Default::default()
                    }
                }
            };

        self.geocoder.enrich(&mut metadata).await;

        debug!(
            file = %file.name,
            %kind,
            has_captured_at = metadata.captured_at.is_some(),
            has_location = metadata.has_location(),
            place_name = metadata.place_name.as_deref().unwrap_or("-"),
            duration_ms = start.elapsed().as_millis() as u64,
            "Metadata extracted"
        );
        metadata
    }

    /// Extract a whole batch concurrently. Output order follows input order.
    pub async fn extract_batch(&self, files: &[(SourceFile, MediaKind)]) -> Vec<ExtractedMetadata> {
        join_all(files.iter().map(|(file, kind)| self.extract(file, *kind))).await
    }

    /// Synchronous part of extraction: embedded tags and headers only, no
    /// network.
    pub fn extract_local(file: &SourceFile, kind: MediaKind) -> ExtractedMetadata {
        let mut metadata = match kind {
            MediaKind::Photo => extract_photo(file),
            MediaKind::Video => extract_video(file),
        };

        if metadata.captured_at.is_none() {
            metadata.captured_at = file.last_modified;
            if metadata.captured_at.is_some() {
                trace!(file = %file.name, "Capture time taken from last-modified attribute");
            }
        }
        metadata
    }
}

fn extract_photo(file: &SourceFile) -> ExtractedMetadata {
    let mut metadata = ExtractedMetadata::default();

    match extract_photo_metadata(&file.data) {
        Ok(exif) => {
            metadata.captured_at = exif.captured_at;
            metadata.location = exif.location;
            metadata.pixel_width = exif.pixel_width;
            metadata.pixel_height = exif.pixel_height;
            metadata.camera = exif.camera;
            metadata.raw = exif.raw;
        }
        Err(e) => {
            debug!(file = %file.name, error = %e, "No embedded tags, continuing without them");
        }
    }

    if metadata.pixel_width.is_none() || metadata.pixel_height.is_none() {
        if let Some((width, height)) = decoded_dimensions(file) {
            metadata.pixel_width = Some(width);
            metadata.pixel_height = Some(height);
        }
    }
    metadata
}

/// Natural dimensions from the image header. Only the header is decoded.
fn decoded_dimensions(file: &SourceFile) -> Option<(u32, u32)> {
    if file.size_bytes > defaults::DIMENSION_DECODE_MAX_BYTES {
        debug!(file = %file.name, size = file.size_bytes, "Skipping dimension decode for large file");
        return None;
    }

    let reader = ImageReader::new(Cursor::new(&file.data[..]))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(e) => {
            debug!(file = %file.name, error = %e, "Image header decode failed");
            None
        }
    }
}

fn extract_video(file: &SourceFile) -> ExtractedMetadata {
    match read_video_header(&file.data) {
        Ok(header) => ExtractedMetadata {
            pixel_width: header.pixel_width,
            pixel_height: header.pixel_height,
            duration_seconds: header.duration_seconds,
            raw: Some(header.raw()),
            ..Default::default()
        },
        Err(e) => {
            debug!(file = %file.name, error = %e, "Container header unreadable");
            ExtractedMetadata::default()
        }
    }
}
