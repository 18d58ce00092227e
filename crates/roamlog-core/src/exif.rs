//! EXIF metadata extraction for photos.
//!
//! Parses embedded tags with the kamadak-exif crate and produces both the
//! structured fields the pipeline acts on (capture time, GPS, dimensions,
//! camera) and a categorised raw tag bag kept for persistence only.
//!
//! Images without EXIF (most PNGs, screenshots) return an error from
//! [`extract_photo_metadata`]; callers treat that as "no tags" and degrade.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use exif::{Exif, Field, In, Reader, Tag, Value};
use serde_json::{json, Map, Value as JsonValue};
use std::io::Cursor;

use crate::models::GeoPoint;
use crate::{Error, Result};

/// Structured fields read from a photo's EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoExif {
    /// DateTimeOriginal > DateTimeDigitized > DateTime, converted to UTC
    /// using the matching OffsetTime* tag when present.
    pub captured_at: Option<DateTime<Utc>>,
    /// Present only when latitude and longitude both resolved.
    pub location: Option<GeoPoint>,
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    /// Make and model joined, e.g. "Apple iPhone 13".
    pub camera: Option<String>,
    /// Categorised tag bag (camera, settings, gps, datetime, image, lens).
    pub raw: Option<JsonValue>,
}

/// Parse the EXIF block of an image.
///
/// Returns `Err(Error::InvalidInput)` when the container holds no readable
/// EXIF data. Individual malformed tags are skipped, not fatal.
pub fn extract_photo_metadata(data: &[u8]) -> Result<PhotoExif> {
    let exif = read_exif(data)?;

    let (pixel_width, pixel_height) = match extract_dimensions(&exif) {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    };

    Ok(PhotoExif {
        captured_at: extract_datetime(&exif),
        location: extract_gps(&exif),
        pixel_width,
        pixel_height,
        camera: extract_camera(&exif),
        raw: raw_tag_bag(&exif),
    })
}

/// Categorised raw tag bag only. `None` if the image has no EXIF data.
pub fn extract_raw_exif(data: &[u8]) -> Option<JsonValue> {
    read_exif(data).ok().and_then(|exif| raw_tag_bag(&exif))
}

fn read_exif(data: &[u8]) -> Result<Exif> {
    let mut reader = Reader::new();
    reader.continue_on_error(true);
    let mut cursor = Cursor::new(data);

    reader
        .read_from_container(&mut cursor)
        .or_else(|e| e.distill_partial_result(|_| {}))
        .map_err(|e| Error::InvalidInput(format!("Failed to read EXIF data: {}", e)))
}

// =============================================================================
// STRUCTURED FIELDS
// =============================================================================

/// Capture time, trying the datetime tags in priority order.
fn extract_datetime(exif: &Exif) -> Option<DateTime<Utc>> {
    let candidates = [
        (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
        (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized),
        (Tag::DateTime, Tag::OffsetTime),
    ];

    candidates.iter().find_map(|(tag, offset_tag)| {
        let bytes = ascii_bytes(exif.get_field(*tag, In::PRIMARY)?)?;
        let mut dt = exif::DateTime::from_ascii(bytes).ok()?;
        if let Some(offset) = exif
            .get_field(*offset_tag, In::PRIMARY)
            .and_then(ascii_bytes)
        {
            // A malformed offset leaves the time naive.
            let _ = dt.parse_offset(offset);
        }
        exif_datetime_to_utc(&dt)
    })
}

/// Convert an EXIF datetime to UTC. Without an offset the wall-clock time
/// is taken as UTC.
fn exif_datetime_to_utc(dt: &exif::DateTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
        .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;

    match dt.offset {
        Some(minutes) => {
            let offset = FixedOffset::east_opt(i32::from(minutes) * 60)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|local| local.with_timezone(&Utc))
        }
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// GPS position, or `None` unless both coordinates resolve.
fn extract_gps(exif: &Exif) -> Option<GeoPoint> {
    let lat = extract_gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let lon = extract_gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    GeoPoint::new(lat, lon)
}

/// One signed coordinate from its DMS rationals and hemisphere reference.
fn extract_gps_coordinate(exif: &Exif, coord_tag: Tag, ref_tag: Tag, negative: u8) -> Option<f64> {
    let coord_field = exif.get_field(coord_tag, In::PRIMARY)?;
    let ref_field = exif.get_field(ref_tag, In::PRIMARY)?;

    let decimal = match &coord_field.value {
        Value::Rational(dms) => dms_to_decimal(dms)?,
        _ => return None,
    };

    let hemisphere = ascii_bytes(ref_field)?.first()?.to_ascii_uppercase();
    if hemisphere == negative {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}

/// Converts DMS (degrees/minutes/seconds) to decimal degrees.
fn dms_to_decimal(dms: &[exif::Rational]) -> Option<f64> {
    if dms.len() < 3 {
        return None;
    }
    let d = dms[0].to_f64();
    let m = dms[1].to_f64();
    let s = dms[2].to_f64();
    let decimal = d + m / 60.0 + s / 3600.0;
    decimal.is_finite().then_some(decimal)
}

/// Pixel dimensions: PixelX/YDimension first, then ImageWidth/ImageLength.
fn extract_dimensions(exif: &Exif) -> Option<(u32, u32)> {
    let width = extract_u32_field(exif, Tag::PixelXDimension)
        .or_else(|| extract_u32_field(exif, Tag::ImageWidth))?;
    let height = extract_u32_field(exif, Tag::PixelYDimension)
        .or_else(|| extract_u32_field(exif, Tag::ImageLength))?;

    (width > 0 && height > 0).then_some((width, height))
}

/// "Make Model", without repeating the make when the model already has it.
fn extract_camera(exif: &Exif) -> Option<String> {
    let make = extract_string_field(exif, Tag::Make);
    let model = extract_string_field(exif, Tag::Model);

    match (make, model) {
        (Some(make), Some(model)) => {
            if model.to_lowercase().starts_with(&make.to_lowercase()) {
                Some(model)
            } else {
                Some(format!("{} {}", make, model))
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn extract_string_field(exif: &Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY).and_then(field_as_string)
}

fn extract_u32_field(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

/// First ASCII component with trailing NULs/spaces removed.
fn ascii_bytes(field: &Field) -> Option<&[u8]> {
    match &field.value {
        Value::Ascii(vecs) => {
            let bytes = vecs.first()?;
            let end = bytes
                .iter()
                .rposition(|b| *b != 0 && *b != b' ')
                .map_or(0, |i| i + 1);
            (end > 0).then(|| &bytes[..end])
        }
        _ => None,
    }
}

// =============================================================================
// RAW TAG BAG
// =============================================================================

/// Build the categorised JSON bag persisted alongside the asset record.
fn raw_tag_bag(exif: &Exif) -> Option<JsonValue> {
    let mut camera = Map::new();
    let mut settings = Map::new();
    let mut gps = Map::new();
    let mut datetime = Map::new();
    let mut image = Map::new();
    let mut lens = Map::new();

    for field in exif.fields() {
        if field.ifd_num != In::PRIMARY {
            continue;
        }
        match field.tag {
            Tag::Make => insert_string(&mut camera, "make", field),
            Tag::Model => insert_string(&mut camera, "model", field),
            Tag::Software => insert_string(&mut camera, "software", field),

            Tag::FNumber => insert_rational(&mut settings, "f_number", field),
            Tag::ExposureTime => insert_display(&mut settings, "exposure_time", field),
            Tag::PhotographicSensitivity => insert_uint(&mut settings, "iso", field),
            Tag::FocalLength => insert_display(&mut settings, "focal_length", field),
            Tag::Flash => insert_display(&mut settings, "flash", field),

            Tag::GPSAltitude => insert_rational(&mut gps, "altitude", field),

            Tag::DateTimeOriginal => insert_string(&mut datetime, "original", field),
            Tag::DateTimeDigitized => insert_string(&mut datetime, "digitized", field),
            Tag::DateTime => insert_string(&mut datetime, "modified", field),
            Tag::OffsetTimeOriginal => insert_string(&mut datetime, "offset_original", field),

            Tag::Orientation => insert_uint(&mut image, "orientation", field),
            Tag::XResolution => insert_rational(&mut image, "x_resolution", field),
            Tag::YResolution => insert_rational(&mut image, "y_resolution", field),
            Tag::ColorSpace => {
                if let Some(n) = field.value.get_uint(0) {
                    let color_space = match n {
                        1 => "sRGB".to_string(),
                        65535 => "Uncalibrated".to_string(),
                        _ => n.to_string(),
                    };
                    image.insert("color_space".to_string(), json!(color_space));
                }
            }

            Tag::LensModel => insert_string(&mut lens, "model", field),
            Tag::LensMake => insert_string(&mut lens, "make", field),

            _ => {}
        }
    }

    if let Some(point) = extract_gps(exif) {
        gps.insert("latitude".to_string(), json!(point.latitude));
        gps.insert("longitude".to_string(), json!(point.longitude));
    }

    let mut result = Map::new();
    for (name, category) in [
        ("camera", camera),
        ("settings", settings),
        ("gps", gps),
        ("datetime", datetime),
        ("image", image),
        ("lens", lens),
    ] {
        if !category.is_empty() {
            result.insert(name.to_string(), JsonValue::Object(category));
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(json!({ "exif": result }))
    }
}

fn field_as_string(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(_) => ascii_bytes(field).map(|b| String::from_utf8_lossy(b).trim().to_string()),
        _ => {
            let s = field.display_value().to_string();
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
    }
}

fn insert_string(map: &mut Map<String, JsonValue>, key: &str, field: &Field) {
    if let Some(s) = field_as_string(field) {
        map.insert(key.to_string(), json!(s));
    }
}

fn insert_display(map: &mut Map<String, JsonValue>, key: &str, field: &Field) {
    let s = field.display_value().to_string();
    if !s.trim().is_empty() {
        map.insert(key.to_string(), json!(s.trim()));
    }
}

fn insert_rational(map: &mut Map<String, JsonValue>, key: &str, field: &Field) {
    if let Value::Rational(v) = &field.value {
        if let Some(f) = v.first().map(|r| r.to_f64()).filter(|f| f.is_finite()) {
            map.insert(key.to_string(), json!(f));
        }
    }
}

fn insert_uint(map: &mut Map<String, JsonValue>, key: &str, field: &Field) {
    if let Some(n) = field.value.get_uint(0) {
        map.insert(key.to_string(), json!(n));
    }
}
