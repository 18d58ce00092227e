/// Intake path without a runtime: validate a selection of synthesized
/// JPEGs, read their EXIF, and build the auto-fill proposal.
///
/// Fixture coordinates: Paris (48.8566, 2.3522) and Lyon (45.7640, 4.8357),
/// written as DMS rationals the way cameras store them.
use std::collections::BTreeSet;
use std::io::Cursor;

use chrono::{NaiveDate, TimeZone, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use roamlog_core::{
    extract_photo_metadata, propose, CandidatePolicy, ExtractedMetadata, FileValidator,
    FormField, FormState, MediaKind, SourceFile, Validation,
};

fn ascii(tag: Tag, s: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![s.as_bytes().to_vec()]),
    }
}

fn dms(tag: Tag, d: u32, m: u32, s_hundredths: u32) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(vec![
            Rational { num: d, denom: 1 },
            Rational { num: m, denom: 1 },
            Rational {
                num: s_hundredths,
                denom: 100,
            },
        ]),
    }
}

fn jpeg_with(fields: &[Field]) -> Vec<u8> {
    let mut writer = Writer::new();
    for f in fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn paris() -> Vec<u8> {
    jpeg_with(&[
        ascii(Tag::Make, "Apple"),
        ascii(Tag::DateTimeOriginal, "2024:05:12 14:03:27"),
        ascii(Tag::GPSLatitudeRef, "N"),
        dms(Tag::GPSLatitude, 48, 51, 2376),
        ascii(Tag::GPSLongitudeRef, "E"),
        dms(Tag::GPSLongitude, 2, 21, 792),
    ])
}

fn lyon() -> Vec<u8> {
    jpeg_with(&[
        ascii(Tag::Make, "Apple"),
        ascii(Tag::DateTimeOriginal, "2024:05:14 09:00:00"),
        ascii(Tag::GPSLatitudeRef, "N"),
        dms(Tag::GPSLatitude, 45, 45, 5040),
        ascii(Tag::GPSLongitudeRef, "E"),
        dms(Tag::GPSLongitude, 4, 50, 852),
    ])
}

fn no_gps() -> Vec<u8> {
    jpeg_with(&[ascii(Tag::Make, "Apple")])
}

/// What the extractor does for photos, minus the header-decode fallback.
fn metadata_for(file: &SourceFile) -> ExtractedMetadata {
    let mut meta = match extract_photo_metadata(&file.data) {
        Ok(exif) => ExtractedMetadata {
            captured_at: exif.captured_at,
            location: exif.location,
            ..Default::default()
        },
        Err(_) => ExtractedMetadata::default(),
    };
    if meta.captured_at.is_none() {
        meta.captured_at = file.last_modified;
    }
    meta
}

#[test]
fn test_three_jpeg_selection_fills_from_first_gps_file() {
    let fallback = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let selection = vec![
        SourceFile::new("IMG_0001.JPG", paris()).with_content_type("image/jpeg"),
        SourceFile::new("IMG_0002.JPG", lyon()).with_content_type("image/jpeg"),
        SourceFile::new("IMG_0003.JPG", no_gps())
            .with_content_type("image/jpeg")
            .with_last_modified(fallback),
    ];

    let validator = FileValidator::default();
    for file in &selection {
        assert_eq!(
            validator.validate(file),
            Validation::Accepted {
                kind: MediaKind::Photo
            }
        );
    }

    let batch: Vec<ExtractedMetadata> = selection.iter().map(metadata_for).collect();
    for meta in &batch {
        assert_eq!(meta.latitude().is_some(), meta.longitude().is_some());
    }
    assert_eq!(batch[2].captured_at, Some(fallback));

    let form = FormState::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    let proposal = propose(&batch, &form, CandidatePolicy::FirstInSelection);

    let point = proposal.location.expect("location proposed");
    assert!((point.latitude - 48.8566).abs() < 1e-6);
    assert!((point.longitude - 2.3522).abs() < 1e-6);
    assert_eq!(
        proposal.date,
        Some(Utc.with_ymd_and_hms(2024, 5, 12, 14, 3, 27).unwrap())
    );
    assert_eq!(
        proposal.filled_fields,
        BTreeSet::from([FormField::Location, FormField::Date])
    );
}

#[test]
fn test_user_date_survives_batch() {
    let batch = vec![metadata_for(&SourceFile::new("a.jpg", paris()))];
    let mut form = FormState::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    form.set_date_by_user(NaiveDate::from_ymd_opt(2024, 5, 30).unwrap());

    let proposal = propose(&batch, &form, CandidatePolicy::default());
    form.apply(&proposal);

    assert_eq!(proposal.filled_fields, BTreeSet::from([FormField::Location]));
    assert_eq!(form.date, NaiveDate::from_ymd_opt(2024, 5, 30).unwrap());
}
