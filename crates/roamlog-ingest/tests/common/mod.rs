//! Shared fixtures for ingest integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use roamlog_core::{
    BlobStorage, Error, MediaAssetRepository, NewMediaAsset, Result, SourceFile,
};
use uuid::Uuid;

// =============================================================================
// EXIF JPEG FIXTURES
// =============================================================================

pub fn ascii(tag: Tag, s: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![s.as_bytes().to_vec()]),
    }
}

pub fn dms(tag: Tag, d: u32, m: u32, s_hundredths: u32) -> Field {
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

/// Minimal JPEG: SOI, one APP1 Exif segment, EOI.
pub fn jpeg_with(fields: &[Field]) -> Vec<u8> {
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

/// Shot in Paris (48.8566, 2.3522) on 2024-05-12.
pub fn paris_jpeg() -> Vec<u8> {
    jpeg_with(&[
        ascii(Tag::Make, "Apple"),
        ascii(Tag::Model, "iPhone 15"),
        ascii(Tag::DateTimeOriginal, "2024:05:12 14:03:27"),
        ascii(Tag::GPSLatitudeRef, "N"),
        dms(Tag::GPSLatitude, 48, 51, 2376),
        ascii(Tag::GPSLongitudeRef, "E"),
        dms(Tag::GPSLongitude, 2, 21, 792),
    ])
}

/// Shot in Lyon (45.7640, 4.8357) on 2024-05-14.
pub fn lyon_jpeg() -> Vec<u8> {
    jpeg_with(&[
        ascii(Tag::Make, "Apple"),
        ascii(Tag::DateTimeOriginal, "2024:05:14 09:00:00"),
        ascii(Tag::GPSLatitudeRef, "N"),
        dms(Tag::GPSLatitude, 45, 45, 5040),
        ascii(Tag::GPSLongitudeRef, "E"),
        dms(Tag::GPSLongitude, 4, 50, 852),
    ])
}

/// Tags but no position and no capture time.
pub fn plain_jpeg() -> Vec<u8> {
    jpeg_with(&[ascii(Tag::Make, "Canon")])
}

pub fn photo(name: &str, data: Vec<u8>) -> SourceFile {
    SourceFile::new(name, data).with_content_type("image/jpeg")
}

// =============================================================================
// CAPABILITY FAKES
// =============================================================================

/// In-memory blob store. Payloads containing `fail_marker` fail to store;
/// payloads containing `panic_marker` panic the storing task.
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, (Bytes, String)>>,
    pub fail_marker: Option<String>,
    pub panic_marker: Option<String>,
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MemoryStorage {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn panicking_on(marker: &str) -> Self {
        Self {
            panic_marker: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn store(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        if let Some(marker) = &self.panic_marker {
            if contains(&data, marker) {
                panic!("storage backend crashed on {}", path);
            }
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // Object paths drop the original name, so failures key on content.
        if let Some(marker) = &self.fail_marker {
            if contains(&data, marker) {
                return Err(Error::Storage(format!("upload rejected for {}", path)));
            }
        }
        self.objects.lock().unwrap().insert(
            format!("{}/{}", bucket, path),
            (data, content_type.to_string()),
        );
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://media.test/{}/{}", bucket, path)
    }
}

fn contains(data: &[u8], marker: &str) -> bool {
    data.windows(marker.len()).any(|w| w == marker.as_bytes())
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryAssets {
    pub records: Mutex<Vec<(Uuid, NewMediaAsset)>>,
    pub reject_all: bool,
}

impl MemoryAssets {
    pub fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Default::default()
        }
    }

    pub fn get(&self, id: Uuid) -> Option<NewMediaAsset> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, r)| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaAssetRepository for MemoryAssets {
    async fn create_media_asset(&self, asset: NewMediaAsset) -> Result<Uuid> {
        if self.reject_all {
            return Err(Error::Persistence("insert rejected".to_string()));
        }
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push((id, asset));
        Ok(id)
    }
}
