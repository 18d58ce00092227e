//! Minimal ISO base media (MP4/MOV/M4V/3GP) header reader.
//!
//! Only walks the box tree far enough to find the movie header (`mvhd`,
//! duration) and track headers (`tkhd`, display dimensions). Sample data
//! is never touched, so cost is proportional to the `moov` box size.

use serde_json::{json, Value as JsonValue};

use crate::{Error, Result};

/// Container facts read from a video's headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoHeader {
    /// `ftyp` major brand, e.g. "isom", "qt  ".
    pub brand: Option<String>,
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub timescale: Option<u32>,
    pub track_count: usize,
}

impl VideoHeader {
    /// Raw bag persisted alongside the asset record.
    pub fn raw(&self) -> JsonValue {
        json!({
            "container": {
                "brand": self.brand,
                "timescale": self.timescale,
                "track_count": self.track_count,
            }
        })
    }
}

/// Read `ftyp`/`moov` headers from an ISO base media file.
///
/// Returns `Err(Error::InvalidInput)` when no `moov` box is found, which
/// includes non-ISO containers such as WebM and AVI.
pub fn read_video_header(data: &[u8]) -> Result<VideoHeader> {
    let mut header = VideoHeader::default();
    let mut found_moov = false;

    for (kind, body) in BoxIter::new(data) {
        match &kind {
            b"ftyp" => {
                header.brand = body
                    .get(0..4)
                    .map(|b| String::from_utf8_lossy(b).trim_end().to_string());
            }
            b"moov" => {
                found_moov = true;
                read_moov(body, &mut header);
            }
            _ => {}
        }
    }

    if !found_moov {
        return Err(Error::InvalidInput(
            "No ISO base media movie header found".to_string(),
        ));
    }
    Ok(header)
}

fn read_moov(moov: &[u8], header: &mut VideoHeader) {
    for (kind, body) in BoxIter::new(moov) {
        match &kind {
            b"mvhd" => {
                if let Some((timescale, duration)) = parse_mvhd(body) {
                    header.timescale = Some(timescale);
                    header.duration_seconds = duration;
                }
            }
            b"trak" => {
                header.track_count += 1;
                if header.pixel_width.is_some() {
                    continue;
                }
                let dims = BoxIter::new(body)
                    .find(|(kind, _)| kind == b"tkhd")
                    .and_then(|(_, tkhd)| parse_tkhd(tkhd));
                if let Some((w, h)) = dims {
                    header.pixel_width = Some(w);
                    header.pixel_height = Some(h);
                }
            }
            _ => {}
        }
    }
}

/// Timescale and duration in seconds from a movie header.
fn parse_mvhd(body: &[u8]) -> Option<(u32, Option<f64>)> {
    let version = *body.first()?;
    let (timescale, duration) = match version {
        0 => (be_u32(body, 12)?, be_u32(body, 16).map(u64::from).filter(|d| *d != u64::from(u32::MAX))),
        1 => (be_u32(body, 20)?, be_u64(body, 24).filter(|d| *d != u64::MAX)),
        _ => return None,
    };
    if timescale == 0 {
        return Some((timescale, None));
    }
    Some((timescale, duration.map(|d| d as f64 / f64::from(timescale))))
}

/// Display width/height from a track header. Audio tracks report 0x0 and
/// yield `None`.
fn parse_tkhd(body: &[u8]) -> Option<(u32, u32)> {
    let version = *body.first()?;
    // flags(3) + times/ids/duration, then reserved(8) layer(2) group(2) volume(2) reserved(2)
    let matrix_at = match version {
        0 => 4 + 20 + 16,
        1 => 4 + 32 + 16,
        _ => return None,
    };
    let a = be_u32(body, matrix_at)? as i32;
    let b = be_u32(body, matrix_at + 4)? as i32;
    let dims_at = matrix_at + 36;
    // 16.16 fixed point
    let width = be_u32(body, dims_at)? >> 16;
    let height = be_u32(body, dims_at + 4)? >> 16;
    if width == 0 || height == 0 {
        return None;
    }
    // 90/270 degree rotation stores landscape dimensions for portrait video
    if a == 0 && b != 0 {
        Some((height, width))
    } else {
        Some((width, height))
    }
}

fn be_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn be_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Iterator over sibling boxes, yielding `(type, body)`. Stops at the first
/// malformed header.
struct BoxIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let size32 = be_u32(self.buf, start)?;
        let kind: [u8; 4] = self.buf.get(start + 4..start + 8)?.try_into().ok()?;

        let (header_len, size) = match size32 {
            // Extends to end of the enclosing buffer
            0 => (8, (self.buf.len() - start) as u64),
            // 64-bit largesize follows the type
            1 => (16, be_u64(self.buf, start + 8)?),
            n => (8, u64::from(n)),
        };

        let size = usize::try_from(size).ok()?;
        if size < header_len {
            return None;
        }
        let end = start.checked_add(size)?;
        // Truncated files still expose whatever header bytes exist
        let body_end = end.min(self.buf.len());
        let body = self.buf.get(start + header_len..body_end)?;

        self.pos = end.max(start + header_len);
        if end > self.buf.len() {
            self.pos = self.buf.len();
        }
        Some((kind, body))
    }
}
