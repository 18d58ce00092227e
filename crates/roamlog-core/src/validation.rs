//! Intake validation: classify a selected file as photo or video and
//! enforce the per-kind size ceilings.
//!
//! Classification order:
//! 1. Declared MIME type against the photo/video allow-lists
//! 2. Filename extension when the MIME type is missing or generic
//!
//! Validation never reads the payload, so it is deterministic for the same
//! file metadata.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::defaults;
use crate::models::{MediaKind, SourceFile};

/// Accepted photo MIME types.
static PHOTO_MIME_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "image/jpeg",
        "image/jpg",
        "image/pjpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/heic",
        "image/heif",
        "image/avif",
        "image/tiff",
        "image/bmp",
    ]
    .into_iter()
    .collect()
});

/// Accepted video MIME types.
static VIDEO_MIME_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "video/mp4",
        "video/quicktime",
        "video/x-m4v",
        "video/webm",
        "video/3gpp",
        "video/x-matroska",
        "video/x-msvideo",
        "video/mpeg",
    ]
    .into_iter()
    .collect()
});

/// MIME types that carry no classification and defer to the extension.
const GENERIC_MIME_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/unknown",
];

/// Map a media extension to its kind and canonical MIME type.
fn media_from_extension(ext: &str) -> Option<(MediaKind, &'static str)> {
    match ext.to_lowercase().as_str() {
        // Photos
        "jpg" | "jpeg" | "jpe" => Some((MediaKind::Photo, "image/jpeg")),
        "png" => Some((MediaKind::Photo, "image/png")),
        "gif" => Some((MediaKind::Photo, "image/gif")),
        "webp" => Some((MediaKind::Photo, "image/webp")),
        "heic" => Some((MediaKind::Photo, "image/heic")),
        "heif" => Some((MediaKind::Photo, "image/heif")),
        "avif" => Some((MediaKind::Photo, "image/avif")),
        "tif" | "tiff" => Some((MediaKind::Photo, "image/tiff")),
        "bmp" => Some((MediaKind::Photo, "image/bmp")),
        // Videos
        "mp4" => Some((MediaKind::Video, "video/mp4")),
        "m4v" => Some((MediaKind::Video, "video/x-m4v")),
        "mov" | "qt" => Some((MediaKind::Video, "video/quicktime")),
        "webm" => Some((MediaKind::Video, "video/webm")),
        "3gp" => Some((MediaKind::Video, "video/3gpp")),
        "mkv" => Some((MediaKind::Video, "video/x-matroska")),
        "avi" => Some((MediaKind::Video, "video/x-msvideo")),
        "mpg" | "mpeg" => Some((MediaKind::Video, "video/mpeg")),
        _ => None,
    }
}

/// Lowercased MIME essence with parameters (`; charset=...`) stripped.
fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn kind_from_mime(essence: &str) -> Option<MediaKind> {
    if PHOTO_MIME_TYPES.contains(essence) {
        Some(MediaKind::Photo)
    } else if VIDEO_MIME_TYPES.contains(essence) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Why a file was turned away at intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Neither the MIME type nor the extension is an accepted photo/video type.
    Unsupported {
        content_type: Option<String>,
        extension: Option<String>,
    },
    /// The file is larger than its kind's ceiling.
    TooLarge {
        kind: MediaKind,
        limit_bytes: u64,
        actual_bytes: u64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported {
                content_type,
                extension,
            } => write!(
                f,
                "Unsupported file type (type: {}, extension: {})",
                content_type.as_deref().unwrap_or("none"),
                extension.as_deref().unwrap_or("none"),
            ),
            Self::TooLarge {
                kind,
                limit_bytes,
                actual_bytes,
            } => write!(
                f,
                "{} is {} ({} bytes), over the {} {} size limit ({} bytes)",
                capitalize(kind.as_str()),
                human_size(*actual_bytes),
                actual_bytes,
                human_size(*limit_bytes),
                kind,
                limit_bytes,
            ),
        }
    }
}

/// Outcome of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted { kind: MediaKind },
    Rejected { reason: RejectReason },
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::Accepted { kind } => Some(*kind),
            Self::Rejected { .. } => None,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render a byte count as MiB/KiB with one decimal.
fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Size ceilings for the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub max_photo_bytes: u64,
    pub max_video_bytes: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: defaults::MAX_PHOTO_SIZE_BYTES,
            max_video_bytes: defaults::MAX_VIDEO_SIZE_BYTES,
        }
    }
}

impl ValidatorConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ROAMLOG_MAX_PHOTO_BYTES` | 20 MiB |
    /// | `ROAMLOG_MAX_VIDEO_BYTES` | 200 MiB |
    ///
    /// Unparseable or zero values fall back to the defaults.
    pub fn from_env() -> Self {
        let max_photo_bytes = std::env::var(defaults::ENV_MAX_PHOTO_BYTES)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults::MAX_PHOTO_SIZE_BYTES);

        let max_video_bytes = std::env::var(defaults::ENV_MAX_VIDEO_BYTES)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults::MAX_VIDEO_SIZE_BYTES);

        Self {
            max_photo_bytes,
            max_video_bytes,
        }
    }

    pub fn with_max_photo_bytes(mut self, bytes: u64) -> Self {
        self.max_photo_bytes = bytes;
        self
    }

    pub fn with_max_video_bytes(mut self, bytes: u64) -> Self {
        self.max_video_bytes = bytes;
        self
    }
}

/// Classifies selected files and enforces size ceilings.
#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    config: ValidatorConfig,
}

impl FileValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Size ceiling for a kind.
    pub fn ceiling(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Photo => self.config.max_photo_bytes,
            MediaKind::Video => self.config.max_video_bytes,
        }
    }

    /// Classify by declared MIME type, falling back to the extension when
    /// the MIME type is missing or generic.
    pub fn classify(&self, file: &SourceFile) -> Option<MediaKind> {
        let essence = file.content_type.as_deref().map(mime_essence);
        match essence.as_deref() {
            Some(mime) if !mime.is_empty() && !GENERIC_MIME_TYPES.contains(&mime) => {
                kind_from_mime(mime)
            }
            _ => file
                .extension()
                .and_then(|ext| media_from_extension(&ext))
                .map(|(kind, _)| kind),
        }
    }

    /// Validate one file. A file exactly at its ceiling is accepted.
    pub fn validate(&self, file: &SourceFile) -> Validation {
        let Some(kind) = self.classify(file) else {
            return Validation::Rejected {
                reason: RejectReason::Unsupported {
                    content_type: file.content_type.clone(),
                    extension: file.extension(),
                },
            };
        };

        let limit = self.ceiling(kind);
        if file.size_bytes > limit {
            return Validation::Rejected {
                reason: RejectReason::TooLarge {
                    kind,
                    limit_bytes: limit,
                    actual_bytes: file.size_bytes,
                },
            };
        }

        Validation::Accepted { kind }
    }
}

// =============================================================================
// CONTENT TYPE / FILENAMES
// =============================================================================

/// Content type to store an accepted file under.
///
/// A declared allow-listed MIME type wins. Otherwise magic bytes (via
/// `infer`) are tried, then the extension, then the kind's default.
pub fn detect_content_type(file: &SourceFile, kind: MediaKind) -> String {
    // 1. Declared type, when it is a concrete accepted type
    if let Some(declared) = file.content_type.as_deref().map(mime_essence) {
        if kind_from_mime(&declared) == Some(kind) {
            return declared;
        }
    }

    // 2. Magic bytes, only when they agree with the kind
    if let Some(inferred) = infer::get(&file.data) {
        if kind_from_mime(inferred.mime_type()) == Some(kind) {
            return inferred.mime_type().to_string();
        }
    }

    // 3. Extension
    if let Some((ext_kind, mime)) = file.extension().and_then(|e| media_from_extension(&e)) {
        if ext_kind == kind {
            return mime.to_string();
        }
    }

    // 4. Kind default
    kind.default_content_type().to_string()
}

/// Sanitize a filename for use in storage object paths.
pub fn sanitize_filename(filename: &str) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    // Replace dangerous characters
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    let max = defaults::FILENAME_MAX_LENGTH;
    if sanitized.chars().count() <= max {
        return sanitized.to_string();
    }

    // Truncate on char boundaries, preserving a short extension
    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() < 16 => {
            let keep = max - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        _ => sanitized.chars().take(max).collect(),
    }
}

/// Storage object path for an upload: `{trip_id}/{uuidv7}.{ext}`.
///
/// The extension comes from the sanitized filename, or `bin` when it has
/// none usable. Paths never collide within a trip.
pub fn object_path(trip_id: &Uuid, filename: &str) -> String {
    let name = sanitize_filename(filename);
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());

    format!("{}/{}.{}", trip_id.as_hyphenated(), Uuid::now_v7(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(name: &str, content_type: Option<&str>, size: usize) -> SourceFile {
        let file = SourceFile::new(name, vec![0u8; size]);
        match content_type {
            Some(ct) => file.with_content_type(ct),
            None => file,
        }
    }

    fn small_limits() -> FileValidator {
        FileValidator::new(
            ValidatorConfig::default()
                .with_max_photo_bytes(1_000)
                .with_max_video_bytes(5_000),
        )
    }

    #[test]
    fn test_classifies_by_mime() {
        let v = FileValidator::default();
        assert_eq!(v.classify(&sized("a", Some("image/png"), 1)), Some(MediaKind::Photo));
        assert_eq!(v.classify(&sized("a", Some("video/quicktime"), 1)), Some(MediaKind::Video));
        assert_eq!(
            v.classify(&sized("a", Some("image/jpeg; charset=binary"), 1)),
            Some(MediaKind::Photo)
        );
    }

    #[test]
    fn test_generic_mime_falls_back_to_extension() {
        let v = FileValidator::default();
        let mov = sized("IMG_0420.MOV", Some("application/octet-stream"), 10);
        assert_eq!(v.validate(&mov), Validation::Accepted { kind: MediaKind::Video });

        let heic = sized("IMG_0421.heic", None, 10);
        assert_eq!(v.validate(&heic), Validation::Accepted { kind: MediaKind::Photo });
    }

    #[test]
    fn test_concrete_non_media_mime_is_unsupported() {
        let v = FileValidator::default();
        let result = v.validate(&sized("trip.jpg", Some("application/pdf"), 10));
        assert!(matches!(
            result,
            Validation::Rejected {
                reason: RejectReason::Unsupported { .. }
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_types() {
        let v = FileValidator::default();
        let result = v.validate(&sized("notes.txt", Some("text/plain"), 10));
        assert!(!result.is_accepted());

        let no_ext = v.validate(&sized("README", None, 10));
        assert!(matches!(
            no_ext,
            Validation::Rejected {
                reason: RejectReason::Unsupported { extension: None, .. }
            }
        ));
    }

    #[test]
    fn test_file_at_ceiling_is_accepted() {
        let v = small_limits();
        assert!(v.validate(&sized("a.jpg", Some("image/jpeg"), 1_000)).is_accepted());
        assert!(v.validate(&sized("a.mp4", Some("video/mp4"), 5_000)).is_accepted());
    }

    #[test]
    fn test_file_over_ceiling_is_rejected_with_reason() {
        let v = small_limits();
        let result = v.validate(&sized("a.jpg", Some("image/jpeg"), 1_001));
        let Validation::Rejected { reason } = result else {
            panic!("expected rejection");
        };
        assert_eq!(
            reason,
            RejectReason::TooLarge {
                kind: MediaKind::Photo,
                limit_bytes: 1_000,
                actual_bytes: 1_001
            }
        );
        let msg = reason.to_string();
        assert!(msg.contains("photo size limit"));
        assert!(msg.contains("1000 bytes"));
        assert!(msg.contains("1001 bytes"));
    }

    #[test]
    fn test_ceilings_are_per_kind() {
        let v = small_limits();
        // Too big for a photo, fine for a video.
        assert!(!v.validate(&sized("a.png", None, 2_000)).is_accepted());
        assert!(v.validate(&sized("a.webm", None, 2_000)).is_accepted());
    }

    #[test]
    fn test_default_photo_ceiling_boundary() {
        let v = FileValidator::default();
        let limit = defaults::MAX_PHOTO_SIZE_BYTES as usize;
        assert!(v.validate(&sized("big.jpg", None, limit)).is_accepted());
        let over = v.validate(&sized("big.jpg", None, limit + 1));
        let Validation::Rejected { reason } = over else {
            panic!("expected rejection");
        };
        assert!(reason.to_string().contains("20.0 MiB photo size limit"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let v = FileValidator::default();
        let file = sized("a.gif", None, 5);
        assert_eq!(v.validate(&file), v.validate(&file));
    }

    #[test]
    fn test_detect_prefers_declared_type() {
        let file = sized("a.bin", Some("image/webp"), 4);
        assert_eq!(detect_content_type(&file, MediaKind::Photo), "image/webp");
    }

    #[test]
    fn test_detect_jpeg_magic_bytes() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
        let file = SourceFile::new("upload", jpeg).with_content_type("application/octet-stream");
        assert_eq!(detect_content_type(&file, MediaKind::Photo), "image/jpeg");
    }

    #[test]
    fn test_detect_falls_back_to_extension_then_default() {
        let mov = sized("clip.mov", None, 8);
        assert_eq!(detect_content_type(&mov, MediaKind::Video), "video/quicktime");

        let unnamed = sized("clip", None, 8);
        assert_eq!(detect_content_type(&unnamed, MediaKind::Video), "video/mp4");
    }

    #[test]
    fn test_sanitize_strips_paths_and_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\IMG:1.jpg"), "IMG_1.jpg");
        assert_eq!(sanitize_filename("a<b>c?.png"), "a_b_c_.png");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
        assert_eq!(sanitize_filename("..."), "unnamed_file");
    }

    #[test]
    fn test_sanitize_truncates_preserving_extension() {
        let long = format!("{}.jpeg", "é".repeat(400));
        let result = sanitize_filename(&long);
        assert_eq!(result.chars().count(), defaults::FILENAME_MAX_LENGTH);
        assert!(result.ends_with(".jpeg"));
    }

    #[test]
    fn test_reject_reason_unsupported_display() {
        let reason = RejectReason::Unsupported {
            content_type: Some("text/plain".to_string()),
            extension: None,
        };
        assert_eq!(
            reason.to_string(),
            "Unsupported file type (type: text/plain, extension: none)"
        );
    }

    #[test]
    fn test_object_path_format() {
        let trip = Uuid::new_v4();
        let path = object_path(&trip, "Holiday Pic.JPEG");
        let (dir, file) = path.split_once('/').unwrap();
        assert_eq!(dir, trip.to_string());
        let (stem, ext) = file.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpeg");
        assert_eq!(Uuid::parse_str(stem).unwrap().get_version_num(), 7);
    }

    #[test]
    fn test_object_path_without_usable_extension() {
        let trip = Uuid::new_v4();
        assert!(object_path(&trip, "README").ends_with(".bin"));
        assert!(object_path(&trip, "../../x.j?g").ends_with(".bin"));
        assert_ne!(object_path(&trip, "a.jpg"), object_path(&trip, "a.jpg"));
    }
}
