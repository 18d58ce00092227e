//! Per-file media item and its upload state machine.
//!
//! Status only moves along `pending -> uploading -> {completed | error}`.
//! The single backward edge, `error -> pending`, exists only through
//! [`MediaItem::reset_for_retry`].

use roamlog_core::{defaults, Error, ExtractedMetadata, MediaKind, MediaStatus, Result, SourceFile};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::preview::PreviewHandle;

/// One selected file inside an ingest session.
#[derive(Debug)]
pub struct MediaItem {
    id: Uuid,
    source: SourceFile,
    kind: MediaKind,
    preview: Option<PreviewHandle>,
    preview_url: String,
    status: MediaStatus,
    progress: u8,
    metadata: Option<ExtractedMetadata>,
    remote_asset_id: Option<Uuid>,
    error_reason: Option<String>,
    status_history: Vec<MediaStatus>,
}

impl MediaItem {
    /// A freshly validated item. Starts `pending` and owns its preview.
    pub fn new(source: SourceFile, kind: MediaKind, preview: PreviewHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            kind,
            preview_url: preview.url().to_string(),
            preview: Some(preview),
            status: MediaStatus::Pending,
            progress: 0,
            metadata: None,
            remote_asset_id: None,
            error_reason: None,
            status_history: vec![MediaStatus::Pending],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn filename(&self) -> &str {
        &self.source.name
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn status(&self) -> MediaStatus {
        self.status
    }

    /// Upload progress 0-100. Only meaningful while `uploading`.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn metadata(&self) -> Option<&ExtractedMetadata> {
        self.metadata.as_ref()
    }

    pub fn remote_asset_id(&self) -> Option<Uuid> {
        self.remote_asset_id
    }

    pub fn error_reason(&self) -> Option<&str> {
        self.error_reason.as_deref()
    }

    /// Every status the item has been in, oldest first.
    pub fn status_history(&self) -> &[MediaStatus] {
        &self.status_history
    }

    /// URL of the item's preview. Kept after release for diagnostics.
    pub fn preview_url(&self) -> &str {
        &self.preview_url
    }

    pub fn has_live_preview(&self) -> bool {
        self.preview.is_some()
    }

    fn advance(&mut self, to: MediaStatus) -> Result<()> {
        if !self.status.can_advance_to(to) {
            return Err(Error::InvalidTransition {
                item_id: self.id,
                from: self.status,
                to,
            });
        }
        trace!(item_id = %self.id, from = %self.status, status = %to, "Media item transition");
        self.status = to;
        self.status_history.push(to);
        Ok(())
    }

    /// `pending -> uploading`.
    pub fn begin_upload(&mut self) -> Result<()> {
        self.advance(MediaStatus::Uploading)?;
        self.progress = 0;
        Ok(())
    }

    /// Record an upload milestone.
    ///
    /// Ignored outside `uploading` and when it would move progress
    /// backwards. Returns whether the value changed.
    pub fn record_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(defaults::PROGRESS_RECORD_PERSISTED);
        if self.status != MediaStatus::Uploading || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// `uploading -> completed`, setting the remote asset id with it.
    pub fn complete(&mut self, asset_id: Uuid) -> Result<()> {
        self.advance(MediaStatus::Completed)?;
        self.remote_asset_id = Some(asset_id);
        self.progress = defaults::PROGRESS_RECORD_PERSISTED;
        Ok(())
    }

    /// `uploading -> error`. Partial progress is discarded.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.advance(MediaStatus::Error)?;
        self.error_reason = Some(reason.into());
        self.progress = 0;
        Ok(())
    }

    /// Explicit retry: `error -> pending`. Any other state is refused.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if self.status != MediaStatus::Error {
            return Err(Error::InvalidTransition {
                item_id: self.id,
                from: self.status,
                to: MediaStatus::Pending,
            });
        }
        self.status = MediaStatus::Pending;
        self.status_history.push(MediaStatus::Pending);
        self.error_reason = None;
        self.progress = 0;
        Ok(())
    }

    /// Attach extraction output. Allowed exactly once.
    pub fn attach_metadata(&mut self, metadata: ExtractedMetadata) -> Result<()> {
        if self.metadata.is_some() {
            return Err(Error::MetadataAlreadySet(self.id));
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Release the preview. A second call is reported, not repeated.
    pub fn release_preview(&mut self) -> Result<()> {
        match self.preview.take() {
            Some(handle) => handle.release(),
            None => {
                warn!(item_id = %self.id, url = %self.preview_url, "Preview already released for media item");
                Err(Error::PreviewReleased(self.preview_url.clone()))
            }
        }
    }
}
