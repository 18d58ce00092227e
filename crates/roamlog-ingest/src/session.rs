//! Ingest session: the single owner of a form's media items.
//!
//! Intake, removal, retry and every status change go through the session.
//! Observers subscribe to its [`IngestEventBus`] and never mutate items.

use std::time::Instant;

use roamlog_core::{
    propose, AutoFillProposal, CandidatePolicy, Error, ExtractedMetadata, FileValidator, FormState,
    MediaKind, MediaStatus, Result, SourceFile, Validation,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::events::{EventEnvelope, IngestEvent, IngestEventBus};
use crate::extractor::MetadataExtractor;
use crate::media_item::MediaItem;
use crate::preview::PreviewRegistry;

/// A file that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub filename: String,
    pub reason: String,
}

/// Result of adding one batch of files.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Ids of the new items, in selection order.
    pub added: Vec<Uuid>,
    pub rejected: Vec<Rejection>,
    /// What was auto-filled into the form for this batch.
    pub proposal: AutoFillProposal,
}

/// Final state of a closed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub submitted: bool,
    /// Remote asset ids of completed items, in item order.
    pub asset_ids: Vec<Uuid>,
    /// Items that had not completed when the session closed.
    pub unfinished: Vec<String>,
    pub previews_released: usize,
}

/// One journal-entry form's media ingest.
pub struct IngestSession {
    id: Uuid,
    trip_id: Uuid,
    journal_entry_id: Option<Uuid>,
    form: FormState,
    validator: FileValidator,
    extractor: MetadataExtractor,
    policy: CandidatePolicy,
    previews: PreviewRegistry,
    events: IngestEventBus,
    items: Vec<MediaItem>,
    closed: bool,
}

impl IngestSession {
    pub fn new(trip_id: Uuid, form: FormState, extractor: MetadataExtractor) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            trip_id,
            journal_entry_id: None,
            form,
            validator: FileValidator::default(),
            extractor,
            policy: CandidatePolicy::default(),
            previews: PreviewRegistry::new(),
            events: IngestEventBus::new(id, roamlog_core::defaults::EVENT_BUS_CAPACITY),
            items: Vec::new(),
            closed: false,
        }
    }

    pub fn with_validator(mut self, validator: FileValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_policy(mut self, policy: CandidatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_journal_entry(mut self, journal_entry_id: Uuid) -> Self {
        self.journal_entry_id = Some(journal_entry_id);
        self
    }

    /// Use a shared preview registry, e.g. one owned by the UI.
    pub fn with_previews(mut self, previews: PreviewRegistry) -> Self {
        self.previews = previews;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn trip_id(&self) -> Uuid {
        self.trip_id
    }

    pub fn journal_entry_id(&self) -> Option<Uuid> {
        self.journal_entry_id
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    /// The form, for user edits between batches.
    pub fn form_mut(&mut self) -> &mut FormState {
        &mut self.form
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn get(&self, item_id: Uuid) -> Option<&MediaItem> {
        self.items.iter().find(|i| i.id() == item_id)
    }

    /// Ids of items waiting to upload, in selection order.
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.items
            .iter()
            .filter(|i| i.status() == MediaStatus::Pending)
            .map(|i| i.id())
            .collect()
    }

    /// Remote asset ids of completed items, in selection order.
    pub fn completed_asset_ids(&self) -> Vec<Uuid> {
        self.items.iter().filter_map(|i| i.remote_asset_id()).collect()
    }

    pub(crate) fn item_mut(&mut self, item_id: Uuid) -> Result<&mut MediaItem> {
        self.items
            .iter_mut()
            .find(|i| i.id() == item_id)
            .ok_or(Error::MediaItemNotFound(item_id))
    }

    pub(crate) fn events(&self) -> &IngestEventBus {
        &self.events
    }

    /// Add one user selection.
    ///
    /// Rejected files never become items. Accepted files enter `pending`
    /// immediately, extraction runs concurrently for the whole batch, and
    /// the auto-fill proposal is computed once every item's extraction has
    /// finished.
    #[instrument(skip_all, fields(session_id = %self.id, trip_id = %self.trip_id, files = files.len()))]
    pub async fn add_files(&mut self, files: Vec<SourceFile>) -> BatchOutcome {
        let start = Instant::now();
        let mut added = Vec::new();
        let mut rejected = Vec::new();
        let mut to_extract: Vec<(SourceFile, MediaKind)> = Vec::new();

        for file in files {
            match self.validator.validate(&file) {
                Validation::Accepted { kind } => {
                    let preview = self.previews.acquire(&file);
                    let item = MediaItem::new(file.clone(), kind, preview);
                    let item_id = item.id();
                    debug!(item_id = %item_id, file = %file.name, %kind, "File accepted");
                    self.events.emit(IngestEvent::ItemAdded {
                        item_id,
                        filename: file.name.clone(),
                        kind,
                    });
                    self.items.push(item);
                    added.push(item_id);
                    to_extract.push((file, kind));
                }
                Validation::Rejected { reason } => {
                    debug!(file = %file.name, reason = %reason, "File rejected");
                    self.events.emit(IngestEvent::ItemRejected {
                        filename: file.name.clone(),
                        reason: reason.to_string(),
                    });
                    rejected.push(Rejection {
                        filename: file.name,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let extracted = self.extractor.extract_batch(&to_extract).await;
        let mut batch: Vec<ExtractedMetadata> = Vec::with_capacity(extracted.len());
        for (item_id, metadata) in added.iter().copied().zip(extracted) {
            self.attach(item_id, metadata.clone());
            batch.push(metadata);
        }

        let proposal = propose(&batch, &self.form, self.policy);
        if !proposal.is_empty() {
            self.form.apply(&proposal);
            self.events.emit(IngestEvent::AutoFilled {
                fields: proposal.filled_fields.iter().copied().collect(),
            });
        }

        info!(
            added = added.len(),
            rejected = rejected.len(),
            auto_filled = %proposal.summary(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch added"
        );

        BatchOutcome {
            added,
            rejected,
            proposal,
        }
    }

    fn attach(&mut self, item_id: Uuid, metadata: ExtractedMetadata) {
        let event = IngestEvent::MetadataExtracted {
            item_id,
            has_captured_at: metadata.captured_at.is_some(),
            has_location: metadata.has_location(),
            place_name: metadata.place_name.clone(),
        };
        match self.item_mut(item_id).and_then(|item| item.attach_metadata(metadata)) {
            Ok(()) => self.events.emit(event),
            Err(e) => debug!(item_id = %item_id, error = %e, "Extracted metadata not attached"),
        }
    }

    /// Remove an item that is not uploading and release its preview.
    pub fn remove(&mut self, item_id: Uuid) -> Result<()> {
        let index = self
            .items
            .iter()
            .position(|i| i.id() == item_id)
            .ok_or(Error::MediaItemNotFound(item_id))?;
        if self.items[index].status() == MediaStatus::Uploading {
            return Err(Error::InvalidInput(format!(
                "Media item {} is uploading and cannot be removed",
                item_id
            )));
        }

        let mut item = self.items.remove(index);
        if let Err(e) = item.release_preview() {
            warn!(item_id = %item_id, error = %e, "Preview release failed on removal");
        }
        debug!(item_id = %item_id, file = %item.filename(), "Media item removed");
        self.events.emit(IngestEvent::ItemRemoved { item_id });
        Ok(())
    }

    /// Explicitly reset one failed item to `pending`.
    pub fn retry(&mut self, item_id: Uuid) -> Result<()> {
        self.item_mut(item_id)?.reset_for_retry()?;
        debug!(item_id = %item_id, "Media item queued for retry");
        self.events.emit(IngestEvent::ItemRetried { item_id });
        Ok(())
    }

    /// Close the session after the form was saved.
    pub fn submit(self) -> SessionSummary {
        self.close(true)
    }

    /// Close the session without saving.
    pub fn cancel(self) -> SessionSummary {
        self.close(false)
    }

    fn close(mut self, submitted: bool) -> SessionSummary {
        let previews_released = self.release_all();
        let summary = SessionSummary {
            session_id: self.id,
            submitted,
            asset_ids: self.completed_asset_ids(),
            unfinished: self
                .items
                .iter()
                .filter(|i| i.status() != MediaStatus::Completed)
                .map(|i| i.filename().to_string())
                .collect(),
            previews_released,
        };
        self.closed = true;
        self.events.emit(IngestEvent::SessionClosed {
            submitted,
            previews_released,
        });
        info!(
            session_id = %self.id,
            submitted,
            completed = summary.asset_ids.len(),
            unfinished = summary.unfinished.len(),
            previews_released,
            "Ingest session closed"
        );
        summary
    }

    fn release_all(&mut self) -> usize {
        let mut released = 0;
        for item in self.items.iter_mut().filter(|i| i.has_live_preview()) {
            match item.release_preview() {
                Ok(()) => released += 1,
                Err(e) => warn!(item_id = %item.id(), error = %e, "Preview release failed"),
            }
        }
        released
    }
}

impl Drop for IngestSession {
    fn drop(&mut self) {
        if !self.closed {
            let released = self.release_all();
            if released > 0 {
                debug!(session_id = %self.id, previews_released = released, "Ingest session dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use roamlog_core::{FieldOrigin, ValidatorConfig};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn session() -> IngestSession {
        IngestSession::new(
            Uuid::new_v4(),
            FormState::new(today()),
            MetadataExtractor::without_geocoding(),
        )
    }

    fn jpeg(name: &str) -> SourceFile {
        SourceFile::new(name, vec![0xFF, 0xD8, 0xFF, 0xE0]).with_content_type("image/jpeg")
    }

    #[tokio::test]
    async fn test_add_files_splits_accepted_and_rejected() {
        let mut session = session().with_validator(FileValidator::new(
            ValidatorConfig::default().with_max_photo_bytes(3),
        ));
        let outcome = session
            .add_files(vec![
                SourceFile::new("a.jpg", vec![1, 2]).with_content_type("image/jpeg"),
                SourceFile::new("notes.txt", vec![1]).with_content_type("text/plain"),
                SourceFile::new("big.jpg", vec![0; 4]).with_content_type("image/jpeg"),
            ])
            .await;

        assert_eq!(outcome.added.len(), 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].filename, "notes.txt");
        assert!(outcome.rejected[1].reason.contains("size limit"));
        assert_eq!(session.items().len(), 1);
        assert_eq!(session.previews().live_count(), 1);

        let item = session.get(outcome.added[0]).unwrap();
        assert_eq!(item.status(), MediaStatus::Pending);
        assert!(item.metadata().is_some());
    }

    #[tokio::test]
    async fn test_empty_batch_leaves_form_untouched() {
        let mut session = session();
        let outcome = session.add_files(vec![jpeg("a.jpg")]).await;
        assert!(outcome.proposal.is_empty());
        assert_eq!(session.form().date_origin, FieldOrigin::Default);
    }

    #[tokio::test]
    async fn test_remove_releases_preview() {
        let mut session = session();
        let outcome = session.add_files(vec![jpeg("a.jpg"), jpeg("b.jpg")]).await;
        let first = outcome.added[0];

        session.remove(first).unwrap();
        assert_eq!(session.items().len(), 1);
        assert_eq!(session.previews().released_count(), 1);
        assert!(matches!(session.remove(first), Err(Error::MediaItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_with_released_preview_still_emits_removal() {
        let mut session = session();
        let outcome = session.add_files(vec![jpeg("a.jpg")]).await;
        let id = outcome.added[0];
        session.item_mut(id).unwrap().release_preview().unwrap();
        let mut rx = session.subscribe();

        session.remove(id).unwrap();
        assert!(session.items().is_empty());
        assert_eq!(session.previews().released_count(), 1);
        let envelope = rx.try_recv().unwrap();
        assert!(matches!(envelope.payload, IngestEvent::ItemRemoved { item_id } if item_id == id));
    }

    #[tokio::test]
    async fn test_remove_refuses_uploading_item() {
        let mut session = session();
        let outcome = session.add_files(vec![jpeg("a.jpg")]).await;
        let id = outcome.added[0];
        session.item_mut(id).unwrap().begin_upload().unwrap();

        assert!(matches!(session.remove(id), Err(Error::InvalidInput(_))));
        assert_eq!(session.previews().live_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_only_from_error() {
        let mut session = session();
        let outcome = session.add_files(vec![jpeg("a.jpg")]).await;
        let id = outcome.added[0];
        assert!(session.retry(id).is_err());

        let item = session.item_mut(id).unwrap();
        item.begin_upload().unwrap();
        item.fail("Storage error: offline").unwrap();
        session.retry(id).unwrap();
        assert_eq!(session.pending_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_cancel_releases_all_previews() {
        let mut session = session();
        let mut rx = session.subscribe();
        session.add_files(vec![jpeg("a.jpg"), jpeg("b.jpg")]).await;
        let registry = session.previews().clone();

        let summary = session.cancel();
        assert!(!summary.submitted);
        assert_eq!(summary.previews_released, 2);
        assert_eq!(summary.unfinished, vec!["a.jpg", "b.jpg"]);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 2);

        let mut last = None;
        while let Ok(envelope) = rx.try_recv() {
            last = Some(envelope.payload);
        }
        assert!(matches!(
            last,
            Some(IngestEvent::SessionClosed {
                submitted: false,
                previews_released: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_previews() {
        let registry = PreviewRegistry::new();
        {
            let mut session = session().with_previews(registry.clone());
            session.add_files(vec![jpeg("a.jpg")]).await;
            assert_eq!(registry.live_count(), 1);
        }
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 1);
    }
}
