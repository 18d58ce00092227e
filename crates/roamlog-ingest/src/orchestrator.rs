//! Upload orchestrator: drains a session's pending items.
//!
//! Each item is uploaded by its own task (store binary, then create the
//! remote record). Tasks only report back; the session is mutated solely by
//! the drain loop, so an item's status always has exactly one writer. A
//! failing or panicking task marks its own item `error` and the drain
//! carries on with the rest. Dropping a drain mid-way detaches its tasks
//! rather than aborting them, and marks every item it left `uploading` as
//! `error` so it can be retried.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use roamlog_core::{
    defaults, detect_content_type, object_path, BlobStorage, ExtractedMetadata, MediaAssetRepository,
    MediaKind, MediaStatus, NewMediaAsset, Result, SourceFile,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::events::IngestEvent;
use crate::session::IngestSession;

/// Upload settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Storage bucket binaries are written to.
    pub bucket: String,
    /// Items uploading at the same time.
    pub max_concurrent: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: defaults::MEDIA_BUCKET.to_string(),
            max_concurrent: defaults::UPLOAD_MAX_CONCURRENT,
        }
    }
}

impl UploadConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ROAMLOG_MEDIA_BUCKET` | `journal-media` |
    /// | `ROAMLOG_UPLOAD_CONCURRENCY` | 3 |
    pub fn from_env() -> Self {
        let bucket = std::env::var(defaults::ENV_MEDIA_BUCKET)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::MEDIA_BUCKET.to_string());

        let max_concurrent = std::env::var(defaults::ENV_UPLOAD_CONCURRENCY)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::UPLOAD_MAX_CONCURRENT)
            .max(1);

        Self {
            bucket,
            max_concurrent,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set maximum concurrent uploads. 1 drains sequentially.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

/// An item that reached `completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedUpload {
    pub item_id: Uuid,
    pub filename: String,
    pub asset_id: Uuid,
    pub url: String,
}

/// An item that ended in `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedUpload {
    pub item_id: Uuid,
    pub filename: String,
    pub error: String,
}

/// Outcome of one drain. Failures never hide the successes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    pub completed: Vec<CompletedUpload>,
    pub failed: Vec<FailedUpload>,
}

impl DrainReport {
    /// Remote asset ids of the completed items.
    pub fn asset_ids(&self) -> Vec<Uuid> {
        self.completed.iter().map(|c| c.asset_id).collect()
    }

    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Some, but not all, uploads failed.
    pub fn is_partial(&self) -> bool {
        !self.completed.is_empty() && !self.failed.is_empty()
    }

    /// Uploads were attempted and none completed.
    pub fn all_failed(&self) -> bool {
        self.completed.is_empty() && !self.failed.is_empty()
    }
}

/// Everything an upload task needs, detached from the session.
struct UploadJob {
    item_id: Uuid,
    trip_id: Uuid,
    journal_entry_id: Option<Uuid>,
    kind: MediaKind,
    source: SourceFile,
    metadata: Option<ExtractedMetadata>,
}

struct Uploaded {
    asset_id: Uuid,
    url: String,
}

type Progress = (Uuid, u8);
type TaskOutcome = (Uuid, std::result::Result<Uploaded, String>);

enum Step {
    Progress(Progress),
    Joined(std::result::Result<TaskOutcome, tokio::task::JoinError>),
}

/// In-flight state of one drain.
///
/// On drop the upload tasks are detached, not aborted, and any dispatched
/// item still `uploading` is failed so the session never keeps an item that
/// nothing will finish.
struct DrainState<'a> {
    session: &'a mut IngestSession,
    tasks: JoinSet<TaskOutcome>,
    dispatched: Vec<Uuid>,
}

impl DrainState<'_> {
    /// Fail every dispatched item that is still `uploading`.
    fn settle(&mut self, reason: &str, report: &mut DrainReport) {
        for item_id in std::mem::take(&mut self.dispatched) {
            let still_uploading = self
                .session
                .get(item_id)
                .is_some_and(|item| item.status() == MediaStatus::Uploading);
            if still_uploading {
                finish(self.session, item_id, Err(reason.to_string()), report);
            }
        }
    }
}

impl Drop for DrainState<'_> {
    fn drop(&mut self) {
        if self.dispatched.is_empty() {
            return;
        }
        let in_flight = self.tasks.len();
        self.tasks.detach_all();
        let mut report = DrainReport::default();
        self.settle("Upload interrupted", &mut report);
        if !report.failed.is_empty() {
            warn!(
                interrupted = report.failed.len(),
                detached_tasks = in_flight,
                "Upload drain dropped before finishing"
            );
        }
    }
}

/// Drives pending media items through storage and record persistence.
pub struct UploadOrchestrator {
    storage: Arc<dyn BlobStorage>,
    assets: Arc<dyn MediaAssetRepository>,
    config: UploadConfig,
}

impl UploadOrchestrator {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        assets: Arc<dyn MediaAssetRepository>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            assets,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload every item currently `pending` in the session.
    ///
    /// Items are started in selection order with at most
    /// `max_concurrent` in flight. Completion order is unspecified.
    #[instrument(skip_all, fields(session_id = %session.id(), trip_id = %session.trip_id()))]
    pub async fn drain(&self, session: &mut IngestSession) -> DrainReport {
        let start = Instant::now();
        let mut queue: VecDeque<Uuid> = session.pending_ids().into();
        let mut report = DrainReport::default();
        if queue.is_empty() {
            debug!("Nothing to upload");
            return report;
        }
        info!(
            pending = queue.len(),
            max_concurrent = self.config.max_concurrent,
            "Upload drain started"
        );

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
        let mut drain = DrainState {
            session,
            tasks: JoinSet::new(),
            dispatched: Vec::new(),
        };

        loop {
            while drain.tasks.len() < self.config.max_concurrent {
                let Some(item_id) = queue.pop_front() else {
                    break;
                };
                if let Some(job) = self.begin(drain.session, item_id) {
                    drain.dispatched.push(item_id);
                    self.spawn_upload(&mut drain.tasks, job, progress_tx.clone());
                }
            }

            if drain.tasks.is_empty() {
                break;
            }

            let step = tokio::select! {
                biased;
                Some(progress) = progress_rx.recv() => Step::Progress(progress),
                Some(joined) = drain.tasks.join_next() => Step::Joined(joined),
                else => break,
            };
            match step {
                Step::Progress((item_id, progress)) => on_progress(drain.session, item_id, progress),
                Step::Joined(Ok((item_id, outcome))) => {
                    finish(drain.session, item_id, outcome, &mut report)
                }
                Step::Joined(Err(e)) => warn!(error = %e, "Upload task did not finish"),
            }
        }

        // Tasks that died without reporting leave their item uploading.
        drain.settle("Upload task aborted", &mut report);
        drop(drain);

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload drain finished"
        );
        report
    }

    /// Move one item to `uploading` and detach what its task needs.
    fn begin(&self, session: &mut IngestSession, item_id: Uuid) -> Option<UploadJob> {
        let trip_id = session.trip_id();
        let journal_entry_id = session.journal_entry_id();
        let item = match session.item_mut(item_id) {
            Ok(item) => item,
            Err(e) => {
                debug!(item_id = %item_id, error = %e, "Skipping item that left the session");
                return None;
            }
        };
        if let Err(e) = item.begin_upload() {
            debug!(item_id = %item_id, error = %e, "Skipping item that is no longer pending");
            return None;
        }

        let job = UploadJob {
            item_id,
            trip_id,
            journal_entry_id,
            kind: item.kind(),
            source: item.source().clone(),
            metadata: item.metadata().cloned(),
        };
        debug!(item_id = %item_id, file = %job.source.name, kind = %job.kind, "Upload started");
        session.events().emit(IngestEvent::UploadStarted { item_id });
        Some(job)
    }

    fn spawn_upload(
        &self,
        tasks: &mut JoinSet<TaskOutcome>,
        job: UploadJob,
        progress: mpsc::UnboundedSender<Progress>,
    ) {
        let storage = Arc::clone(&self.storage);
        let assets = Arc::clone(&self.assets);
        let bucket = self.config.bucket.clone();
        let item_id = job.item_id;

        tasks.spawn(async move {
            let upload = upload_one(storage, assets, &bucket, job, &progress);
            let outcome = match AssertUnwindSafe(upload).catch_unwind().await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("Upload task panicked".to_string()),
            };
            (item_id, outcome)
        });
    }
}

/// Store the binary, then create the record that references it.
async fn upload_one(
    storage: Arc<dyn BlobStorage>,
    assets: Arc<dyn MediaAssetRepository>,
    bucket: &str,
    job: UploadJob,
    progress: &mpsc::UnboundedSender<Progress>,
) -> Result<Uploaded> {
    let item_id = job.item_id;
    let report = |value: u8| {
        let _ = progress.send((item_id, value));
    };

    report(defaults::PROGRESS_TRANSFER_STARTED);
    let path = object_path(&job.trip_id, &job.source.name);
    let content_type = detect_content_type(&job.source, job.kind);
    let stored = storage
        .store(bucket, &path, job.source.data.clone(), &content_type)
        .await?;
    report(defaults::PROGRESS_TRANSFER_ACKNOWLEDGED);

    let url = storage.public_url(bucket, &stored);
    let metadata = job.metadata.unwrap_or_default();
    let record = NewMediaAsset {
        trip_id: job.trip_id,
        journal_entry_id: job.journal_entry_id,
        kind: job.kind,
        url: url.clone(),
        storage_path: stored,
        filename: job.source.name.clone(),
        content_type,
        captured_at: metadata.captured_at,
        latitude: metadata.latitude(),
        longitude: metadata.longitude(),
        place_name: metadata.place_name,
        pixel_width: metadata.pixel_width,
        pixel_height: metadata.pixel_height,
        duration_seconds: metadata.duration_seconds,
        size_bytes: Some(job.source.size_bytes),
        camera: metadata.camera,
        raw: metadata.raw,
    };
    let asset_id = assets.create_media_asset(record).await?;
    report(defaults::PROGRESS_RECORD_PERSISTED);

    Ok(Uploaded { asset_id, url })
}

fn on_progress(session: &mut IngestSession, item_id: Uuid, progress: u8) {
    let Ok(item) = session.item_mut(item_id) else {
        return;
    };
    if item.record_progress(progress) {
        trace!(item_id = %item_id, progress, "Upload progress");
        session
            .events()
            .emit(IngestEvent::UploadProgress { item_id, progress });
    }
}

fn finish(
    session: &mut IngestSession,
    item_id: Uuid,
    outcome: std::result::Result<Uploaded, String>,
    report: &mut DrainReport,
) {
    let Ok(item) = session.item_mut(item_id) else {
        warn!(item_id = %item_id, "Finished upload for unknown media item");
        return;
    };
    let filename = item.filename().to_string();

    let event = match outcome {
        Ok(uploaded) => match item.complete(uploaded.asset_id) {
            Ok(()) => {
                info!(item_id = %item_id, file = %filename, asset_id = %uploaded.asset_id, "Upload completed");
                report.completed.push(CompletedUpload {
                    item_id,
                    filename,
                    asset_id: uploaded.asset_id,
                    url: uploaded.url,
                });
                IngestEvent::UploadCompleted {
                    item_id,
                    asset_id: uploaded.asset_id,
                }
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Upload result dropped");
                return;
            }
        },
        Err(reason) => match item.fail(reason.clone()) {
            Ok(()) => {
                error!(item_id = %item_id, file = %filename, error = %reason, "Upload failed");
                report.failed.push(FailedUpload {
                    item_id,
                    filename,
                    error: reason.clone(),
                });
                IngestEvent::UploadFailed {
                    item_id,
                    error: reason,
                }
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Upload failure dropped");
                return;
            }
        },
    };
    session.events().emit(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_config_default() {
        let config = UploadConfig::default();
        assert_eq!(config.bucket, "journal-media");
        assert_eq!(config.max_concurrent, 3);
    }

    #[test]
    fn test_upload_config_builders() {
        let config = UploadConfig::default()
            .with_bucket("media")
            .with_max_concurrent(0);
        assert_eq!(config.bucket, "media");
        assert_eq!(config.max_concurrent, 1);
    }

    #[test]
    fn test_drain_report_classification() {
        let ok = CompletedUpload {
            item_id: Uuid::new_v4(),
            filename: "a.jpg".to_string(),
            asset_id: Uuid::new_v4(),
            url: "http://x/a.jpg".to_string(),
        };
        let bad = FailedUpload {
            item_id: Uuid::new_v4(),
            filename: "b.jpg".to_string(),
            error: "Storage error: quota".to_string(),
        };

        let empty = DrainReport::default();
        assert!(!empty.all_failed() && !empty.is_partial());

        let partial = DrainReport {
            completed: vec![ok.clone()],
            failed: vec![bad.clone()],
        };
        assert!(partial.is_partial());
        assert_eq!(partial.asset_ids(), vec![ok.asset_id]);
        assert_eq!(partial.attempted(), 2);

        let failed = DrainReport {
            completed: vec![],
            failed: vec![bad],
        };
        assert!(failed.all_failed());
    }
}
