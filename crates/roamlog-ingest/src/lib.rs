//! # roamlog-ingest
//!
//! The media ingest session for a journal-entry form.
//!
//! - [`IngestSession`] owns the batch of [`MediaItem`]s: intake through the
//!   file validator, concurrent metadata extraction, auto-fill of the form,
//!   removal, retry and close.
//! - [`MetadataExtractor`] reads embedded tags and container headers and
//!   enriches coordinates with a place name.
//! - [`UploadOrchestrator`] drains pending items into blob storage and the
//!   media asset repository with per-item failure isolation.
//! - [`PreviewRegistry`] hands out preview handles that are released exactly
//!   once.
//!
//! ```ignore
//! let mut session = IngestSession::new(trip_id, FormState::new(today), extractor);
//! let outcome = session.add_files(files).await;
//! let report = orchestrator.drain(&mut session).await;
//! let summary = session.submit();
//! ```

pub mod events;
pub mod extractor;
pub mod media_item;
pub mod orchestrator;
pub mod preview;
pub mod session;

pub use events::{EventEnvelope, IngestEvent, IngestEventBus};
pub use extractor::MetadataExtractor;
pub use media_item::MediaItem;
pub use orchestrator::{CompletedUpload, DrainReport, FailedUpload, UploadConfig, UploadOrchestrator};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use session::{BatchOutcome, IngestSession, Rejection, SessionSummary};
