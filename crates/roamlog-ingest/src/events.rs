//! Ingest event types and broadcast bus.
//!
//! A UI observes a session through these events and never mutates it.
//! Every state change of a media item produces exactly one event.

use chrono::{DateTime, Utc};
use roamlog_core::{FormField, MediaKind};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Domain payload of an ingest event.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"UploadProgress","item_id":"...","progress":60}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// A validated file entered the session as `pending`.
    ItemAdded {
        item_id: Uuid,
        filename: String,
        kind: MediaKind,
    },
    /// A selected file failed validation and never became an item.
    ItemRejected { filename: String, reason: String },
    /// Extraction finished (possibly degraded) for an item.
    MetadataExtracted {
        item_id: Uuid,
        has_captured_at: bool,
        has_location: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        place_name: Option<String>,
    },
    /// Form fields were auto-filled from a batch.
    AutoFilled { fields: Vec<FormField> },
    UploadStarted { item_id: Uuid },
    UploadProgress { item_id: Uuid, progress: u8 },
    UploadCompleted { item_id: Uuid, asset_id: Uuid },
    UploadFailed { item_id: Uuid, error: String },
    /// An errored item was reset to `pending` by an explicit retry.
    ItemRetried { item_id: Uuid },
    /// An item was removed by the user and its preview released.
    ItemRemoved { item_id: Uuid },
    /// The session ended by submit or cancel.
    SessionClosed {
        submitted: bool,
        previews_released: usize,
    },
}

impl IngestEvent {
    /// Namespaced event type, e.g. `"upload.progress"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::ItemAdded { .. } => "item.added",
            IngestEvent::ItemRejected { .. } => "item.rejected",
            IngestEvent::MetadataExtracted { .. } => "item.metadata",
            IngestEvent::AutoFilled { .. } => "form.autofilled",
            IngestEvent::UploadStarted { .. } => "upload.started",
            IngestEvent::UploadProgress { .. } => "upload.progress",
            IngestEvent::UploadCompleted { .. } => "upload.completed",
            IngestEvent::UploadFailed { .. } => "upload.failed",
            IngestEvent::ItemRetried { .. } => "item.retried",
            IngestEvent::ItemRemoved { .. } => "item.removed",
            IngestEvent::SessionClosed { .. } => "session.closed",
        }
    }

    /// The media item this event relates to, if any.
    pub fn item_id(&self) -> Option<Uuid> {
        match self {
            IngestEvent::ItemAdded { item_id, .. }
            | IngestEvent::MetadataExtracted { item_id, .. }
            | IngestEvent::UploadStarted { item_id }
            | IngestEvent::UploadProgress { item_id, .. }
            | IngestEvent::UploadCompleted { item_id, .. }
            | IngestEvent::UploadFailed { item_id, .. }
            | IngestEvent::ItemRetried { item_id }
            | IngestEvent::ItemRemoved { item_id } => Some(*item_id),
            IngestEvent::ItemRejected { .. }
            | IngestEvent::AutoFilled { .. }
            | IngestEvent::SessionClosed { .. } => None,
        }
    }
}

/// Event with delivery metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// UUIDv7, so ids sort in emission order.
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub payload: IngestEvent,
}

/// Broadcast bus for one ingest session.
///
/// Slow receivers that fall behind get `Lagged` and miss events; the session
/// itself never blocks on subscribers.
#[derive(Debug, Clone)]
pub struct IngestEventBus {
    session_id: Uuid,
    tx: broadcast::Sender<EventEnvelope>,
}

impl IngestEventBus {
    /// Create a new bus with the given buffer capacity.
    pub fn new(session_id: Uuid, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { session_id, tx }
    }

    /// Emit an event to all subscribers. Dropped silently without any.
    pub fn emit(&self, event: IngestEvent) {
        let envelope = EventEnvelope {
            event_id: Uuid::now_v7(),
            event_type: event.event_type(),
            occurred_at: Utc::now(),
            session_id: self.session_id,
            payload: event,
        };
        tracing::trace!(
            event_type = envelope.event_type,
            session_id = %self.session_id,
            subscriber_count = self.tx.receiver_count(),
            "IngestEventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_subscribe() {
        let session_id = Uuid::new_v4();
        let bus = IngestEventBus::new(session_id, 32);
        let mut rx = bus.subscribe();

        let item_id = Uuid::new_v4();
        bus.emit(IngestEvent::UploadProgress {
            item_id,
            progress: 60,
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "upload.progress");
        assert_eq!(envelope.session_id, session_id);
        assert_eq!(envelope.payload.item_id(), Some(item_id));
        assert_eq!(envelope.event_id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = IngestEventBus::new(Uuid::nil(), 8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(IngestEvent::ItemRemoved {
            item_id: Uuid::nil(),
        });
        assert!(matches!(rx1.recv().await.unwrap().payload, IngestEvent::ItemRemoved { .. }));
        assert!(matches!(rx2.recv().await.unwrap().payload, IngestEvent::ItemRemoved { .. }));
    }

    #[test]
    fn test_no_subscribers_ok() {
        let bus = IngestEventBus::new(Uuid::nil(), 8);
        bus.emit(IngestEvent::AutoFilled { fields: vec![] });
    }

    #[test]
    fn test_event_serialization() {
        let event = IngestEvent::ItemAdded {
            item_id: Uuid::nil(),
            filename: "IMG_0001.JPG".to_string(),
            kind: MediaKind::Photo,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemAdded");
        assert_eq!(json["kind"], "photo");

        let metadata = IngestEvent::MetadataExtracted {
            item_id: Uuid::nil(),
            has_captured_at: true,
            has_location: false,
            place_name: None,
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("place_name").is_none());
    }

    #[test]
    fn test_session_events_have_no_item() {
        let event = IngestEvent::SessionClosed {
            submitted: true,
            previews_released: 3,
        };
        assert_eq!(event.item_id(), None);
        assert_eq!(event.event_type(), "session.closed");
    }
}
