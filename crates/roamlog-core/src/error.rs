//! Error types for roamlog.

use thiserror::Error;

use crate::models::MediaStatus;

/// Result type alias using roamlog's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for roamlog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Media item not found in the ingest session
    #[error("Media item not found: {0}")]
    MediaItemNotFound(uuid::Uuid),

    /// A media item was asked to move along an edge its state machine does not have
    #[error("Invalid status transition for {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: uuid::Uuid,
        from: MediaStatus,
        to: MediaStatus,
    },

    /// Extracted metadata may only be attached once
    #[error("Metadata already attached to media item {0}")]
    MetadataAlreadySet(uuid::Uuid),

    /// Preview handle released more than once, or never issued
    #[error("Preview already released: {0}")]
    PreviewReleased(String),

    /// Binary storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote record persistence failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
