//! # roamlog-storage
//!
//! Local implementations of roamlog's binary storage and record
//! persistence capabilities: a filesystem blob store with public-URL
//! mapping and an append-only JSON-lines media asset ledger.

pub mod config;
pub mod filesystem;
pub mod ledger;

pub use config::StorageConfig;
pub use filesystem::FilesystemStorage;
pub use ledger::JsonlAssetRepository;
