//! Append-only JSON-lines media asset ledger.
//!
//! One `MediaAsset` per line. Appends are serialised through an async
//! mutex so concurrent uploads never interleave partial lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use roamlog_core::{Error, MediaAsset, MediaAssetRepository, NewMediaAsset, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Media asset records persisted to a local JSON-lines file.
pub struct JsonlAssetRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAssetRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, in insertion order. A missing ledger is empty.
    pub async fn list(&self) -> Result<Vec<MediaAsset>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<MediaAsset>(line).map_err(|e| {
                    Error::Serialization(format!(
                        "{} line {}: {}",
                        self.path.display(),
                        n + 1,
                        e
                    ))
                })
            })
            .collect()
    }

    /// Records belonging to one trip.
    pub async fn list_for_trip(&self, trip_id: Uuid) -> Result<Vec<MediaAsset>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.asset.trip_id == trip_id)
            .collect())
    }
}

fn check(asset: &NewMediaAsset) -> Result<()> {
    if asset.url.trim().is_empty() {
        return Err(Error::InvalidInput("Media asset url is required".to_string()));
    }
    if asset.trip_id.is_nil() {
        return Err(Error::InvalidInput("Media asset trip_id is required".to_string()));
    }
    if asset.latitude.is_some() != asset.longitude.is_some() {
        return Err(Error::InvalidInput(
            "Media asset latitude and longitude must be set together".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl MediaAssetRepository for JsonlAssetRepository {
    async fn create_media_asset(&self, asset: NewMediaAsset) -> Result<Uuid> {
        check(&asset)?;

        let record = MediaAsset {
            id: Uuid::now_v7(),
            asset,
            created_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                warn!(ledger = %self.path.display(), error = %e, "ledger: open failed");
                Error::Persistence(format!("Failed to open asset ledger: {}", e))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Persistence(format!("Failed to append asset record: {}", e)))?;
        file.sync_data().await?;

        debug!(asset_id = %record.id, trip_id = %record.asset.trip_id, kind = %record.asset.kind, "ledger: asset recorded");
        Ok(record.id)
    }
}
