//! Filesystem blob store.
//!
//! Objects live at `{base_path}/{bucket}/{path}` and are served from
//! `{public_url}/{bucket}/{path}`. Writes are atomic (temp file + rename)
//! and stored files are never executable.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use roamlog_core::{BlobStorage, Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StorageConfig;

/// Blob store backed by a local directory.
pub struct FilesystemStorage {
    base_path: PathBuf,
    public_url: String,
}

impl FilesystemStorage {
    /// Create a new filesystem store with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.base_dir.clone(), config.public_url.clone())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve `bucket/path` below the base directory, refusing anything
    /// that would escape it.
    fn full_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || path.is_empty() || escapes {
            return Err(Error::InvalidInput(format!(
                "Invalid storage location: {}/{}",
                bucket, path
            )));
        }
        Ok(self.base_path.join(relative))
    }

    /// Validate that the store can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch permission errors and
    /// missing directories early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("test.bin");

        // Step 1: Create directory
        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        // Step 2: Write file
        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        // Step 3: Read file
        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        // Step 4: Delete file and directory
        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }

    /// Read a stored object back.
    pub async fn read(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(bucket, path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("{}/{}", bucket, path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        let full_path = self.full_path(bucket, path)?;
        Ok(fs::try_exists(full_path).await?)
    }

    async fn write_atomic(&self, full_path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "storage: create_dir_all failed");
                e
            })?;
        }

        // Unique temp name so concurrent writers never share a temp file
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let temp_path = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "storage: File::create failed");
            e
        })?;
        let written = match file.write_all(data).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &written {
            warn!(temp_path = %temp_path.display(), error = %e, "storage: write failed");
        }
        drop(file);

        let placed = match written {
            Ok(()) => fs::rename(&temp_path, full_path).await.map_err(|e| {
                warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "storage: rename failed");
                e
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = placed {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        // Set permissions to 0644 (rw-r--r--, no execute)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStorage for FilesystemStorage {
    async fn store(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let full_path = self.full_path(bucket, path)?;
        debug!(
            bucket,
            storage_path = %path,
            content_type,
            size = data.len(),
            "storage: write"
        );

        self.write_atomic(&full_path, &data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to store {}/{}: {}", bucket, path, e)))?;

        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_url, bucket, path)
    }
}
