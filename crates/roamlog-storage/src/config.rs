//! Storage configuration.

use std::path::PathBuf;

use roamlog_core::defaults;

/// Where blobs and the asset ledger live, and how blobs are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    /// Base URL objects are publicly served from.
    pub public_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(defaults::STORAGE_DIR),
            public_url: defaults::PUBLIC_URL.to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from `ROAMLOG_STORAGE_DIR` and `ROAMLOG_PUBLIC_URL`.
    pub fn from_env() -> Self {
        let base_dir = std::env::var(defaults::ENV_STORAGE_DIR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(defaults::STORAGE_DIR));

        let public_url = std::env::var(defaults::ENV_PUBLIC_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::PUBLIC_URL.to_string());

        Self {
            base_dir,
            public_url,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    /// Path of the JSON-lines asset ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.base_dir.join(defaults::ASSET_LEDGER_FILE)
    }
}
