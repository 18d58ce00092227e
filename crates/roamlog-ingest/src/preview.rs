//! Local preview handles for in-session media items.
//!
//! Every preview acquired for an item is released exactly once: on removal,
//! on submit or cancel, or when the handle is dropped. Releasing a handle
//! twice is a logged no-op, never a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use roamlog_core::{defaults, Error, Result, SourceFile};
use tracing::{trace, warn};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    live: Mutex<HashMap<String, Bytes>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Inner {
    fn release_url(&self, url: &str) -> Result<()> {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        match removed {
            Some(_) => {
                self.released.fetch_add(1, Ordering::Relaxed);
                trace!(url, "Preview released");
                Ok(())
            }
            None => {
                warn!(url, "Preview release requested for a handle that is not live");
                Err(Error::PreviewReleased(url.to_string()))
            }
        }
    }
}

/// Registry of live previews, shared by every handle it issued.
///
/// Cheap to clone; clones observe the same set of previews.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Inner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preview for a source file.
    pub fn acquire(&self, file: &SourceFile) -> PreviewHandle {
        let url = format!("{}{}", defaults::PREVIEW_URL_PREFIX, Uuid::new_v4());
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), file.data.clone());
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        trace!(url = %url, file = %file.name, "Preview acquired");

        PreviewHandle {
            url,
            inner: Arc::clone(&self.inner),
            released: false,
        }
    }

    /// Release a preview by URL. Fails with `PreviewReleased` if the URL is
    /// not live.
    pub fn revoke(&self, url: &str) -> Result<()> {
        self.inner.release_url(url)
    }

    /// Bytes behind a live preview URL.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Number of previews acquired and not yet released.
    pub fn live_count(&self) -> usize {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn acquired_count(&self) -> usize {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("live", &self.live_count())
            .field("acquired", &self.acquired_count())
            .field("released", &self.released_count())
            .finish()
    }
}

/// A live preview. Released on [`PreviewHandle::release`] or on drop.
pub struct PreviewHandle {
    url: String,
    inner: Arc<Inner>,
    released: bool,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the preview now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.inner.release_url(&self.url)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.inner.release_url(&self.url);
        }
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("url", &self.url)
            .field("released", &self.released)
            .finish()
    }
}
