//! Transient in-process references to uploaded documents
//!
//! An uploaded file is handed to the engine as an object URL
//! (`blob:pagewise/<uuid>`). The bytes stay in the registry until the URL is
//! revoked, which happens explicitly on session teardown and, as a fallback,
//! when the last [`ObjectUrl`] clone is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

const SCHEME_PREFIX: &str = "blob:pagewise/";

/// Registry of live object URLs
#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object URL for `bytes`
    pub fn create(&self, bytes: Vec<u8>) -> ObjectUrl {
        let href = format!("{}{}", SCHEME_PREFIX, Uuid::new_v4());
        let size = bytes.len();
        self.entries.lock().insert(href.clone(), Arc::from(bytes));

        tracing::debug!(href = %href, size, "Created object URL");

        ObjectUrl {
            inner: Arc::new(ObjectUrlInner {
                href,
                registry: self.clone(),
                revoked: AtomicBool::new(false),
            }),
        }
    }

    /// Bytes behind a live object URL
    pub fn fetch(&self, href: &str) -> Option<Arc<[u8]>> {
        self.entries.lock().get(href).cloned()
    }

    /// Number of object URLs not yet revoked
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    fn revoke(&self, href: &str) -> bool {
        self.entries.lock().remove(href).is_some()
    }
}

/// Scoped object URL
///
/// Clones share one registry entry; revocation is idempotent.
#[derive(Clone)]
pub struct ObjectUrl {
    inner: Arc<ObjectUrlInner>,
}

struct ObjectUrlInner {
    href: String,
    registry: ObjectUrlRegistry,
    revoked: AtomicBool,
}

impl ObjectUrl {
    pub fn href(&self) -> &str {
        &self.inner.href
    }

    /// Bytes behind this URL, `None` once revoked
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.inner.registry.fetch(&self.inner.href)
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.revoked.load(Ordering::Acquire)
    }

    /// Release the registry entry now
    pub fn revoke(&self) {
        self.inner.revoke();
    }
}

impl ObjectUrlInner {
    fn revoke(&self) {
        if !self.revoked.swap(true, Ordering::AcqRel) && self.registry.revoke(&self.href) {
            tracing::debug!(href = %self.href, "Revoked object URL");
        }
    }
}

impl Drop for ObjectUrlInner {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl std::fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUrl")
            .field("href", &self.inner.href)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}
