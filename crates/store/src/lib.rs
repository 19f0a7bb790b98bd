//! Remembers where each upload lives on the server.
//!
//! The client writes a location after a successful create, reads it back to
//! resume, and removes it once the upload completes. An interrupted upload
//! leaves its entry in place so the next attempt can pick up from the
//! server's offset instead of starting over.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::trace;
use url::Url;

/// Fingerprint → upload URL mapping.
///
/// Implementations only need per-key atomicity. The in-memory store is the
/// only one shipped; a durable store that survives process restarts can be
/// dropped in without touching the client.
pub trait UploadUrlStore: Send + Sync {
    /// Inserts or replaces the location for `fingerprint`.
    fn put(&self, fingerprint: &str, url: Url);

    /// Returns the location for `fingerprint`, if any.
    fn get(&self, fingerprint: &str) -> Option<Url>;

    /// Forgets `fingerprint`. Removing an unknown key is a no-op.
    fn remove(&self, fingerprint: &str);
}

/// Process-local store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryUrlStore {
    urls: RwLock<HashMap<String, Url>>,
}

impl InMemoryUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads currently remembered.
    pub fn len(&self) -> usize {
        self.urls.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UploadUrlStore for InMemoryUrlStore {
    fn put(&self, fingerprint: &str, url: Url) {
        trace!(fingerprint, %url, "store put");
        let mut urls = self.urls.write().unwrap_or_else(|e| e.into_inner());
        urls.insert(fingerprint.to_string(), url);
    }

    fn get(&self, fingerprint: &str) -> Option<Url> {
        let urls = self.urls.read().unwrap_or_else(|e| e.into_inner());
        urls.get(fingerprint).cloned()
    }

    fn remove(&self, fingerprint: &str) {
        trace!(fingerprint, "store remove");
        let mut urls = self.urls.write().unwrap_or_else(|e| e.into_inner());
        urls.remove(fingerprint);
    }
}
