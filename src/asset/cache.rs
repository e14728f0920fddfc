//! Explicit byte cache for fetched assets.
//!
//! The cache is an ordinary value: the application creates one, hands it to
//! whichever fetchers should share it, and disposes it at shutdown. Nothing
//! in this crate consults a process-wide cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub resident_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct AssetCache {
    entries: Mutex<HashMap<String, Arc<[u8]>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up cached bytes, counting the hit or miss.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let found = self.entries().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Arc<[u8]>) {
        self.entries().insert(key.into(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<[u8]>> {
        self.entries().remove(key)
    }

    pub fn clear(&self) {
        let mut entries = self.entries();
        debug!(entries = entries.len(), "clearing asset cache");
        entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries();
        CacheStats {
            entries: entries.len(),
            resident_bytes: entries.values().map(|bytes| bytes.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Release every cached buffer. Bytes still held by in-flight loads stay
    /// alive until those loads drop them.
    pub fn dispose(self) -> CacheStats {
        let stats = self.stats();
        debug!(
            entries = stats.entries,
            bytes = stats.resident_bytes,
            "disposing asset cache"
        );
        stats
    }
}
