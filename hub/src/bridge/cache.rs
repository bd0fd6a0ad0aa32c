//! Per-tool response cache for API tools.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::ToolResult;

const DEFAULT_CAPACITY: usize = 256;

struct CacheEntry {
    stored_at: Instant,
    ttl: Duration,
    result: ToolResult,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// TTL-aware LRU keyed by `(tool id, canonical rendered request)`.
pub struct ResponseCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("non-zero cache capacity"),
            )),
        }
    }

    /// Fresh hit or nothing; expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<ToolResult> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.result.clone()),
            Some(_) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, result: ToolResult, ttl: Duration) {
        self.inner.lock().put(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                ttl,
                result,
            },
        );
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
