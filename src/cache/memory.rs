//! In-process LRU cache store.

use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use serde_json::Value;

use crate::infra::telemetry::METRIC_CACHE_EVICT;
use crate::util::lock::mutex_lock;

use super::config::CacheConfig;
use super::{CacheError, CacheStore};

const SOURCE: &str = "cache::memory";

/// Bounded in-memory store keyed by request id.
///
/// Entries are evicted least-recently-used first once `memory_limit` is reached.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Value>>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.memory_limit_non_zero())),
        }
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Value, CacheError> {
        mutex_lock(&self.entries, SOURCE, "get")
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::miss(key))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let evicted = mutex_lock(&self.entries, SOURCE, "put").push(key.to_string(), value.clone());
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT, "backend" => "memory").increment(1);
        }
        Ok(())
    }
}
