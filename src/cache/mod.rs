//! Querydeck Cache Store
//!
//! A write-through accelerator keyed by exact request id (including any
//! `query_mode` suffix). Stores hold unwrapped bodies.
//!
//! Callers never treat a cache failure as fatal: a failed `get` means "fetch
//! from the network" and a failed `put` is logged and dropped.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "fs"          # or "memory"
//! directory = ".querydeck-cache"
//! memory_limit = 512
//! ```

pub(crate) mod config;
mod fs;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use config::{CacheBackend, CacheConfig};
pub use fs::FsStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache entry for `{0}`")]
    Miss(String),
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry could not be encoded or decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CacheError {
    pub fn miss(key: impl Into<String>) -> Self {
        Self::Miss(key.into())
    }
}

/// Asynchronous key-value store backing page loads.
///
/// Implementations must tolerate concurrent `get`/`put` calls for different keys
/// from many in-flight queries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fails on a miss as well as on I/O or decode errors.
    async fn get(&self, key: &str) -> Result<Value, CacheError>;

    async fn put(&self, key: &str, value: &Value) -> Result<(), CacheError>;
}

/// Open the store selected by `config`.
pub fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new(config)),
        CacheBackend::Fs => Arc::new(FsStore::open(&config.directory)?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn open_store_honours_backend() {
        let dir = TempDir::new().expect("temp dir");
        let config = CacheConfig {
            backend: CacheBackend::Fs,
            directory: dir.path().join("entries"),
            ..Default::default()
        };
        let store = open_store(&config).expect("fs store");
        store.put("/a", &json!([1])).await.expect("put");
        assert!(dir.path().join("entries").is_dir());

        let memory = open_store(&CacheConfig {
            backend: CacheBackend::Memory,
            ..Default::default()
        })
        .expect("memory store");
        assert!(memory.get("/a").await.is_err());
    }
}
