//! Persistent filesystem cache store.
//!
//! Each entry is a JSON document named after the SHA-256 of its key. The key is
//! stored alongside the value and checked on read, so a digest collision reads
//! as a miss rather than as someone else's body.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;

use super::{CacheError, CacheStore};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    #[serde(with = "time::serde::rfc3339")]
    stored_at: OffsetDateTime,
    body: Value,
}

/// On-disk store rooted at one directory.
#[derive(Debug)]
pub struct FsStore {
    directory: PathBuf,
    write_seq: AtomicU64,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            write_seq: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{ENTRY_EXTENSION}", entry_file_stem(key)))
    }

    /// Remove every entry, returning how many were deleted.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        debug!(
            op = "cache::fs::clear",
            directory = %self.directory.display(),
            removed,
            "Cleared filesystem cache"
        );
        Ok(removed)
    }
}

fn entry_file_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl CacheStore for FsStore {
    async fn get(&self, key: &str) -> Result<Value, CacheError> {
        let bytes = match fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(CacheError::miss(key)),
            Err(err) => return Err(err.into()),
        };
        let entry: StoredEntry = serde_json::from_slice(&bytes)?;
        if entry.key != key {
            return Err(CacheError::miss(key));
        }
        Ok(entry.body)
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let entry = StoredEntry {
            key: key.to_string(),
            stored_at: OffsetDateTime::now_utc(),
            body: value.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;

        // Write beside the target and rename so readers never see a torn entry.
        let path = self.entry_path(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let staging = path.with_extension(format!("{ENTRY_EXTENSION}.{}.{seq}.tmp", std::process::id()));
        fs::write(&staging, &bytes).await?;
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(())
    }
}
