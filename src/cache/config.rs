//! Cache configuration.
//!
//! Controls whether page loads consult the cache and where entries live, via
//! the `[cache]` table of `querydeck.toml`.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

// Default values for cache configuration
pub(crate) const DEFAULT_CACHE_DIRECTORY: &str = ".querydeck-cache";
pub(crate) const DEFAULT_MEMORY_LIMIT: usize = 512;

/// Storage behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// Bounded in-process LRU; lost on exit.
    Memory,
    /// One JSON file per entry under [`CacheConfig::directory`].
    #[default]
    Fs,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "fs" | "file" | "disk" => Ok(CacheBackend::Fs),
            other => Err(format!("unknown cache backend `{other}` (expected memory|fs)")),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackend::Memory => f.write_str("memory"),
            CacheBackend::Fs => f.write_str("fs"),
        }
    }
}

/// Cache configuration resolved from `querydeck.toml`, environment and CLI.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Consult and populate the cache during page loads.
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Entry directory for the filesystem backend.
    pub directory: PathBuf,
    /// Maximum entries held by the memory backend.
    pub memory_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            directory: PathBuf::from(DEFAULT_CACHE_DIRECTORY),
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl CacheConfig {
    /// Returns the memory limit as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
