//! Document store configuration.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where and how the sled database holding schema documents is opened.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory. `None` opens a temporary database that is
    /// removed when the last handle goes away.
    pub location: Option<PathBuf>,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Background flush interval in milliseconds. `None` leaves flushing to
    /// the catalog, which flushes after every persisted commit.
    pub flush_every_ms: Option<u64>,

    /// zstd compression of stored pages.
    pub compression: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: Some(PathBuf::from("./classdb_schema")),
            cache_capacity: 16 * 1024 * 1024,
            flush_every_ms: Some(500),
            compression: true,
        }
    }
}

impl StoreConfig {
    /// Store documents under `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(path.into()),
            ..Default::default()
        }
    }

    /// A throwaway store, handy for tests and tools.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            ..Default::default()
        }
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Only flush when the catalog asks for it.
    pub fn with_sync_writes(mut self) -> Self {
        self.flush_every_ms = None;
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.compression = false;
        self
    }

    /// Directory of the store, if it lives on disk.
    pub fn path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Open the sled database described by this configuration.
    pub fn open(&self) -> Result<sled::Db> {
        let config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);
        let config = match &self.location {
            Some(path) => config.path(path),
            None => config.temporary(true),
        };
        debug!(path = ?self.location, "opening schema document store");
        Ok(config.open()?)
    }
}
