//! Catalog configuration.

use std::time::Duration;

/// Class names that always get exactly one collection.
pub const DEFAULT_INTERNAL_CLASSES: &[&str] = &[
    "ouser",
    "orole",
    "osecuritypolicy",
    "oidentity",
    "ofunction",
    "osequence",
    "otrigger",
    "oschedule",
    "orids",
    "o",
    "v",
    "e",
    "le",
];

/// Where authoritative schema writes happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Mutations are applied and persisted locally.
    #[default]
    Embedded,
    /// Schema changes are applied by a remote server; the local catalog
    /// only reloads and republishes snapshots.
    Remote,
}

/// Configuration for the schema catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Collections allocated for each new concrete class.
    pub minimum_collections: usize,

    /// Upper bound for waiting on the schema lock.
    pub lock_timeout: Duration,

    /// Embedded or remote-mirrored catalog.
    pub mode: StorageMode,

    /// Lower-cased class names that always get a single collection.
    pub internal_classes: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            minimum_collections: 1,
            lock_timeout: Duration::from_secs(30),
            mode: StorageMode::Embedded,
            internal_classes: DEFAULT_INTERNAL_CLASSES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl CatalogConfig {
    /// Create a default embedded configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a catalog that mirrors a remote server.
    pub fn remote() -> Self {
        Self {
            mode: StorageMode::Remote,
            ..Default::default()
        }
    }

    /// Set the number of collections allocated per new class.
    pub fn with_minimum_collections(mut self, count: usize) -> Self {
        self.minimum_collections = count.max(1);
        self
    }

    /// Set the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the storage mode.
    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.mode = mode;
        self
    }

    /// Register an extra internal class name.
    pub fn with_internal_class(mut self, name: impl Into<String>) -> Self {
        self.internal_classes.push(name.into().to_lowercase());
        self
    }

    /// Whether the (lower-cased) class name is internal.
    pub fn is_internal_class(&self, lower_name: &str) -> bool {
        self.internal_classes.iter().any(|name| name == lower_name)
    }

    /// Whether local mutations are allowed.
    pub fn is_embedded(&self) -> bool {
        self.mode == StorageMode::Embedded
    }
}
