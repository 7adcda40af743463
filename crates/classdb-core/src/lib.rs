//! classdb Core - schema catalog for an embedded multi-model database.
//!
//! This crate defines, stores, mutates and serves class/property metadata:
//! inheritance, collection bookkeeping, persisted class documents and the
//! immutable snapshots sessions read from.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod security;
pub mod storage;
pub mod transaction;
pub mod types;

pub use catalog::{
    Catalog, CatalogState, ClassChange, ClassDescriptor, GlobalProperty, GlobalPropertyTable,
    ImmutableClassView, ImmutableProperty, NewProperty, PropertyChange, PropertyDescriptor,
    SchemaSnapshot, SchemaWriteGuard,
};
pub use config::{CatalogConfig, StorageMode};
pub use error::{Error, Result};
pub use index::{IndexDefinition, IndexInfo, IndexManager, MemoryIndexManager};
pub use security::{
    AllowAll, Permission, ResourceGeneric, RoleChecker, SecurityChecker, SecurityError,
    SessionHandle,
};
pub use storage::{
    CollectionStore, Document, DocumentStore, MemoryCollectionStore, SledDocumentStore,
    StoreConfig, StoredValue,
};
pub use transaction::{LocalTransactions, TransactionCoordinator};
pub use types::{ClassId, CollectionId, PropertyType, RecordId, NOT_EXISTENT_COLLECTION_ID};
