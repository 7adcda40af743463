//! Storage collaborators of the catalog.
//!
//! Class and root documents go through a [`DocumentStore`] (sled-backed by
//! default). Physical collections are reached through a [`CollectionStore`].

mod collections;
mod config;
mod document_store;

pub mod document;

pub use collections::{CollectionStore, MemoryCollectionStore, StoredValue};
pub use config::StoreConfig;
pub use document::{
    ClassDocument, Document, GlobalPropertyDocument, PropertyDocument, RootDocument,
    CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION,
};
pub use document_store::{DocumentStore, SledDocumentStore};
