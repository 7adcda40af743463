//! Schema catalog for classdb.
//!
//! This module provides:
//! - Class and property descriptors with multiple inheritance
//! - Collection ownership and polymorphic collection tracking
//! - Persistence of class documents through a [`DocumentStore`](crate::storage::DocumentStore)
//! - Scoped, reentrant write access and immutable snapshots for readers
//!
//! # Example
//!
//! ```ignore
//! let catalog = Catalog::open(config, documents, collections, indexes)?;
//! let session = SessionHandle::embedded("admin");
//!
//! catalog.create_class(&session, "Animal", &[])?;
//! catalog.create_class(&session, "Dog", &["Animal"])?;
//! catalog.add_property(&session, "Dog", NewProperty::new("name", PropertyType::String))?;
//!
//! let dog = catalog.snapshot().class("dog").unwrap();
//! assert!(dog.is_sub_class_of("Animal"));
//! ```

mod bookkeeping;
mod catalog;
mod class;
mod global_property;
mod guard;
mod inheritance;
mod lazy;
mod lifecycle;
pub mod names;
mod properties;
mod property;
mod snapshot;
mod state;

pub use catalog::Catalog;
pub use class::{ClassDescriptor, COLLECTION_SELECTIONS};
pub use global_property::{GlobalProperty, GlobalPropertyTable};
pub use guard::SchemaWriteGuard;
pub use lazy::{LazyClassRef, LoadState};
pub use lifecycle::ClassChange;
pub use properties::{NewProperty, PropertyChange};
pub use property::{PropertyDescriptor, COLLATES};
pub use snapshot::{ImmutableClassView, ImmutableProperty, SchemaSnapshot};
pub use state::CatalogState;
