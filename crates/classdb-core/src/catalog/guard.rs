//! Scoped write access to the catalog.
//!
//! A [`SchemaWriteGuard`] holds the catalog's write lock. Changes made
//! through it only touch the in-memory state and mark classes dirty;
//! [`release`](SchemaWriteGuard::release) writes them out, bumps the catalog
//! version and publishes a fresh snapshot. Work that needs several steps
//! under one lock goes through [`nested`](SchemaWriteGuard::nested), which
//! shares the same persistence pass.

use super::catalog::Catalog;
use super::lifecycle::{ClassChange, ClassCollections};
use super::properties::{NewProperty, PropertyChange};
use super::state::CatalogState;
use crate::error::{Error, Result};
use crate::index::IndexInfo;
use crate::security::{Permission, ResourceGeneric, SessionHandle};
use crate::types::{ClassId, CollectionId};
use parking_lot::RwLockWriteGuard;
use std::collections::BTreeMap;
use tracing::{error, warn};

/// Exclusive, scoped access to the catalog state.
pub struct SchemaWriteGuard<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) session: &'a SessionHandle,
    pub(crate) state: Option<RwLockWriteGuard<'a, CatalogState>>,
    depth: usize,
}

impl<'a> SchemaWriteGuard<'a> {
    pub(crate) fn new(
        catalog: &'a Catalog,
        session: &'a SessionHandle,
        state: RwLockWriteGuard<'a, CatalogState>,
    ) -> Self {
        Self {
            catalog,
            session,
            state: Some(state),
            depth: 1,
        }
    }

    /// Current nesting depth; 1 for a fresh guard.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The state as changed so far.
    pub fn state(&self) -> Result<&CatalogState> {
        self.state.as_deref().ok_or_else(released)
    }

    pub(crate) fn state_mut(&mut self) -> Result<&mut CatalogState> {
        self.state.as_deref_mut().ok_or_else(released)
    }

    /// Run `f` one level deeper. Its changes are persisted together with
    /// the rest of the scope when the guard is released.
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        self.session.ensure_active()?;
        let state = self.state.as_deref_mut().ok_or_else(released)?;
        self.depth += 1;
        let result = f(state);
        self.depth -= 1;
        result
    }

    fn create(
        &mut self,
        name: &str,
        collections: ClassCollections,
        supers: &[&str],
    ) -> Result<ClassId> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Create, Some(name))?;
        self.session.ensure_no_transaction("create a class")?;
        self.scoped(|state| {
            let supers = resolve_all(state, supers)?;
            state.create_class(name, collections, &supers)
        })
    }

    /// Create a class with the configured number of collections.
    pub fn create_class(&mut self, name: &str, supers: &[&str]) -> Result<ClassId> {
        self.create(name, ClassCollections::Default, supers)
    }

    /// Create a class with `count` new collections. Zero makes it abstract.
    pub fn create_class_with_collections(
        &mut self,
        name: &str,
        count: usize,
        supers: &[&str],
    ) -> Result<ClassId> {
        self.create(name, ClassCollections::Count(count), supers)
    }

    /// Create a class over existing, unowned collections.
    pub fn create_class_with_collection_ids(
        &mut self,
        name: &str,
        collection_ids: &[CollectionId],
        supers: &[&str],
    ) -> Result<ClassId> {
        self.create(name, ClassCollections::Ids(collection_ids.to_vec()), supers)
    }

    pub fn create_abstract_class(&mut self, name: &str, supers: &[&str]) -> Result<ClassId> {
        self.create(name, ClassCollections::Abstract, supers)
    }

    /// The class if it exists, otherwise a new one.
    pub fn get_or_create_class(&mut self, name: &str, supers: &[&str]) -> Result<ClassId> {
        if let Some(id) = self.state()?.class_id(name) {
            return Ok(id);
        }
        self.create_class(name, supers)
    }

    pub fn drop_class(&mut self, name: &str) -> Result<()> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Delete, Some(name))?;
        self.session.ensure_no_transaction("drop a class")?;
        self.scoped(|state| {
            let id = state.require(name)?;
            state.drop_class(id)
        })
    }

    /// Apply one attribute change to a class.
    pub fn alter_class(&mut self, name: &str, change: ClassChange) -> Result<()> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Update, Some(name))?;
        self.scoped(|state| {
            let id = state.require(name)?;
            state.apply_class_change(id, change)
        })
    }

    pub fn rename_class(&mut self, name: &str, new_name: &str) -> Result<()> {
        self.alter_class(name, ClassChange::Name(new_name.to_string()))
    }

    pub fn set_super_classes(&mut self, name: &str, supers: &[&str]) -> Result<()> {
        let supers = supers.iter().map(|s| s.to_string()).collect();
        self.alter_class(name, ClassChange::SuperClasses(supers))
    }

    pub fn add_super_class(&mut self, name: &str, super_class: &str) -> Result<()> {
        self.alter_class(name, ClassChange::AddSuperClass(super_class.to_string()))
    }

    pub fn remove_super_class(&mut self, name: &str, super_class: &str) -> Result<()> {
        self.alter_class(name, ClassChange::RemoveSuperClass(super_class.to_string()))
    }

    pub fn set_abstract(&mut self, name: &str, is_abstract: bool) -> Result<()> {
        self.alter_class(name, ClassChange::Abstract(is_abstract))
    }

    pub fn add_property(&mut self, class: &str, property: NewProperty) -> Result<()> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Update, Some(class))?;
        self.session.ensure_no_transaction("create a property")?;
        self.scoped(|state| {
            let id = state.require(class)?;
            state.add_property(id, property)
        })
    }

    pub fn drop_property(&mut self, class: &str, property: &str) -> Result<()> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Delete, Some(class))?;
        self.session.ensure_no_transaction("drop a property")?;
        self.scoped(|state| {
            let id = state.require(class)?;
            state.drop_property(id, property)
        })
    }

    pub fn alter_property(
        &mut self,
        class: &str,
        property: &str,
        change: PropertyChange,
    ) -> Result<()> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Update, Some(class))?;
        self.scoped(|state| {
            let id = state.require(class)?;
            state.alter_property(id, property, change)
        })
    }

    pub fn create_index(
        &mut self,
        class: &str,
        index_name: &str,
        index_type: &str,
        fields: &[&str],
        metadata: &BTreeMap<String, String>,
    ) -> Result<IndexInfo> {
        self.session
            .check(ResourceGeneric::Schema, Permission::Update, Some(class))?;
        self.scoped(|state| {
            let id = state.require(class)?;
            state.create_index(id, index_name, index_type, fields, metadata)
        })
    }

    pub fn add_blob_collection(&mut self, collection_id: CollectionId) -> Result<()> {
        self.session
            .check(ResourceGeneric::Collection, Permission::Update, None)?;
        self.scoped(|state| state.add_blob_collection(collection_id))
    }

    /// Returns whether the collection was reserved for blobs.
    pub fn remove_blob_collection(&mut self, collection_id: CollectionId) -> Result<bool> {
        self.session
            .check(ResourceGeneric::Collection, Permission::Update, None)?;
        self.scoped(|state| Ok(state.remove_blob_collection(collection_id)))
    }

    /// End the write scope.
    ///
    /// With `persist`, dirty classes and the root record are written and the
    /// version is bumped. Either way a new snapshot is published, the lock
    /// is released and the end of the metadata change is signalled, even if
    /// writing fails.
    pub fn release(mut self, persist: bool) -> Result<()> {
        self.finish(persist)
    }

    fn finish(&mut self, persist: bool) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        self.depth = 0;
        let outcome = self.catalog.commit(&mut state, persist);
        // The writer slot belongs to the lock holder.
        self.catalog.clear_writer();
        drop(state);
        self.session.transactions().end_exclusive_metadata_change();
        outcome
    }
}

impl Drop for SchemaWriteGuard<'_> {
    fn drop(&mut self) {
        if self.state.is_none() {
            return;
        }
        warn!(
            session = %self.session.session_id,
            "schema write guard dropped without release, publishing without persisting"
        );
        if let Err(e) = self.finish(false) {
            error!(error = %e, "failed to publish schema snapshot");
        }
    }
}

fn released() -> Error {
    Error::Schema("schema write guard was already released".to_string())
}

fn resolve_all(state: &CatalogState, names: &[&str]) -> Result<Vec<ClassId>> {
    names.iter().map(|name| state.require(name)).collect()
}
