//! Catalog manager for class and property metadata.

use super::guard::SchemaWriteGuard;
use super::lifecycle::ClassChange;
use super::properties::{NewProperty, PropertyChange};
use super::snapshot::{ImmutableClassView, SchemaSnapshot};
use super::state::{CatalogEnv, CatalogState};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::index::{IndexInfo, IndexManager};
use crate::security::{Permission, ResourceGeneric, SessionHandle};
use crate::storage::{CollectionStore, DocumentStore};
use crate::types::{ClassId, CollectionId};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// The schema catalog.
///
/// Writers take the lock through [`write`](Catalog::write) or one of the
/// single-change helpers; readers work on the published
/// [`SchemaSnapshot`] and never wait for writers.
pub struct Catalog {
    env: Arc<CatalogEnv>,
    state: RwLock<CatalogState>,
    snapshot: RwLock<Arc<SchemaSnapshot>>,
    /// Thread currently holding the write guard.
    writer: Mutex<Option<ThreadId>>,
}

impl Catalog {
    /// Open the catalog stored in `documents`.
    ///
    /// A store without a schema record gets an empty one, written right
    /// away in embedded mode.
    pub fn open(
        config: CatalogConfig,
        documents: Arc<dyn DocumentStore>,
        collections: Arc<dyn CollectionStore>,
        indexes: Arc<dyn IndexManager>,
    ) -> Result<Self> {
        let env = Arc::new(CatalogEnv {
            config,
            documents,
            collections,
            indexes,
        });
        let mut state = CatalogState::load(Arc::clone(&env))?;
        if state.root_dirty && env.config.is_embedded() {
            state.persist()?;
        }
        let snapshot = SchemaSnapshot::build(&state, env.indexes.as_ref())?;
        info!(
            classes = snapshot.count_classes(),
            mode = ?env.config.mode,
            "opened schema catalog"
        );

        Ok(Self {
            env,
            state: RwLock::new(state),
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.env.config
    }

    /// Take the write lock.
    ///
    /// Fails with `NestedWrite` if this thread already holds it, and with
    /// `LockTimeout` if it cannot be taken within the configured timeout.
    pub fn write<'a>(&'a self, session: &'a SessionHandle) -> Result<SchemaWriteGuard<'a>> {
        if !self.env.config.is_embedded() {
            return Err(read_only());
        }
        self.lock(session)
    }

    fn lock<'a>(&'a self, session: &'a SessionHandle) -> Result<SchemaWriteGuard<'a>> {
        session.ensure_active()?;
        let me = thread::current().id();
        if *self.writer.lock() == Some(me) {
            return Err(Error::NestedWrite);
        }

        session.transactions().start_exclusive_metadata_change();
        let timeout = self.env.config.lock_timeout;
        let Some(state) = self.state.try_write_for(timeout) else {
            session.transactions().end_exclusive_metadata_change();
            warn!(session = %session.session_id, ?timeout, "timed out waiting for the schema lock");
            return Err(Error::LockTimeout { waited: timeout });
        };
        *self.writer.lock() = Some(me);
        debug!(session = %session.session_id, "acquired schema write lock");
        Ok(SchemaWriteGuard::new(self, session, state))
    }

    /// Persist (optionally) and publish. Called with the write lock held.
    pub(crate) fn commit(&self, state: &mut CatalogState, persist: bool) -> Result<()> {
        if persist {
            state.persist()?;
            state.version += 1;
        }
        let snapshot = SchemaSnapshot::build(state, self.env.indexes.as_ref())?;
        *self.snapshot.write() = Arc::new(snapshot);
        debug!(version = state.version, persist, "published schema snapshot");
        Ok(())
    }

    pub(crate) fn clear_writer(&self) {
        *self.writer.lock() = None;
    }

    /// Shared access to the live state. Blocks while a writer holds the
    /// lock, so it must not be called by the thread holding the guard.
    pub fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// The latest published snapshot, if the session may read the schema.
    pub fn snapshot_for(&self, session: &SessionHandle) -> Result<Arc<SchemaSnapshot>> {
        session.check(ResourceGeneric::Schema, Permission::Read, None)?;
        Ok(self.snapshot())
    }

    /// A class of the latest snapshot, if the session may read it.
    pub fn class_for(
        &self,
        session: &SessionHandle,
        name: &str,
    ) -> Result<Arc<ImmutableClassView>> {
        session.check(ResourceGeneric::Class, Permission::Read, Some(name))?;
        self.view_of(name)
    }

    /// Version of the latest published snapshot.
    pub fn version(&self) -> u64 {
        self.snapshot.read().version()
    }

    pub fn exists_class(&self, name: &str) -> bool {
        self.snapshot.read().exists_class(name)
    }

    pub fn count_classes(&self) -> usize {
        self.snapshot.read().count_classes()
    }

    pub fn class_names(&self) -> Vec<String> {
        self.snapshot.read().class_names()
    }

    /// Re-read the catalog from the document store and publish it without
    /// writing anything back.
    pub fn reload(&self, session: &SessionHandle) -> Result<()> {
        session.check(ResourceGeneric::Schema, Permission::Read, None)?;
        let mut guard = self.lock(session)?;
        let result = CatalogState::load(Arc::clone(&self.env)).and_then(|mut fresh| {
            let state = guard.state_mut()?;
            fresh.version = state.version + 1;
            *state = fresh;
            Ok(())
        });
        let released = guard.release(false);
        result.and(released)?;
        info!(version = self.version(), "reloaded schema catalog");
        Ok(())
    }

    /// Run one change in its own write scope and persist whatever it applied,
    /// even when it fails part way. The change's error wins over a
    /// persistence error.
    fn mutate<T>(
        &self,
        session: &SessionHandle,
        f: impl FnOnce(&mut SchemaWriteGuard<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.write(session)?;
        let result = f(&mut guard);
        let released = guard.release(true);
        match result {
            Ok(value) => released.map(|_| value),
            Err(e) => {
                if let Err(persist_error) = released {
                    warn!(error = %persist_error, "failed to persist schema after a failed change");
                }
                Err(e)
            }
        }
    }

    fn view_of(&self, name: &str) -> Result<Arc<ImmutableClassView>> {
        self.snapshot()
            .class(name)
            .ok_or_else(|| Error::NotFound(format!("class '{}'", name.trim())))
    }

    fn create_with(
        &self,
        session: &SessionHandle,
        f: impl FnOnce(&mut SchemaWriteGuard<'_>) -> Result<ClassId>,
    ) -> Result<Arc<ImmutableClassView>> {
        let name = self.mutate(session, |guard| {
            let id = f(guard)?;
            guard.state()?.name_of(id)
        })?;
        self.view_of(&name)
    }

    pub fn create_class(
        &self,
        session: &SessionHandle,
        name: &str,
        supers: &[&str],
    ) -> Result<Arc<ImmutableClassView>> {
        self.create_with(session, |guard| guard.create_class(name, supers))
    }

    pub fn create_class_with_collections(
        &self,
        session: &SessionHandle,
        name: &str,
        count: usize,
        supers: &[&str],
    ) -> Result<Arc<ImmutableClassView>> {
        self.create_with(session, |guard| {
            guard.create_class_with_collections(name, count, supers)
        })
    }

    pub fn create_class_with_collection_ids(
        &self,
        session: &SessionHandle,
        name: &str,
        collection_ids: &[CollectionId],
        supers: &[&str],
    ) -> Result<Arc<ImmutableClassView>> {
        self.create_with(session, |guard| {
            guard.create_class_with_collection_ids(name, collection_ids, supers)
        })
    }

    pub fn create_abstract_class(
        &self,
        session: &SessionHandle,
        name: &str,
        supers: &[&str],
    ) -> Result<Arc<ImmutableClassView>> {
        self.create_with(session, |guard| guard.create_abstract_class(name, supers))
    }

    pub fn get_or_create_class(
        &self,
        session: &SessionHandle,
        name: &str,
        supers: &[&str],
    ) -> Result<Arc<ImmutableClassView>> {
        if let Some(view) = self.snapshot().class(name) {
            return Ok(view);
        }
        self.create_with(session, |guard| guard.get_or_create_class(name, supers))
    }

    pub fn drop_class(&self, session: &SessionHandle, name: &str) -> Result<()> {
        self.mutate(session, |guard| guard.drop_class(name))
    }

    pub fn rename_class(&self, session: &SessionHandle, name: &str, new_name: &str) -> Result<()> {
        self.mutate(session, |guard| guard.rename_class(name, new_name))
    }

    pub fn set_super_classes(
        &self,
        session: &SessionHandle,
        name: &str,
        supers: &[&str],
    ) -> Result<()> {
        self.mutate(session, |guard| guard.set_super_classes(name, supers))
    }

    pub fn add_super_class(
        &self,
        session: &SessionHandle,
        name: &str,
        super_class: &str,
    ) -> Result<()> {
        self.mutate(session, |guard| guard.add_super_class(name, super_class))
    }

    pub fn remove_super_class(
        &self,
        session: &SessionHandle,
        name: &str,
        super_class: &str,
    ) -> Result<()> {
        self.mutate(session, |guard| guard.remove_super_class(name, super_class))
    }

    pub fn set_abstract(&self, session: &SessionHandle, name: &str, is_abstract: bool) -> Result<()> {
        self.mutate(session, |guard| guard.set_abstract(name, is_abstract))
    }

    pub fn alter_class(&self, session: &SessionHandle, name: &str, change: ClassChange) -> Result<()> {
        self.mutate(session, |guard| guard.alter_class(name, change))
    }

    pub fn add_property(
        &self,
        session: &SessionHandle,
        class: &str,
        property: NewProperty,
    ) -> Result<()> {
        self.mutate(session, |guard| guard.add_property(class, property))
    }

    pub fn drop_property(&self, session: &SessionHandle, class: &str, property: &str) -> Result<()> {
        self.mutate(session, |guard| guard.drop_property(class, property))
    }

    pub fn alter_property(
        &self,
        session: &SessionHandle,
        class: &str,
        property: &str,
        change: PropertyChange,
    ) -> Result<()> {
        self.mutate(session, |guard| guard.alter_property(class, property, change))
    }

    pub fn create_index(
        &self,
        session: &SessionHandle,
        class: &str,
        index_name: &str,
        index_type: &str,
        fields: &[&str],
        metadata: &BTreeMap<String, String>,
    ) -> Result<IndexInfo> {
        self.mutate(session, |guard| {
            guard.create_index(class, index_name, index_type, fields, metadata)
        })
    }

    pub fn add_blob_collection(&self, session: &SessionHandle, collection_id: CollectionId) -> Result<()> {
        self.mutate(session, |guard| guard.add_blob_collection(collection_id))
    }

    pub fn remove_blob_collection(
        &self,
        session: &SessionHandle,
        collection_id: CollectionId,
    ) -> Result<bool> {
        self.mutate(session, |guard| guard.remove_blob_collection(collection_id))
    }
}

fn read_only() -> Error {
    Error::ReadOnly("schema changes are applied by the server in remote mode".to_string())
}
