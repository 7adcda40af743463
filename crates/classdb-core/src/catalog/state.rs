//! Live, lock-protected catalog state.
//!
//! Classes live in an arena of [`LazyClassRef`] slots addressed by
//! [`ClassId`]; super/subclass edges are ids into the same arena. Slots are
//! never reused: a dropped class leaves an empty slot behind.

use super::class::ClassDescriptor;
use super::global_property::GlobalPropertyTable;
use super::lazy::LazyClassRef;
use super::names::normalize;
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::index::IndexManager;
use crate::storage::document::{ClassDocument, RootDocument};
use crate::storage::{
    CollectionStore, Document, DocumentStore, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION,
};
use crate::types::{ClassId, CollectionId, RecordId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators shared by the catalog and its state.
pub(crate) struct CatalogEnv {
    pub config: CatalogConfig,
    pub documents: Arc<dyn DocumentStore>,
    pub collections: Arc<dyn CollectionStore>,
    pub indexes: Arc<dyn IndexManager>,
}

/// Mutable catalog state, guarded by the catalog's lock.
pub struct CatalogState {
    pub(crate) env: Arc<CatalogEnv>,
    pub(crate) slots: Vec<Option<LazyClassRef>>,
    pub(crate) by_name: HashMap<String, ClassId>,
    pub(crate) collection_to_class: HashMap<CollectionId, ClassId>,
    pub(crate) blob_collections: BTreeSet<CollectionId>,
    pub(crate) global_properties: GlobalPropertyTable,
    pub(crate) dirty: BTreeSet<ClassId>,
    pub(crate) root_dirty: bool,
    pub(crate) removed_records: Vec<RecordId>,
    pub(crate) root_id: Option<RecordId>,
    pub(crate) version: u64,
}

impl CatalogState {
    pub(crate) fn empty(env: Arc<CatalogEnv>) -> Self {
        Self {
            env,
            slots: Vec::new(),
            by_name: HashMap::new(),
            collection_to_class: HashMap::new(),
            blob_collections: BTreeSet::new(),
            global_properties: GlobalPropertyTable::new(),
            dirty: BTreeSet::new(),
            root_dirty: true,
            removed_records: Vec::new(),
            root_id: None,
            version: 0,
        }
    }

    /// Read the catalog from the document store.
    ///
    /// A store without a root record yields an empty catalog that will be
    /// written on the first commit.
    pub(crate) fn load(env: Arc<CatalogEnv>) -> Result<Self> {
        let Some(root_id) = env.documents.root_id()? else {
            info!("no schema record found, creating an empty catalog");
            return Ok(Self::empty(env));
        };
        let root = match env.documents.load(root_id)? {
            Document::Schema(root) => root,
            other => {
                return Err(Error::Deserialization(format!(
                    "record {} holds a {} document, expected the schema root",
                    root_id,
                    other.kind()
                )))
            }
        };

        match root.schema_version {
            None => {
                error!(
                    record = %root_id,
                    "database schema is empty, recreating it; double check the integrity of the database"
                );
                let mut state = Self::empty(env);
                state.root_id = Some(root_id);
                return Ok(state);
            }
            Some(v) if v == CURRENT_SCHEMA_VERSION || v == LEGACY_SCHEMA_VERSION => {}
            Some(v) => {
                return Err(Error::Configuration(format!(
                    "database schema is different (found version {}, expected {}). \
                     Please export your old database with the previous version and reimport it",
                    v, CURRENT_SCHEMA_VERSION
                )))
            }
        }

        let mut state = Self::empty(env);
        state.root_dirty = false;
        state.root_id = Some(root_id);
        state.global_properties = GlobalPropertyTable::from_documents(&root.global_properties)?;
        state.blob_collections = root.blob_clusters.clone();

        for (name, record) in &root.classes_refs {
            let id = ClassId(state.slots.len());
            state.slots.push(Some(LazyClassRef::unloaded(*record)));
            state.by_name.insert(normalize(name), id);
        }

        let ids = state.class_ids();
        for id in &ids {
            state.load_shallow(*id)?;
        }
        for id in &ids {
            state.load_full(*id)?;
        }
        for id in &ids {
            let owned: Vec<CollectionId> = state.get(*id)?.real_collection_ids().collect();
            for collection_id in owned {
                state.collection_to_class.insert(collection_id, *id);
            }
        }

        info!(classes = ids.len(), record = %root_id, "loaded schema catalog");
        Ok(state)
    }

    fn load_shallow(&mut self, id: ClassId) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| missing_slot(id))?;
        slot.load_shallow(id, self.env.documents.as_ref(), &mut self.global_properties)
    }

    /// Wire the inheritance edges of one class. Neighbours are only loaded
    /// shallow; their own edges are wired by their own full load.
    fn load_full(&mut self, id: ClassId) -> Result<()> {
        self.load_shallow(id)?;
        let slot = self.slot_mut(id)?;
        if slot.is_full() {
            return Ok(());
        }
        let pending = slot.take_pending();
        let class_name = self.get(id)?.name.clone();

        for super_name in &pending.super_classes {
            let super_id = self.class_id(super_name).ok_or_else(|| {
                Error::Configuration(format!(
                    "super class '{}' was declared in class '{}' but was not found in schema",
                    super_name, class_name
                ))
            })?;
            self.load_shallow(super_id)?;
            self.link_loaded(id, super_id)?;
        }

        for sub_name in &pending.sub_classes {
            match self.class_id(sub_name) {
                Some(sub_id) => {
                    self.load_shallow(sub_id)?;
                    let class = self.get_mut(id)?;
                    if !class.sub_classes.contains(&sub_id) {
                        class.sub_classes.push(sub_id);
                    }
                }
                None => warn!(
                    class = %class_name,
                    sub_class = %sub_name,
                    "subclass listed in class document is not in the schema"
                ),
            }
        }

        self.slot_mut(id)?.mark_full();
        Ok(())
    }

    fn link_loaded(&mut self, child: ClassId, parent: ClassId) -> Result<()> {
        let child_class = self.get_mut(child)?;
        if !child_class.super_classes.contains(&parent) {
            child_class.super_classes.push(parent);
        }
        let inherited = child_class.polymorphic_collection_ids.clone();
        let parent_class = self.get_mut(parent)?;
        if !parent_class.sub_classes.contains(&child) {
            parent_class.sub_classes.push(child);
        }
        for target in self.self_and_ancestors(parent)? {
            let class = self.get_mut(target)?;
            for collection_id in &inherited {
                super::class::insert_sorted(&mut class.polymorphic_collection_ids, *collection_id);
            }
        }
        Ok(())
    }

    /// Write dirty classes, the root record, and delete dropped class records.
    pub(crate) fn persist(&mut self) -> Result<()> {
        let dirty: Vec<ClassId> = self.dirty.iter().copied().collect();
        for id in dirty {
            let Some(slot) = self.slots.get(id.0).and_then(Option::as_ref) else {
                self.dirty.remove(&id);
                continue;
            };
            let previous = slot.persisted_id;
            let doc = self.class_document(id)?;
            let record = self.env.documents.save(&Document::Class(doc), previous)?;
            if previous != Some(record) {
                self.slot_mut(id)?.persisted_id = Some(record);
                self.root_dirty = true;
            }
            self.dirty.remove(&id);
        }

        let root = self.root_document()?;
        let record = self.env.documents.save(&Document::Schema(root), self.root_id)?;
        if self.root_id != Some(record) {
            self.env.documents.set_root_id(record)?;
            self.root_id = Some(record);
        }
        self.root_dirty = false;

        while let Some(record) = self.removed_records.pop() {
            if let Err(e) = self.env.documents.delete(record) {
                self.removed_records.push(record);
                return Err(e);
            }
        }
        self.env.documents.flush()?;
        debug!(version = self.version, "persisted schema catalog");
        Ok(())
    }

    pub(crate) fn class_document(&self, id: ClassId) -> Result<ClassDocument> {
        let class = self.get(id)?;
        let super_classes = self.names_of(&class.super_classes)?;
        let sub_classes = self.names_of(&class.sub_classes)?;
        Ok(ClassDocument {
            name: class.name.clone(),
            description: class.description.clone(),
            default_collection_id: class.default_collection_id,
            collection_ids: class.collection_ids.clone(),
            collection_selection: class.collection_selection.clone(),
            over_size: class.over_size,
            strict_mode: class.strict_mode,
            is_abstract: class.is_abstract,
            properties: class.properties.values().map(|p| p.to_document()).collect(),
            super_class: super_classes.first().cloned(),
            super_classes,
            sub_classes,
            custom_fields: class.custom_fields.clone(),
        })
    }

    pub(crate) fn root_document(&self) -> Result<RootDocument> {
        let mut classes_refs = std::collections::BTreeMap::new();
        for id in self.class_ids() {
            let slot = self.slot(id)?;
            let record = slot.persisted_id.ok_or_else(|| {
                Error::Serialization(format!(
                    "class '{}' has not been saved",
                    slot.descriptor().map(|c| c.name.as_str()).unwrap_or("?")
                ))
            })?;
            classes_refs.insert(self.get(id)?.name.clone(), record);
        }
        Ok(RootDocument {
            schema_version: Some(CURRENT_SCHEMA_VERSION),
            classes_refs,
            global_properties: self.global_properties.to_documents(),
            blob_clusters: self.blob_collections.clone(),
        })
    }

    // Registry access

    /// Catalog version, bumped on every commit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Ids of all live classes, in arena order.
    pub fn class_ids(&self) -> Vec<ClassId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ClassId(index))
            .collect()
    }

    /// Number of classes.
    pub fn count_classes(&self) -> usize {
        self.by_name.len()
    }

    /// Names of all classes, sorted case-insensitively.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .class_ids()
            .into_iter()
            .filter_map(|id| self.class(id).map(|c| c.name.clone()))
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    /// Resolve a class name, case-insensitively.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(&normalize(name)).copied()
    }

    /// Whether a class with this name exists.
    pub fn exists_class(&self, name: &str) -> bool {
        self.class_id(name).is_some()
    }

    /// Loaded descriptor of a class.
    pub fn class(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .and_then(LazyClassRef::descriptor)
    }

    /// Loaded descriptor of a class, by name.
    pub fn class_by_name(&self, name: &str) -> Option<&ClassDescriptor> {
        self.class_id(name).and_then(|id| self.class(id))
    }

    /// Class owning a collection.
    pub fn class_by_collection_id(&self, collection_id: CollectionId) -> Option<&ClassDescriptor> {
        self.collection_to_class
            .get(&collection_id)
            .and_then(|id| self.class(*id))
    }

    /// Collections reserved for blobs.
    pub fn blob_collections(&self) -> &BTreeSet<CollectionId> {
        &self.blob_collections
    }

    /// The global property table.
    pub fn global_properties(&self) -> &GlobalPropertyTable {
        &self.global_properties
    }

    /// Whether the class has unpersisted changes.
    pub fn is_dirty(&self, id: ClassId) -> bool {
        self.dirty.contains(&id)
    }

    /// Whether `id` is `ancestor` or inherits from it.
    pub fn is_sub_class_of(&self, id: ClassId, ancestor: ClassId) -> bool {
        let mut stack = vec![id];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(class) = self.class(current) {
                stack.extend(class.super_classes.iter().copied());
            }
        }
        false
    }

    /// Transitive super classes, nearest first, without duplicates.
    pub fn all_super_classes(&self, id: ClassId) -> Vec<ClassId> {
        self.walk(id, |class| &class.super_classes)
    }

    /// Transitive subclasses, nearest first, without duplicates.
    pub fn all_sub_classes(&self, id: ClassId) -> Vec<ClassId> {
        self.walk(id, |class| &class.sub_classes)
    }

    fn walk<F>(&self, id: ClassId, edges: F) -> Vec<ClassId>
    where
        F: Fn(&ClassDescriptor) -> &Vec<ClassId>,
    {
        let mut found = Vec::new();
        let mut queue = std::collections::VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(class) = self.class(current) {
                for next in edges(class) {
                    if *next != id && !found.contains(next) {
                        found.push(*next);
                        queue.push_back(*next);
                    }
                }
            }
        }
        found
    }

    // Internal helpers

    pub(crate) fn slot(&self, id: ClassId) -> Result<&LazyClassRef> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| missing_slot(id))
    }

    pub(crate) fn slot_mut(&mut self, id: ClassId) -> Result<&mut LazyClassRef> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| missing_slot(id))
    }

    pub(crate) fn get(&self, id: ClassId) -> Result<&ClassDescriptor> {
        self.slot(id)?.descriptor().ok_or_else(|| missing_slot(id))
    }

    pub(crate) fn get_mut(&mut self, id: ClassId) -> Result<&mut ClassDescriptor> {
        self.slot_mut(id)?
            .descriptor_mut()
            .ok_or_else(|| missing_slot(id))
    }

    /// Resolve a class name or fail with `NotFound`.
    pub(crate) fn require(&self, name: &str) -> Result<ClassId> {
        self.class_id(name)
            .ok_or_else(|| Error::NotFound(format!("class '{}'", name.trim())))
    }

    pub(crate) fn name_of(&self, id: ClassId) -> Result<String> {
        Ok(self.get(id)?.name.clone())
    }

    pub(crate) fn names_of(&self, ids: &[ClassId]) -> Result<Vec<String>> {
        ids.iter().map(|id| self.name_of(*id)).collect()
    }

    pub(crate) fn self_and_ancestors(&self, id: ClassId) -> Result<Vec<ClassId>> {
        self.get(id)?;
        let mut ids = vec![id];
        ids.extend(self.all_super_classes(id));
        Ok(ids)
    }

    pub(crate) fn mark_dirty(&mut self, id: ClassId) {
        self.dirty.insert(id);
    }

    pub(crate) fn config(&self) -> &CatalogConfig {
        &self.env.config
    }
}

fn missing_slot(id: ClassId) -> Error {
    Error::NotFound(format!("class slot {}", id.0))
}
