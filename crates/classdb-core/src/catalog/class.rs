//! Class metadata.
//!
//! A `ClassDescriptor` only knows its own fields. Edges to other classes are
//! arena ids, resolved and kept consistent by the catalog state.

use super::property::PropertyDescriptor;
use crate::error::{Error, Result};
use crate::types::{ClassId, CollectionId, NOT_EXISTENT_COLLECTION_ID};
use std::collections::BTreeMap;

/// Collection selection strategies.
pub const COLLECTION_SELECTIONS: &[&str] = &["round-robin", "default", "balanced"];

/// Metadata of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub(crate) id: ClassId,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) strict_mode: bool,
    pub(crate) over_size: f32,
    /// Keyed by lower-cased property name.
    pub(crate) properties: BTreeMap<String, PropertyDescriptor>,
    pub(crate) super_classes: Vec<ClassId>,
    pub(crate) sub_classes: Vec<ClassId>,
    pub(crate) collection_ids: Vec<CollectionId>,
    pub(crate) default_collection_id: CollectionId,
    pub(crate) polymorphic_collection_ids: Vec<CollectionId>,
    pub(crate) custom_fields: BTreeMap<String, String>,
    pub(crate) collection_selection: String,
}

impl ClassDescriptor {
    /// Create a descriptor over the given direct collections.
    ///
    /// An empty list or the sentinel alone makes the class abstract.
    pub(crate) fn new(id: ClassId, name: &str, collection_ids: &[CollectionId]) -> Self {
        let mut ids: Vec<CollectionId> = collection_ids
            .iter()
            .copied()
            .filter(|id| *id != NOT_EXISTENT_COLLECTION_ID)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let is_abstract = ids.is_empty();
        let default_collection_id = collection_ids
            .iter()
            .copied()
            .find(|id| *id != NOT_EXISTENT_COLLECTION_ID)
            .unwrap_or(NOT_EXISTENT_COLLECTION_ID);
        let polymorphic_collection_ids = ids.clone();
        if is_abstract {
            ids.push(NOT_EXISTENT_COLLECTION_ID);
        }

        Self {
            id,
            name: name.to_string(),
            description: None,
            is_abstract,
            strict_mode: false,
            over_size: 0.0,
            properties: BTreeMap::new(),
            super_classes: Vec::new(),
            sub_classes: Vec::new(),
            collection_ids: ids,
            default_collection_id,
            polymorphic_collection_ids,
            custom_fields: BTreeMap::new(),
            collection_selection: "round-robin".to_string(),
        }
    }

    /// Arena id.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name, case preserved.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn over_size(&self) -> f32 {
        self.over_size
    }

    /// Collection selection strategy for new records.
    pub fn collection_selection(&self) -> &str {
        &self.collection_selection
    }

    /// Direct collection ids, sorted. `[-1]` for abstract classes.
    pub fn collection_ids(&self) -> &[CollectionId] {
        &self.collection_ids
    }

    /// Direct collection ids without the abstract sentinel.
    pub fn real_collection_ids(&self) -> impl Iterator<Item = CollectionId> + '_ {
        self.collection_ids
            .iter()
            .copied()
            .filter(|id| *id != NOT_EXISTENT_COLLECTION_ID)
    }

    pub fn default_collection_id(&self) -> CollectionId {
        self.default_collection_id
    }

    /// Direct ids plus those of every subclass, sorted.
    pub fn polymorphic_collection_ids(&self) -> &[CollectionId] {
        &self.polymorphic_collection_ids
    }

    pub fn has_collection_id(&self, id: CollectionId) -> bool {
        self.collection_ids.binary_search(&id).is_ok()
    }

    pub fn has_polymorphic_collection_id(&self, id: CollectionId) -> bool {
        self.polymorphic_collection_ids.binary_search(&id).is_ok()
    }

    /// Direct super classes, in declaration order.
    pub fn super_class_ids(&self) -> &[ClassId] {
        &self.super_classes
    }

    /// Direct subclasses.
    pub fn sub_class_ids(&self) -> &[ClassId] {
        &self.sub_classes
    }

    /// Property declared on this class (not inherited), case-insensitive.
    pub fn declared_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(&name.to_lowercase())
    }

    /// Properties declared on this class.
    pub fn declared_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn custom(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(String::as_str)
    }

    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom_fields
    }

    pub(crate) fn set_description(&mut self, description: Option<String>) {
        self.description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub(crate) fn set_over_size(&mut self, over_size: f32) -> Result<()> {
        if !over_size.is_finite() || over_size < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "over size must be a non-negative number, got {}",
                over_size
            )));
        }
        self.over_size = over_size;
        Ok(())
    }

    pub(crate) fn set_collection_selection(&mut self, strategy: &str) -> Result<()> {
        let strategy = strategy.trim().to_lowercase();
        if !COLLECTION_SELECTIONS.contains(&strategy.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "unknown collection selection strategy '{}'",
                strategy
            )));
        }
        self.collection_selection = strategy;
        Ok(())
    }

    pub(crate) fn set_custom(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) if !value.eq_ignore_ascii_case("null") => {
                self.custom_fields.insert(name.to_string(), value.to_string());
            }
            _ => {
                self.custom_fields.remove(name);
            }
        }
    }

    /// Add a direct collection id. Returns false if already present.
    pub(crate) fn insert_collection_id(&mut self, id: CollectionId) -> bool {
        self.collection_ids.retain(|c| *c != NOT_EXISTENT_COLLECTION_ID);
        let inserted = insert_sorted(&mut self.collection_ids, id);
        if self.default_collection_id == NOT_EXISTENT_COLLECTION_ID {
            self.default_collection_id = id;
        }
        self.is_abstract = false;
        inserted
    }

    /// Remove a direct collection id. The default moves to the first
    /// remaining id.
    pub(crate) fn remove_collection_id(&mut self, id: CollectionId) -> bool {
        let removed = remove_sorted(&mut self.collection_ids, id);
        if self.default_collection_id == id {
            self.default_collection_id = self
                .collection_ids
                .first()
                .copied()
                .unwrap_or(NOT_EXISTENT_COLLECTION_ID);
        }
        if self.collection_ids.is_empty() {
            self.collection_ids.push(NOT_EXISTENT_COLLECTION_ID);
        }
        removed
    }

    /// Turn into an abstract class with the sentinel as only collection.
    pub(crate) fn clear_collections(&mut self) {
        self.collection_ids = vec![NOT_EXISTENT_COLLECTION_ID];
        self.default_collection_id = NOT_EXISTENT_COLLECTION_ID;
        self.is_abstract = true;
    }
}

pub(crate) fn insert_sorted(ids: &mut Vec<CollectionId>, id: CollectionId) -> bool {
    match ids.binary_search(&id) {
        Ok(_) => false,
        Err(pos) => {
            ids.insert(pos, id);
            true
        }
    }
}

pub(crate) fn remove_sorted(ids: &mut Vec<CollectionId>, id: CollectionId) -> bool {
    match ids.binary_search(&id) {
        Ok(pos) => {
            ids.remove(pos);
            true
        }
        Err(_) => false,
    }
}
