//! Immutable schema snapshots.
//!
//! A snapshot is built from the catalog state at the end of every write
//! scope and published as an `Arc`. Readers keep the `Arc` they got for as
//! long as they like; later commits never touch it.

use super::global_property::{GlobalProperty, GlobalPropertyTable};
use super::names::normalize;
use super::property::PropertyDescriptor;
use super::state::CatalogState;
use crate::error::Result;
use crate::index::{IndexInfo, IndexManager};
use crate::types::{ClassId, CollectionId, PropertyType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Read-only property, tagged with the class that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableProperty {
    owner_class: String,
    descriptor: PropertyDescriptor,
}

impl ImmutableProperty {
    /// Class that declares the property.
    pub fn owner_class(&self) -> &str {
        &self.owner_class
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.descriptor.property_type
    }

    /// Every other attribute.
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }
}

/// Read-only view of one class.
#[derive(Debug, Clone)]
pub struct ImmutableClassView {
    name: String,
    description: Option<String>,
    is_abstract: bool,
    strict_mode: bool,
    over_size: f32,
    collection_selection: String,
    collection_ids: Vec<CollectionId>,
    default_collection_id: CollectionId,
    polymorphic_collection_ids: Vec<CollectionId>,
    super_classes: Vec<String>,
    sub_classes: Vec<String>,
    all_super_classes: Vec<String>,
    declared: BTreeMap<String, Arc<ImmutableProperty>>,
    properties: BTreeMap<String, Arc<ImmutableProperty>>,
    indexes: Vec<IndexInfo>,
    custom_fields: BTreeMap<String, String>,
}

impl ImmutableClassView {
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

    pub fn collection_selection(&self) -> &str {
        &self.collection_selection
    }

    pub fn collection_ids(&self) -> &[CollectionId] {
        &self.collection_ids
    }

    pub fn default_collection_id(&self) -> CollectionId {
        self.default_collection_id
    }

    pub fn polymorphic_collection_ids(&self) -> &[CollectionId] {
        &self.polymorphic_collection_ids
    }

    pub fn has_polymorphic_collection_id(&self, id: CollectionId) -> bool {
        self.polymorphic_collection_ids.binary_search(&id).is_ok()
    }

    /// Direct super class names, in declaration order.
    pub fn super_class_names(&self) -> &[String] {
        &self.super_classes
    }

    /// Direct subclass names.
    pub fn sub_class_names(&self) -> &[String] {
        &self.sub_classes
    }

    /// Transitive super class names, nearest first.
    pub fn all_super_class_names(&self) -> &[String] {
        &self.all_super_classes
    }

    /// Whether this class is `name` or inherits from it.
    pub fn is_sub_class_of(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self
                .all_super_classes
                .iter()
                .any(|s| s.eq_ignore_ascii_case(name))
    }

    /// Property by name, own or inherited.
    pub fn property(&self, name: &str) -> Option<&Arc<ImmutableProperty>> {
        self.properties.get(&name.to_lowercase())
    }

    pub fn exists_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Property declared on this class itself.
    pub fn declared_property(&self, name: &str) -> Option<&Arc<ImmutableProperty>> {
        self.declared.get(&name.to_lowercase())
    }

    /// Own and inherited properties; own ones win on name clashes.
    pub fn properties(&self) -> impl Iterator<Item = &Arc<ImmutableProperty>> {
        self.properties.values()
    }

    pub fn declared_properties(&self) -> impl Iterator<Item = &Arc<ImmutableProperty>> {
        self.declared.values()
    }

    /// Indexes of this class and its super classes.
    pub fn indexes(&self) -> &[IndexInfo] {
        &self.indexes
    }

    pub fn custom(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(String::as_str)
    }

    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom_fields
    }
}

/// Resolved, read-only copy of the whole catalog at one version.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    version: u64,
    classes: HashMap<String, Arc<ImmutableClassView>>,
    collection_to_class: HashMap<CollectionId, String>,
    global_properties: GlobalPropertyTable,
    blob_collections: BTreeSet<CollectionId>,
}

impl SchemaSnapshot {
    /// Build a snapshot of the current state.
    pub(crate) fn build(state: &CatalogState, indexes: &dyn IndexManager) -> Result<Self> {
        let mut classes = HashMap::with_capacity(state.count_classes());
        for id in state.class_ids() {
            let class = state.get(id)?;

            let declared: BTreeMap<String, Arc<ImmutableProperty>> = class
                .properties
                .iter()
                .map(|(key, prop)| {
                    let view = ImmutableProperty {
                        owner_class: class.name.clone(),
                        descriptor: prop.clone(),
                    };
                    (key.clone(), Arc::new(view))
                })
                .collect();

            let mut properties = BTreeMap::new();
            for (key, prop) in state.properties_map(id) {
                let view = match declared.get(&key) {
                    Some(own) => Arc::clone(own),
                    None => Arc::new(ImmutableProperty {
                        owner_class: owner_of(state, id, &key),
                        descriptor: prop.clone(),
                    }),
                };
                properties.insert(key, view);
            }

            let all_super_ids = state.all_super_classes(id);
            let all_super_classes = state.names_of(&all_super_ids)?;

            let mut class_indexes = indexes.class_indexes(&class.name);
            for name in &all_super_classes {
                for index in indexes.class_indexes(name) {
                    if !class_indexes.iter().any(|i| i.name == index.name) {
                        class_indexes.push(index);
                    }
                }
            }

            let view = ImmutableClassView {
                name: class.name.clone(),
                description: class.description.clone(),
                is_abstract: class.is_abstract,
                strict_mode: class.strict_mode,
                over_size: class.over_size,
                collection_selection: class.collection_selection.clone(),
                collection_ids: class.collection_ids.clone(),
                default_collection_id: class.default_collection_id,
                polymorphic_collection_ids: class.polymorphic_collection_ids.clone(),
                super_classes: state.names_of(&class.super_classes)?,
                sub_classes: state.names_of(&class.sub_classes)?,
                all_super_classes,
                declared,
                properties,
                indexes: class_indexes,
                custom_fields: class.custom_fields.clone(),
            };
            classes.insert(class.name.to_lowercase(), Arc::new(view));
        }

        let collection_to_class = state
            .collection_to_class
            .iter()
            .filter_map(|(collection_id, owner)| {
                state.class(*owner).map(|c| (*collection_id, c.name.clone()))
            })
            .collect();

        Ok(Self {
            version: state.version(),
            classes,
            collection_to_class,
            global_properties: state.global_properties.clone(),
            blob_collections: state.blob_collections.clone(),
        })
    }

    /// Catalog version this snapshot was built at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Class by name, case-insensitive.
    pub fn class(&self, name: &str) -> Option<Arc<ImmutableClassView>> {
        self.classes.get(&normalize(name)).cloned()
    }

    pub fn exists_class(&self, name: &str) -> bool {
        self.classes.contains_key(&normalize(name))
    }

    pub fn count_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class names, sorted case-insensitively.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.values().map(|c| c.name.clone()).collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ImmutableClassView>> {
        self.classes.values()
    }

    /// Direct super classes of a view, in declaration order.
    pub fn super_classes(&self, class: &ImmutableClassView) -> Vec<Arc<ImmutableClassView>> {
        class
            .super_classes
            .iter()
            .filter_map(|name| self.class(name))
            .collect()
    }

    /// Direct subclasses of a view.
    pub fn sub_classes(&self, class: &ImmutableClassView) -> Vec<Arc<ImmutableClassView>> {
        class
            .sub_classes
            .iter()
            .filter_map(|name| self.class(name))
            .collect()
    }

    /// Class owning a collection.
    pub fn class_by_collection_id(&self, id: CollectionId) -> Option<Arc<ImmutableClassView>> {
        self.collection_to_class
            .get(&id)
            .and_then(|name| self.class(name))
    }

    pub fn global_property(&self, id: u32) -> Option<&GlobalProperty> {
        self.global_properties.get(id)
    }

    pub fn global_properties(&self) -> &GlobalPropertyTable {
        &self.global_properties
    }

    pub fn blob_collections(&self) -> &BTreeSet<CollectionId> {
        &self.blob_collections
    }
}

/// Name of the class whose declaration of the key is inherited.
fn owner_of(state: &CatalogState, id: ClassId, key: &str) -> String {
    state
        .property_owner(id, key)
        .and_then(|owner| state.class(owner))
        .map(|class| class.name.clone())
        .unwrap_or_default()
}
