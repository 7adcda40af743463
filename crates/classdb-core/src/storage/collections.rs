//! Physical collections as seen by the catalog.
//!
//! The catalog never reads record payloads. It needs collection lookup and
//! lifecycle, record counts, and the shape of stored property values so
//! that new property declarations can be checked against existing data.

use crate::error::{Error, Result};
use crate::types::{CollectionId, PropertyType};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

/// Shape of one stored property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// Type of the stored value.
    pub value_type: PropertyType,
    /// Class of the linked or embedded record, when there is one.
    pub target_class: Option<String>,
    /// Types of the elements of a collection value.
    pub element_types: Vec<PropertyType>,
}

impl StoredValue {
    /// A plain value of the given type.
    pub fn of(value_type: PropertyType) -> Self {
        Self {
            value_type,
            target_class: None,
            element_types: Vec::new(),
        }
    }

    /// A link to a record of `class`.
    pub fn link_to(class: impl Into<String>) -> Self {
        Self::of(PropertyType::Link).with_target_class(class)
    }

    /// A collection value with the given element types.
    pub fn collection(value_type: PropertyType, element_types: Vec<PropertyType>) -> Self {
        Self {
            value_type,
            target_class: None,
            element_types,
        }
    }

    /// Set the class of the linked or embedded record.
    pub fn with_target_class(mut self, class: impl Into<String>) -> Self {
        self.target_class = Some(class.into());
        self
    }
}

/// Physical collection operations consumed by the catalog.
pub trait CollectionStore: Send + Sync {
    /// Id of the collection with the given name.
    fn id_by_name(&self, name: &str) -> Option<CollectionId>;

    /// Name of the collection with the given id.
    fn name_by_id(&self, id: CollectionId) -> Option<String>;

    /// Create a collection. Names are stored lower-cased.
    fn add_collection(&self, name: &str) -> Result<CollectionId>;

    /// Drop a collection and every record in it.
    fn drop_collection(&self, id: CollectionId) -> Result<()>;

    /// Delete every record of a collection, keeping the collection.
    fn truncate_collection(&self, id: CollectionId) -> Result<()>;

    /// Rename a collection.
    fn rename_collection(&self, id: CollectionId, new_name: &str) -> Result<()>;

    /// Number of records in a collection.
    fn count_records(&self, id: CollectionId) -> Result<u64>;

    /// Values of `property` across the records of a collection that have it.
    fn scan_property(&self, id: CollectionId, property: &str) -> Result<Vec<StoredValue>>;
}

#[derive(Debug)]
struct MemCollection {
    name: String,
    records: Vec<BTreeMap<String, StoredValue>>,
}

/// In-memory collection store.
#[derive(Debug)]
pub struct MemoryCollectionStore {
    collections: DashMap<CollectionId, MemCollection>,
    names: DashMap<String, CollectionId>,
    next_id: AtomicI32,
}

impl Default for MemoryCollectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollectionStore {
    /// Create an empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicI32::new(1),
        }
    }

    /// Append a record to a collection.
    pub fn insert_record<'a>(
        &self,
        id: CollectionId,
        fields: impl IntoIterator<Item = (&'a str, StoredValue)>,
    ) -> Result<()> {
        let mut collection = self
            .collections
            .get_mut(&id)
            .ok_or_else(|| missing(id))?;
        collection.records.push(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        );
        Ok(())
    }

    /// Number of collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether the store holds no collections.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

fn missing(id: CollectionId) -> Error {
    Error::Collection(format!("collection {} does not exist", id))
}

impl CollectionStore for MemoryCollectionStore {
    fn id_by_name(&self, name: &str) -> Option<CollectionId> {
        self.names.get(&name.to_lowercase()).map(|id| *id)
    }

    fn name_by_id(&self, id: CollectionId) -> Option<String> {
        self.collections.get(&id).map(|c| c.name.clone())
    }

    fn add_collection(&self, name: &str) -> Result<CollectionId> {
        let name = name.to_lowercase();
        if self.names.contains_key(&name) {
            return Err(Error::Collection(format!(
                "collection '{}' already exists",
                name
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.names.insert(name.clone(), id);
        self.collections.insert(
            id,
            MemCollection {
                name,
                records: Vec::new(),
            },
        );
        Ok(id)
    }

    fn drop_collection(&self, id: CollectionId) -> Result<()> {
        let (_, collection) = self.collections.remove(&id).ok_or_else(|| missing(id))?;
        self.names.remove(&collection.name);
        Ok(())
    }

    fn truncate_collection(&self, id: CollectionId) -> Result<()> {
        let mut collection = self
            .collections
            .get_mut(&id)
            .ok_or_else(|| missing(id))?;
        collection.records.clear();
        Ok(())
    }

    fn rename_collection(&self, id: CollectionId, new_name: &str) -> Result<()> {
        let new_name = new_name.to_lowercase();
        if self.names.contains_key(&new_name) {
            return Err(Error::Collection(format!(
                "collection '{}' already exists",
                new_name
            )));
        }
        let mut collection = self
            .collections
            .get_mut(&id)
            .ok_or_else(|| missing(id))?;
        self.names.remove(&collection.name);
        self.names.insert(new_name.clone(), id);
        collection.name = new_name;
        Ok(())
    }

    fn count_records(&self, id: CollectionId) -> Result<u64> {
        self.collections
            .get(&id)
            .map(|c| c.records.len() as u64)
            .ok_or_else(|| missing(id))
    }

    fn scan_property(&self, id: CollectionId, property: &str) -> Result<Vec<StoredValue>> {
        let collection = self.collections.get(&id).ok_or_else(|| missing(id))?;
        Ok(collection
            .records
            .iter()
            .filter_map(|record| record.get(property).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let store = MemoryCollectionStore::new();
        let id = store.add_collection("Person").unwrap();
        assert_eq!(store.id_by_name("person"), Some(id));
        assert_eq!(store.id_by_name("PERSON"), Some(id));
        assert_eq!(store.name_by_id(id).as_deref(), Some("person"));
        assert!(store.add_collection("person").is_err());
    }

    #[test]
    fn test_rename_and_drop() {
        let store = MemoryCollectionStore::new();
        let id = store.add_collection("a").unwrap();
        store.add_collection("b").unwrap();
        assert!(store.rename_collection(id, "b").is_err());
        store.rename_collection(id, "c").unwrap();
        assert_eq!(store.id_by_name("a"), None);
        assert_eq!(store.id_by_name("c"), Some(id));
        store.drop_collection(id).unwrap();
        assert_eq!(store.id_by_name("c"), None);
        assert!(store.drop_collection(id).is_err());
    }

    #[test]
    fn test_records_and_scan() {
        let store = MemoryCollectionStore::new();
        let id = store.add_collection("person").unwrap();
        store
            .insert_record(id, [("age", StoredValue::of(PropertyType::Integer))])
            .unwrap();
        store
            .insert_record(id, [("name", StoredValue::of(PropertyType::String))])
            .unwrap();
        assert_eq!(store.count_records(id).unwrap(), 2);
        let ages = store.scan_property(id, "age").unwrap();
        assert_eq!(ages, vec![StoredValue::of(PropertyType::Integer)]);
        assert!(store.count_records(99).is_err());

        store.truncate_collection(id).unwrap();
        assert_eq!(store.count_records(id).unwrap(), 0);
        assert_eq!(store.id_by_name("person"), Some(id));
    }
}
