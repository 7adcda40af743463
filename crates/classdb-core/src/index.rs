//! Secondary index manager interface.
//!
//! The catalog keeps indexes consistent with class changes: every collection
//! that joins a class's polymorphic set is registered with the class's
//! indexes, and leaves them when it goes away.

use crate::error::{Error, Result};
use crate::types::CollectionId;
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, BTreeSet};

/// What an index covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Indexed class.
    pub class_name: String,
    /// Indexed fields, in key order.
    pub fields: Vec<String>,
    /// Collation applied to the key.
    pub collate: String,
}

impl IndexDefinition {
    /// Create a definition with the default collation.
    pub fn new(class_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields,
            collate: "default".to_string(),
        }
    }

    /// Set the collation.
    pub fn with_collate(mut self, collate: impl Into<String>) -> Self {
        self.collate = collate.into();
        self
    }

    /// Whether the index covers the field (case-insensitive).
    pub fn covers(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.eq_ignore_ascii_case(field))
    }
}

/// A defined index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Algorithm/kind, e.g. `UNIQUE` or `NOTUNIQUE`.
    pub index_type: String,
    /// Key definition.
    pub definition: IndexDefinition,
    /// Collections whose records are indexed.
    pub collection_ids: BTreeSet<CollectionId>,
    /// Extra settings.
    pub metadata: BTreeMap<String, String>,
}

/// Index operations consumed by the catalog.
pub trait IndexManager: Send + Sync {
    /// Start indexing the records of a collection.
    fn add_collection_to_index(&self, collection_id: CollectionId, index: &str) -> Result<()>;

    /// Stop indexing the records of a collection.
    fn remove_collection_from_index(&self, collection_id: CollectionId, index: &str)
        -> Result<()>;

    /// Indexes defined on a class (not its super classes).
    fn class_indexes(&self, class_name: &str) -> Vec<IndexInfo>;

    /// Drop an index.
    fn drop_index(&self, name: &str) -> Result<()>;

    /// Create an index over the given collections.
    fn create_index(
        &self,
        name: &str,
        index_type: &str,
        definition: IndexDefinition,
        collection_ids: &[CollectionId],
        metadata: &BTreeMap<String, String>,
    ) -> Result<IndexInfo>;

    /// Re-point index definitions after a class rename.
    fn rename_class(&self, old_name: &str, new_name: &str) -> Result<()>;
}

/// In-memory index manager.
#[derive(Debug, Default)]
pub struct MemoryIndexManager {
    indexes: DashMap<String, IndexInfo>,
    rejected_collections: DashSet<CollectionId>,
}

impl MemoryIndexManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an index by name.
    pub fn index(&self, name: &str) -> Option<IndexInfo> {
        self.indexes.get(&name.to_lowercase()).map(|i| i.clone())
    }

    /// Refuse to register the collection with any index from now on.
    pub fn reject_collection(&self, collection_id: CollectionId) {
        self.rejected_collections.insert(collection_id);
    }

    /// Number of indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Whether no index is defined.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

fn unknown_index(name: &str) -> Error {
    Error::Index(format!("index '{}' does not exist", name))
}

impl IndexManager for MemoryIndexManager {
    fn add_collection_to_index(&self, collection_id: CollectionId, index: &str) -> Result<()> {
        if self.rejected_collections.contains(&collection_id) {
            return Err(Error::Index(format!(
                "collection {} cannot be added to index '{}'",
                collection_id, index
            )));
        }
        let mut info = self
            .indexes
            .get_mut(&index.to_lowercase())
            .ok_or_else(|| unknown_index(index))?;
        info.collection_ids.insert(collection_id);
        Ok(())
    }

    fn remove_collection_from_index(
        &self,
        collection_id: CollectionId,
        index: &str,
    ) -> Result<()> {
        let mut info = self
            .indexes
            .get_mut(&index.to_lowercase())
            .ok_or_else(|| unknown_index(index))?;
        info.collection_ids.remove(&collection_id);
        Ok(())
    }

    fn class_indexes(&self, class_name: &str) -> Vec<IndexInfo> {
        let mut found: Vec<IndexInfo> = self
            .indexes
            .iter()
            .filter(|entry| entry.definition.class_name.eq_ignore_ascii_case(class_name))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn drop_index(&self, name: &str) -> Result<()> {
        self.indexes
            .remove(&name.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| unknown_index(name))
    }

    fn create_index(
        &self,
        name: &str,
        index_type: &str,
        definition: IndexDefinition,
        collection_ids: &[CollectionId],
        metadata: &BTreeMap<String, String>,
    ) -> Result<IndexInfo> {
        let key = name.to_lowercase();
        if self.indexes.contains_key(&key) {
            return Err(Error::Index(format!("index '{}' already exists", name)));
        }
        let info = IndexInfo {
            name: name.to_string(),
            index_type: index_type.to_string(),
            definition,
            collection_ids: collection_ids.iter().copied().collect(),
            metadata: metadata.clone(),
        };
        self.indexes.insert(key, info.clone());
        Ok(info)
    }

    fn rename_class(&self, old_name: &str, new_name: &str) -> Result<()> {
        for mut entry in self.indexes.iter_mut() {
            if entry.definition.class_name.eq_ignore_ascii_case(old_name) {
                entry.definition.class_name = new_name.to_string();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_index() -> MemoryIndexManager {
        let manager = MemoryIndexManager::new();
        manager
            .create_index(
                "Person.name",
                "NOTUNIQUE",
                IndexDefinition::new("Person", vec!["name".into()]),
                &[3],
                &BTreeMap::new(),
            )
            .unwrap();
        manager
    }

    #[test]
    fn test_create_and_lookup() {
        let manager = manager_with_index();
        let indexes = manager.class_indexes("person");
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].definition.covers("NAME"));
        assert!(manager
            .create_index(
                "person.NAME",
                "UNIQUE",
                IndexDefinition::new("Person", vec!["name".into()]),
                &[],
                &BTreeMap::new()
            )
            .is_err());
    }

    #[test]
    fn test_collection_registration() {
        let manager = manager_with_index();
        manager.add_collection_to_index(7, "Person.name").unwrap();
        assert!(manager.index("Person.name").unwrap().collection_ids.contains(&7));
        manager.remove_collection_from_index(3, "Person.name").unwrap();
        assert!(!manager.index("Person.name").unwrap().collection_ids.contains(&3));

        manager.reject_collection(9);
        assert!(manager.add_collection_to_index(9, "Person.name").is_err());
        assert!(manager.add_collection_to_index(1, "missing").is_err());
    }

    #[test]
    fn test_rename_and_drop() {
        let manager = manager_with_index();
        manager.rename_class("Person", "Human").unwrap();
        assert!(manager.class_indexes("Person").is_empty());
        assert_eq!(manager.class_indexes("human").len(), 1);
        manager.drop_index("Person.name").unwrap();
        assert!(manager.is_empty());
        assert!(manager.drop_index("Person.name").is_err());
    }
}
