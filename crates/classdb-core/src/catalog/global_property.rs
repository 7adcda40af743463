//! Interned `(name, type)` pairs shared by every property.

use crate::error::{Error, Result};
use crate::storage::GlobalPropertyDocument;
use crate::types::PropertyType;
use std::collections::HashMap;

/// How far past the number of stored entries an id may point.
const MAX_ID_GAP: usize = 1024;

/// One interned property name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalProperty {
    /// Stable id.
    pub id: u32,
    /// Property name, case preserved.
    pub name: String,
    /// Property type.
    pub property_type: PropertyType,
}

/// Dense, append-only table of global properties.
#[derive(Debug, Clone, Default)]
pub struct GlobalPropertyTable {
    entries: Vec<Option<GlobalProperty>>,
    by_key: HashMap<(String, PropertyType), u32>,
}

impl GlobalPropertyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the `(name, type)` entry, appending it if it is new.
    pub fn find_or_create(&mut self, name: &str, property_type: PropertyType) -> u32 {
        let key = (name.to_string(), property_type);
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = self.entries.len() as u32;
        self.entries.push(Some(GlobalProperty {
            id,
            name: name.to_string(),
            property_type,
        }));
        self.by_key.insert(key, id);
        id
    }

    /// Entry by id. Ids outside the table or in gaps yield `None`.
    pub fn get(&self, id: u32) -> Option<&GlobalProperty> {
        self.entries.get(id as usize).and_then(Option::as_ref)
    }

    /// Number of slots, gaps included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the present entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &GlobalProperty> {
        self.entries.iter().flatten()
    }

    fn insert_at(&mut self, id: u32, name: String, property_type: PropertyType) {
        let index = id as usize;
        if self.entries.len() <= index {
            self.entries.resize(index + 1, None);
        }
        self.by_key.insert((name.clone(), property_type), id);
        self.entries[index] = Some(GlobalProperty {
            id,
            name,
            property_type,
        });
    }

    /// Rebuild a table from its persisted entries, each at its own id.
    pub(crate) fn from_documents(documents: &[GlobalPropertyDocument]) -> Result<Self> {
        let mut table = Self::new();
        let limit = documents.len() + MAX_ID_GAP;
        for doc in documents {
            if doc.id as usize >= limit {
                return Err(Error::Configuration(format!(
                    "global property '{}' has id {} but only {} entries are stored",
                    doc.name,
                    doc.id,
                    documents.len()
                )));
            }
            let property_type = PropertyType::from_id(doc.type_id).ok_or_else(|| {
                Error::Deserialization(format!(
                    "global property '{}' has unknown type id {}",
                    doc.name, doc.type_id
                ))
            })?;
            table.insert_at(doc.id, doc.name.clone(), property_type);
        }
        Ok(table)
    }

    pub(crate) fn to_documents(&self) -> Vec<GlobalPropertyDocument> {
        self.iter()
            .map(|p| GlobalPropertyDocument {
                id: p.id,
                name: p.name.clone(),
                type_id: p.property_type.id(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_or_create_is_stable() {
        let mut table = GlobalPropertyTable::new();
        let age = table.find_or_create("age", PropertyType::Integer);
        let name = table.find_or_create("name", PropertyType::String);
        let age_long = table.find_or_create("age", PropertyType::Long);
        assert_eq!(age, 0);
        assert_eq!(name, 1);
        assert_eq!(age_long, 2);
        assert_eq!(table.find_or_create("age", PropertyType::Integer), age);
        assert_eq!(table.get(age_long).unwrap().property_type, PropertyType::Long);
    }

    #[test]
    fn test_out_of_range_lookup() {
        let table = GlobalPropertyTable::new();
        assert!(table.get(0).is_none());
        assert!(table.get(u32::MAX).is_none());
    }

    #[test]
    fn test_load_with_gaps() {
        let docs = vec![
            GlobalPropertyDocument {
                id: 0,
                name: "a".into(),
                type_id: PropertyType::String.id(),
            },
            GlobalPropertyDocument {
                id: 3,
                name: "b".into(),
                type_id: PropertyType::Long.id(),
            },
        ];
        let mut table = GlobalPropertyTable::from_documents(&docs).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.get(1).is_none());
        assert_eq!(table.get(3).unwrap().name, "b");
        assert_eq!(table.find_or_create("b", PropertyType::Long), 3);
        assert_eq!(table.find_or_create("c", PropertyType::Long), 4);
        assert_eq!(table.to_documents().len(), 3);
    }

    #[test]
    fn test_load_rejects_runaway_id() {
        let docs = vec![GlobalPropertyDocument {
            id: u32::MAX,
            name: "a".into(),
            type_id: PropertyType::String.id(),
        }];
        let err = GlobalPropertyTable::from_documents(&docs).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let docs = vec![GlobalPropertyDocument {
            id: 1000,
            name: "a".into(),
            type_id: PropertyType::String.id(),
        }];
        assert_eq!(GlobalPropertyTable::from_documents(&docs).unwrap().len(), 1001);
    }

    #[test]
    fn test_load_rejects_unknown_type() {
        let docs = vec![GlobalPropertyDocument {
            id: 0,
            name: "a".into(),
            type_id: 99,
        }];
        assert!(GlobalPropertyTable::from_documents(&docs).is_err());
    }
}
