//! Persisted schema documents.
//!
//! Field names follow the on-disk layout shared with other tools reading
//! the schema record, hence the camelCase renames.

use crate::types::{CollectionId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Schema format version written by this crate.
pub const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Legacy schema format version that is still readable.
pub const LEGACY_SCHEMA_VERSION: i32 = 5;

/// A document held by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "lowercase")]
pub enum Document {
    /// The catalog root record.
    Schema(RootDocument),
    /// One class definition.
    Class(ClassDocument),
}

impl Document {
    /// Short kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Schema(_) => "schema",
            Document::Class(_) => "class",
        }
    }
}

/// The catalog root record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i32>,
    #[serde(default)]
    pub classes_refs: BTreeMap<String, RecordId>,
    #[serde(default)]
    pub global_properties: Vec<GlobalPropertyDocument>,
    #[serde(default)]
    pub blob_clusters: BTreeSet<CollectionId>,
}

/// One entry of the global property table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPropertyDocument {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: i32,
}

/// One class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub default_collection_id: CollectionId,
    pub collection_ids: Vec<CollectionId>,
    #[serde(default = "default_collection_selection")]
    pub collection_selection: String,
    #[serde(default)]
    pub over_size: f32,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDocument>,
    /// First super class, kept for readers of the older single-parent layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    #[serde(default)]
    pub super_classes: Vec<String>,
    #[serde(default)]
    pub sub_classes: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// One property definition, embedded in its class document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<u32>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_class: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default = "default_collate")]
    pub collate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub(crate) fn default_collection_selection() -> String {
    "round-robin".to_string()
}

pub(crate) fn default_collate() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_document_field_names() {
        let doc = Document::Class(ClassDocument {
            name: "Person".into(),
            description: None,
            default_collection_id: 3,
            collection_ids: vec![3],
            collection_selection: default_collection_selection(),
            over_size: 0.0,
            strict_mode: true,
            is_abstract: false,
            properties: vec![],
            super_class: Some("Base".into()),
            super_classes: vec!["Base".into()],
            sub_classes: vec![],
            custom_fields: BTreeMap::new(),
        });
        let json: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["@type"], "class");
        assert_eq!(json["defaultCollectionId"], 3);
        assert_eq!(json["strictMode"], true);
        assert_eq!(json["abstract"], false);
        assert_eq!(json["superClass"], "Base");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_root_document_defaults() {
        let doc: Document = serde_json::from_str(r#"{"@type":"schema"}"#).unwrap();
        match doc {
            Document::Schema(root) => {
                assert_eq!(root.schema_version, None);
                assert!(root.classes_refs.is_empty());
                assert!(root.blob_clusters.is_empty());
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_property_document_defaults() {
        let prop: PropertyDocument =
            serde_json::from_str(r#"{"name":"age","type":1}"#).unwrap();
        assert_eq!(prop.collate, "default");
        assert_eq!(prop.global_id, None);
        assert!(!prop.mandatory);
    }
}
