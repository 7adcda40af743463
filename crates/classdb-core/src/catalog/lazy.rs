//! Deferred class handles used while the catalog is deserialized.
//!
//! Class documents list super and subclasses by name, in no particular
//! order. Loading happens in two passes: every class is first loaded
//! shallow (scalars and properties), then fully (inheritance edges wired).
//! By the time any edge is resolved, every class has a placeholder.

use super::class::ClassDescriptor;
use super::global_property::GlobalPropertyTable;
use super::property::PropertyDescriptor;
use crate::error::{Error, Result};
use crate::storage::document::{ClassDocument, PropertyDocument};
use crate::storage::{Document, DocumentStore};
use crate::types::{ClassId, PropertyType, RecordId};

/// Loading progress of a class slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Only the persisted id is known.
    Unloaded,
    /// Scalars and properties loaded, inheritance not wired.
    LoadedShallow,
    /// Fully resolved.
    LoadedFull,
}

/// Super and subclass names waiting to be resolved.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingLinks {
    pub super_classes: Vec<String>,
    pub sub_classes: Vec<String>,
}

/// Arena slot for one class.
#[derive(Debug, Clone)]
pub struct LazyClassRef {
    pub(crate) persisted_id: Option<RecordId>,
    state: LoadState,
    descriptor: Option<ClassDescriptor>,
    pending: Option<PendingLinks>,
}

impl LazyClassRef {
    /// Slot for a persisted class that has not been read yet.
    pub(crate) fn unloaded(persisted_id: RecordId) -> Self {
        Self {
            persisted_id: Some(persisted_id),
            state: LoadState::Unloaded,
            descriptor: None,
            pending: None,
        }
    }

    /// Slot for a class created in memory.
    pub(crate) fn created(descriptor: ClassDescriptor) -> Self {
        Self {
            persisted_id: None,
            state: LoadState::LoadedFull,
            descriptor: Some(descriptor),
            pending: None,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn persisted_id(&self) -> Option<RecordId> {
        self.persisted_id
    }

    pub(crate) fn descriptor(&self) -> Option<&ClassDescriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn descriptor_mut(&mut self) -> Option<&mut ClassDescriptor> {
        self.descriptor.as_mut()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.state == LoadState::LoadedFull
    }

    /// Read the class document and populate everything but inheritance.
    pub(crate) fn load_shallow(
        &mut self,
        id: ClassId,
        documents: &dyn DocumentStore,
        globals: &mut GlobalPropertyTable,
    ) -> Result<()> {
        if self.state != LoadState::Unloaded {
            return Ok(());
        }
        let record = self
            .persisted_id
            .ok_or_else(|| Error::NotFound(format!("class slot {} has no record", id.0)))?;
        let doc = match documents.load(record)? {
            Document::Class(doc) => doc,
            other => {
                return Err(Error::Deserialization(format!(
                    "record {} holds a {} document, expected a class",
                    record,
                    other.kind()
                )))
            }
        };

        let mut super_classes = doc.super_classes.clone();
        if let Some(legacy) = &doc.super_class {
            if !super_classes.iter().any(|s| s.eq_ignore_ascii_case(legacy)) {
                super_classes.insert(0, legacy.clone());
            }
        }

        self.descriptor = Some(descriptor_from_document(id, &doc, globals)?);
        self.pending = Some(PendingLinks {
            super_classes,
            sub_classes: doc.sub_classes,
        });
        self.state = LoadState::LoadedShallow;
        Ok(())
    }

    /// Take the unresolved names; only meaningful after a shallow load.
    pub(crate) fn take_pending(&mut self) -> PendingLinks {
        self.pending.take().unwrap_or_default()
    }

    pub(crate) fn mark_full(&mut self) {
        self.state = LoadState::LoadedFull;
    }
}

fn decode_type(type_id: i32, what: &str) -> Result<PropertyType> {
    PropertyType::from_id(type_id)
        .ok_or_else(|| Error::Deserialization(format!("{} has unknown type id {}", what, type_id)))
}

fn property_from_document(
    doc: &PropertyDocument,
    class_name: &str,
    globals: &mut GlobalPropertyTable,
) -> Result<PropertyDescriptor> {
    let what = format!("property '{}.{}'", class_name, doc.name);
    let property_type = decode_type(doc.type_id, &what)?;

    // A stale or missing global id falls back to interning by name and type.
    let global_id = match doc.global_id.and_then(|gid| globals.get(gid)) {
        Some(global) if global.name == doc.name && global.property_type == property_type => {
            global.id
        }
        _ => globals.find_or_create(&doc.name, property_type),
    };

    let mut prop = PropertyDescriptor::new(global_id, &doc.name, property_type);
    prop.linked_type = doc
        .linked_type
        .map(|id| decode_type(id, &what))
        .transpose()?;
    prop.linked_class = doc.linked_class.clone();
    prop.mandatory = doc.mandatory;
    prop.not_null = doc.not_null;
    prop.readonly = doc.readonly;
    prop.min = doc.min.clone();
    prop.max = doc.max.clone();
    prop.default_value = doc.default_value.clone();
    prop.regexp = doc.regexp.clone();
    prop.collate = doc.collate.clone();
    prop.description = doc.description.clone();
    prop.custom_fields = doc.custom_fields.clone();
    Ok(prop)
}

fn descriptor_from_document(
    id: ClassId,
    doc: &ClassDocument,
    globals: &mut GlobalPropertyTable,
) -> Result<ClassDescriptor> {
    // Default collection first so it stays the default.
    let mut ids = vec![doc.default_collection_id];
    ids.extend(doc.collection_ids.iter().copied());
    // Abstractness follows from the ids; the stored flag is for other readers.
    let mut class = ClassDescriptor::new(id, &doc.name, &ids);
    class.description = doc.description.clone();
    class.strict_mode = doc.strict_mode;
    class.over_size = doc.over_size;
    class.collection_selection = doc.collection_selection.clone();
    class.custom_fields = doc.custom_fields.clone();
    for prop_doc in &doc.properties {
        let prop = property_from_document(prop_doc, &doc.name, globals)?;
        class.properties.insert(prop.name.to_lowercase(), prop);
    }
    Ok(class)
}
