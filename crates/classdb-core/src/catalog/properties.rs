//! Property declarations and class indexes.

use super::names::check_property_name;
use super::property::{check_collate, PropertyDescriptor};
use super::state::CatalogState;
use crate::error::{Error, Result};
use crate::index::{IndexDefinition, IndexInfo};
use crate::storage::StoredValue;
use crate::types::{ClassId, CollectionId, PropertyType};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A property to declare on a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProperty {
    pub name: String,
    pub property_type: PropertyType,
    pub linked_type: Option<PropertyType>,
    /// Name of the linked or embedded class.
    pub linked_class: Option<String>,
    /// Skip the scan of existing records.
    pub skip_data_check: bool,
}

impl NewProperty {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            linked_type: None,
            linked_class: None,
            skip_data_check: false,
        }
    }

    pub fn with_linked_type(mut self, linked_type: PropertyType) -> Self {
        self.linked_type = Some(linked_type);
        self
    }

    pub fn with_linked_class(mut self, class: impl Into<String>) -> Self {
        self.linked_class = Some(class.into());
        self
    }

    /// Declare the property without checking records already stored.
    pub fn skip_data_check(mut self) -> Self {
        self.skip_data_check = true;
        self
    }
}

/// A change to one property attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    Name(String),
    /// New type; must be able to read values of the current type.
    Type(PropertyType),
    LinkedType(Option<PropertyType>),
    LinkedClass(Option<String>),
    Mandatory(bool),
    NotNull(bool),
    Readonly(bool),
    Min(Option<String>),
    Max(Option<String>),
    DefaultValue(Option<String>),
    Regexp(Option<String>),
    /// Changing the collation rebuilds the class indexes on the property.
    Collate(String),
    Description(Option<String>),
    Custom(String, Option<String>),
    ClearCustom,
}

fn check_linked_type_support(property_type: PropertyType) -> Result<()> {
    if property_type.supports_linked_type() {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "linked type is only supported by EMBEDDEDLIST, EMBEDDEDSET and EMBEDDEDMAP, not by {}",
            property_type
        )))
    }
}

fn check_linked_class_support(property_type: PropertyType) -> Result<()> {
    if property_type.supports_linked_class() {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "linked class is only supported by link and embedded types, not by {}",
            property_type
        )))
    }
}

impl CatalogState {
    pub(crate) fn add_property(&mut self, id: ClassId, new: NewProperty) -> Result<()> {
        let name = check_property_name(&new.name)?;
        let ty = new.property_type;
        if new.linked_type.is_some() {
            check_linked_type_support(ty)?;
        }
        let linked_class = match &new.linked_class {
            Some(class_name) => {
                check_linked_class_support(ty)?;
                Some(self.name_of(self.require(class_name)?)?)
            }
            None => None,
        };

        let key = name.to_lowercase();
        let class = self.get(id)?;
        if class.properties.contains_key(&key) {
            return Err(Error::Schema(format!(
                "class '{}' already has property '{}'",
                class.name, name
            )));
        }

        if !new.skip_data_check {
            self.check_persistent_property_type(id, &name, ty, linked_class.as_deref())?;
            if let Some(linked_type) = new.linked_type {
                self.check_persistent_linked_type(id, &name, linked_type)?;
            }
        }

        let global_id = self.intern_global(&name, ty);
        let mut prop = PropertyDescriptor::new(global_id, &name, ty);
        prop.linked_type = new.linked_type;
        prop.linked_class = linked_class;

        let class = self.get_mut(id)?;
        class.properties.insert(key, prop);
        info!(class = %class.name, property = %name, property_type = %ty, "added property");
        self.mark_dirty(id);
        Ok(())
    }

    pub(crate) fn drop_property(&mut self, id: ClassId, name: &str) -> Result<()> {
        let class = self.get_mut(id)?;
        if class.properties.remove(&name.trim().to_lowercase()).is_none() {
            return Err(Error::Schema(format!(
                "property '{}' not found in class '{}'",
                name.trim(),
                class.name
            )));
        }
        info!(class = %class.name, property = %name.trim(), "dropped property");
        self.mark_dirty(id);
        Ok(())
    }

    pub(crate) fn alter_property(
        &mut self,
        id: ClassId,
        name: &str,
        change: PropertyChange,
    ) -> Result<()> {
        let key = name.trim().to_lowercase();
        let current = self.property_mut(id, &key)?.clone();

        match change {
            PropertyChange::Name(new_name) => {
                let new_name = check_property_name(&new_name)?;
                if new_name == current.name {
                    return Ok(());
                }
                let new_key = new_name.to_lowercase();
                let class = self.get(id)?;
                if new_key != key && class.properties.contains_key(&new_key) {
                    return Err(Error::Schema(format!(
                        "class '{}' already has property '{}'",
                        class.name, new_name
                    )));
                }
                let global_id = self.intern_global(&new_name, current.property_type);
                let class = self.get_mut(id)?;
                if let Some(mut prop) = class.properties.remove(&key) {
                    prop.name = new_name;
                    prop.global_id = global_id;
                    class.properties.insert(new_key, prop);
                }
            }
            PropertyChange::Type(new_type) => {
                if new_type == current.property_type {
                    return Ok(());
                }
                if !new_type.is_castable_from(current.property_type) {
                    return Err(Error::Schema(format!(
                        "cannot change property type from {} to {}",
                        current.property_type, new_type
                    )));
                }
                if current.linked_type.is_some() {
                    check_linked_type_support(new_type)?;
                }
                if current.linked_class.is_some() {
                    check_linked_class_support(new_type)?;
                }
                let global_id = self.intern_global(&current.name, new_type);
                let prop = self.property_mut(id, &key)?;
                prop.property_type = new_type;
                prop.global_id = global_id;
            }
            PropertyChange::LinkedType(linked_type) => {
                if let Some(linked_type) = linked_type {
                    check_linked_type_support(current.property_type)?;
                    self.check_persistent_linked_type(id, &current.name, linked_type)?;
                }
                self.property_mut(id, &key)?.linked_type = linked_type;
            }
            PropertyChange::LinkedClass(class_name) => {
                let linked_class = match class_name {
                    Some(class_name) => {
                        check_linked_class_support(current.property_type)?;
                        let linked = self.name_of(self.require(&class_name)?)?;
                        self.check_persistent_property_type(
                            id,
                            &current.name,
                            current.property_type,
                            Some(&linked),
                        )?;
                        Some(linked)
                    }
                    None => None,
                };
                self.property_mut(id, &key)?.linked_class = linked_class;
            }
            PropertyChange::Mandatory(flag) => self.property_mut(id, &key)?.mandatory = flag,
            PropertyChange::NotNull(flag) => self.property_mut(id, &key)?.not_null = flag,
            PropertyChange::Readonly(flag) => self.property_mut(id, &key)?.readonly = flag,
            PropertyChange::Min(min) => self.property_mut(id, &key)?.set_min(min)?,
            PropertyChange::Max(max) => self.property_mut(id, &key)?.set_max(max)?,
            PropertyChange::DefaultValue(value) => {
                self.property_mut(id, &key)?.set_default_value(value)?
            }
            PropertyChange::Regexp(pattern) => self.property_mut(id, &key)?.set_regexp(pattern)?,
            PropertyChange::Collate(collate) => {
                let collate = check_collate(&collate)?;
                if collate != current.collate {
                    self.property_mut(id, &key)?.collate = collate.clone();
                    self.recreate_indexes_on(id, &current.name, &collate)?;
                }
            }
            PropertyChange::Description(description) => {
                self.property_mut(id, &key)?.set_description(description)
            }
            PropertyChange::Custom(name, value) => {
                self.property_mut(id, &key)?.set_custom(&name, value.as_deref())
            }
            PropertyChange::ClearCustom => self.property_mut(id, &key)?.custom_fields.clear(),
        }

        self.mark_dirty(id);
        Ok(())
    }

    /// Define an index on a class. Every field must be a property of the
    /// class or one of its super classes; the index covers the class's
    /// polymorphic collections.
    pub(crate) fn create_index(
        &self,
        id: ClassId,
        name: &str,
        index_type: &str,
        fields: &[&str],
        metadata: &BTreeMap<String, String>,
    ) -> Result<IndexInfo> {
        let class = self.get(id)?;
        if fields.is_empty() {
            return Err(Error::Index(format!(
                "index '{}' on class '{}' needs at least one field",
                name, class.name
            )));
        }
        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields {
            let prop = self.find_property(id, field).ok_or_else(|| {
                Error::Index(format!(
                    "index '{}' refers to property '{}' that does not exist in class '{}'",
                    name, field, class.name
                ))
            })?;
            resolved.push(prop);
        }

        let collate = match resolved.as_slice() {
            [single] => single.collate.clone(),
            _ => "default".to_string(),
        };
        let definition = IndexDefinition::new(
            class.name.clone(),
            resolved.iter().map(|p| p.name.clone()).collect(),
        )
        .with_collate(collate);
        let collection_ids: Vec<CollectionId> = class.polymorphic_collection_ids.clone();

        let info = self
            .env
            .indexes
            .create_index(name, index_type, definition, &collection_ids, metadata)?;
        info!(class = %class.name, index = %name, index_type, "created index");
        Ok(info)
    }

    /// Drop and recreate the class indexes that cover `field` so that they
    /// pick up a new collation.
    fn recreate_indexes_on(&self, id: ClassId, field: &str, collate: &str) -> Result<()> {
        let class_name = self.name_of(id)?;
        let indexes = &self.env.indexes;
        for index in indexes.class_indexes(&class_name) {
            if !index.definition.covers(field) {
                continue;
            }
            let mut definition = index.definition.clone();
            if definition.fields.len() == 1 {
                definition.collate = collate.to_string();
            }
            let collection_ids: Vec<CollectionId> = index.collection_ids.iter().copied().collect();
            indexes.drop_index(&index.name)?;
            indexes.create_index(
                &index.name,
                &index.index_type,
                definition,
                &collection_ids,
                &index.metadata,
            )?;
            debug!(class = %class_name, index = %index.name, collate, "recreated index");
        }
        Ok(())
    }

    /// Fail if stored values of the property, in the class's own
    /// collections, cannot be read as `property_type` or link outside
    /// `linked_class`.
    fn check_persistent_property_type(
        &self,
        id: ClassId,
        property: &str,
        property_type: PropertyType,
        linked_class: Option<&str>,
    ) -> Result<()> {
        let linked_id = match linked_class {
            Some(name) => Some(self.require(name)?),
            None => None,
        };
        for value in self.stored_values(id, property)? {
            if !property_type.is_castable_from(value.value_type) {
                return Err(self.incompatible(id, property, format!("the type {}", property_type)));
            }
            if let (Some(linked_id), Some(target)) = (linked_id, &value.target_class) {
                let compatible = self
                    .class_id(target)
                    .map_or(false, |target_id| self.is_sub_class_of(target_id, linked_id));
                if !compatible {
                    return Err(self.incompatible(
                        id,
                        property,
                        format!("the linked class {}", self.name_of(linked_id)?),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_persistent_linked_type(
        &self,
        id: ClassId,
        property: &str,
        linked_type: PropertyType,
    ) -> Result<()> {
        for value in self.stored_values(id, property)? {
            if value
                .element_types
                .iter()
                .any(|element| !linked_type.is_castable_from(*element))
            {
                return Err(self.incompatible(id, property, format!("the linked type {}", linked_type)));
            }
        }
        Ok(())
    }

    fn stored_values(
        &self,
        id: ClassId,
        property: &str,
    ) -> Result<Vec<StoredValue>> {
        let collections = &self.env.collections;
        let mut values = Vec::new();
        for collection_id in self.get(id)?.real_collection_ids() {
            if collections.name_by_id(collection_id).is_some() {
                values.extend(collections.scan_property(collection_id, property)?);
            }
        }
        Ok(values)
    }

    fn incompatible(&self, id: ClassId, property: &str, detail: String) -> Error {
        Error::DataIncompatibility {
            class: self.name_of(id).unwrap_or_default(),
            property: property.to_string(),
            detail,
        }
    }

    fn intern_global(&mut self, name: &str, property_type: PropertyType) -> u32 {
        let before = self.global_properties.len();
        let global_id = self.global_properties.find_or_create(name, property_type);
        if self.global_properties.len() != before {
            self.root_dirty = true;
        }
        global_id
    }

    fn property_mut(&mut self, id: ClassId, key: &str) -> Result<&mut PropertyDescriptor> {
        let class = self.get_mut(id)?;
        let class_name = class.name.clone();
        class.properties.get_mut(key).ok_or_else(|| {
            Error::Schema(format!(
                "property '{}' not found in class '{}'",
                key, class_name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lifecycle::ClassCollections;
    use crate::catalog::state::test_support::Fixture;

    fn person(state: &mut CatalogState) -> ClassId {
        state
            .create_class("Person", ClassCollections::Default, &[])
            .unwrap()
    }

    #[test]
    fn test_add_property_validation() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);

        assert!(state
            .add_property(id, NewProperty::new(" ", PropertyType::String))
            .is_err());
        assert!(state
            .add_property(id, NewProperty::new("first name", PropertyType::String))
            .is_err());
        assert!(state
            .add_property(
                id,
                NewProperty::new("tags", PropertyType::String).with_linked_type(PropertyType::String)
            )
            .is_err());
        assert!(state
            .add_property(
                id,
                NewProperty::new("friend", PropertyType::Integer).with_linked_class("Person")
            )
            .is_err());
        assert!(state
            .add_property(
                id,
                NewProperty::new("friend", PropertyType::Link).with_linked_class("Nobody")
            )
            .is_err());

        state
            .add_property(id, NewProperty::new("name", PropertyType::String))
            .unwrap();
        let err = state
            .add_property(id, NewProperty::new("NAME", PropertyType::Integer))
            .unwrap_err();
        assert!(err.to_string().contains("already has property"));

        assert!(state
            .global_properties()
            .iter()
            .any(|g| g.name == "name" && g.property_type == PropertyType::String));
    }

    #[test]
    fn test_existing_records_are_checked() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        let collection = state.get(id).unwrap().default_collection_id();
        fixture
            .collections
            .insert_record(collection, [("age", StoredValue::of(PropertyType::String))])
            .unwrap();
        fixture
            .collections
            .insert_record(collection, [("rank", StoredValue::of(PropertyType::Byte))])
            .unwrap();

        let err = state
            .add_property(id, NewProperty::new("age", PropertyType::Integer))
            .unwrap_err();
        match err {
            Error::DataIncompatibility { class, property, detail } => {
                assert_eq!(class, "Person");
                assert_eq!(property, "age");
                assert_eq!(detail, "the type INTEGER");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(state.find_property(id, "age").is_none());

        state
            .add_property(id, NewProperty::new("age", PropertyType::Integer).skip_data_check())
            .unwrap();
        state
            .add_property(id, NewProperty::new("rank", PropertyType::Integer))
            .unwrap();
    }

    #[test]
    fn test_link_targets_are_checked() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        state
            .create_class("Address", ClassCollections::Default, &[])
            .unwrap();
        state.create_class("Car", ClassCollections::Default, &[]).unwrap();
        let collection = state.get(id).unwrap().default_collection_id();
        fixture
            .collections
            .insert_record(collection, [("home", StoredValue::link_to("Car"))])
            .unwrap();

        let err = state
            .add_property(
                id,
                NewProperty::new("home", PropertyType::Link).with_linked_class("address"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("the linked class Address"));

        state
            .add_property(
                id,
                NewProperty::new("home", PropertyType::Link).with_linked_class("car"),
            )
            .unwrap();
        let prop = state.find_property(id, "home").unwrap();
        assert_eq!(prop.linked_class(), Some("Car"));
    }

    #[test]
    fn test_type_change() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        state
            .add_property(id, NewProperty::new("age", PropertyType::Integer))
            .unwrap();
        state
            .add_property(id, NewProperty::new("car", PropertyType::Link))
            .unwrap();

        state
            .alter_property(id, "age", PropertyChange::Type(PropertyType::Long))
            .unwrap();
        let age = state.find_property(id, "age").unwrap();
        assert_eq!(age.property_type(), PropertyType::Long);
        let global = state.global_properties().get(age.global_id()).unwrap();
        assert_eq!(global.property_type, PropertyType::Long);

        let err = state
            .alter_property(id, "car", PropertyChange::Type(PropertyType::String))
            .unwrap_err();
        assert!(err.to_string().contains("from LINK to STRING"));
        assert_eq!(
            state.find_property(id, "car").unwrap().property_type(),
            PropertyType::Link
        );
    }

    #[test]
    fn test_rename_property() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        state
            .add_property(id, NewProperty::new("name", PropertyType::String))
            .unwrap();
        state
            .add_property(id, NewProperty::new("nick", PropertyType::String))
            .unwrap();

        assert!(state
            .alter_property(id, "nick", PropertyChange::Name("Name".into()))
            .is_err());
        state
            .alter_property(id, "nick", PropertyChange::Name("alias".into()))
            .unwrap();
        assert!(state.find_property(id, "nick").is_none());
        assert_eq!(state.find_property(id, "ALIAS").unwrap().name(), "alias");
        assert!(state
            .alter_property(id, "missing", PropertyChange::Mandatory(true))
            .is_err());
    }

    #[test]
    fn test_collate_change_rebuilds_index() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        state
            .add_property(id, NewProperty::new("email", PropertyType::String))
            .unwrap();
        state
            .create_index(id, "Person.email", "UNIQUE", &["email"], &BTreeMap::new())
            .unwrap();
        assert_eq!(
            fixture.indexes.index("Person.email").unwrap().definition.collate,
            "default"
        );

        state
            .alter_property(id, "email", PropertyChange::Collate("CI".into()))
            .unwrap();
        let index = fixture.indexes.index("Person.email").unwrap();
        assert_eq!(index.definition.collate, "ci");
        assert_eq!(index.index_type, "UNIQUE");
        assert!(state
            .alter_property(id, "email", PropertyChange::Collate("klingon".into()))
            .is_err());
    }

    #[test]
    fn test_create_index() {
        let fixture = Fixture::new();
        let mut state = fixture.state();
        let id = person(&mut state);
        state
            .add_property(id, NewProperty::new("name", PropertyType::String))
            .unwrap();
        let student = state
            .create_class("Student", ClassCollections::Default, &[id])
            .unwrap();

        let err = state
            .create_index(id, "Person.age", "NOTUNIQUE", &["age"], &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert!(state
            .create_index(id, "Person.none", "NOTUNIQUE", &[], &BTreeMap::new())
            .is_err());

        let info = state
            .create_index(id, "Person.name", "NOTUNIQUE", &["name"], &BTreeMap::new())
            .unwrap();
        let polymorphic: Vec<CollectionId> =
            state.get(id).unwrap().polymorphic_collection_ids().to_vec();
        assert_eq!(info.collection_ids.iter().copied().collect::<Vec<_>>(), polymorphic);
        assert!(info
            .collection_ids
            .contains(&state.get(student).unwrap().default_collection_id()));

        // inherited fields can be indexed on the subclass
        state
            .create_index(student, "Student.name", "NOTUNIQUE", &["name"], &BTreeMap::new())
            .unwrap();
    }
}
