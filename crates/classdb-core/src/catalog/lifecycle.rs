//! Class creation, removal, renaming and attribute changes.

use super::class::ClassDescriptor;
use super::lazy::LazyClassRef;
use super::names::{check_class_name, normalize};
use super::state::CatalogState;
use crate::error::{Error, Result};
use crate::types::{ClassId, CollectionId, NOT_EXISTENT_COLLECTION_ID};
use tracing::{debug, info, warn};

/// How the collections of a new class are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClassCollections {
    /// As many as the configured minimum.
    Default,
    /// Exactly this many; zero makes the class abstract.
    Count(usize),
    /// Existing collections, which must not belong to anybody yet.
    Ids(Vec<CollectionId>),
    /// No collection at all.
    Abstract,
}

/// A change to one class attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassChange {
    Name(String),
    Description(Option<String>),
    StrictMode(bool),
    OverSize(f32),
    Abstract(bool),
    /// Set a custom attribute; `None` or `"null"` removes it.
    Custom(String, Option<String>),
    ClearCustom,
    CollectionSelection(String),
    AddCollection(CollectionId),
    RemoveCollection(CollectionId),
    /// Replace the super classes, by name.
    SuperClasses(Vec<String>),
    AddSuperClass(String),
    RemoveSuperClass(String),
}

impl CatalogState {
    pub(crate) fn create_class(
        &mut self,
        name: &str,
        collections: ClassCollections,
        supers: &[ClassId],
    ) -> Result<ClassId> {
        let name = check_class_name(name)?;
        if self.exists_class(&name) {
            return Err(Error::Schema(format!(
                "class '{}' already exists in current database",
                name
            )));
        }
        self.check_distinct(supers)?;
        self.check_parameters_conflict(supers)?;

        let ids = match collections {
            ClassCollections::Abstract | ClassCollections::Count(0) => {
                vec![NOT_EXISTENT_COLLECTION_ID]
            }
            ClassCollections::Default => {
                let count = self.config().minimum_collections;
                self.create_collections_for_class(&name, count)?
            }
            ClassCollections::Count(count) => self.create_collections_for_class(&name, count)?,
            ClassCollections::Ids(ids) => {
                self.check_collections_are_absent(&ids)?;
                if ids.is_empty() {
                    vec![NOT_EXISTENT_COLLECTION_ID]
                } else {
                    ids
                }
            }
        };

        let id = ClassId(self.slots.len());
        let descriptor = ClassDescriptor::new(id, &name, &ids);
        let owned: Vec<CollectionId> = descriptor.real_collection_ids().collect();
        self.slots.push(Some(LazyClassRef::created(descriptor)));
        self.by_name.insert(normalize(&name), id);
        for collection_id in owned {
            self.add_collection_for_class(collection_id, id)?;
        }
        self.mark_dirty(id);
        self.root_dirty = true;

        if !supers.is_empty() {
            self.set_super_classes(id, supers.to_vec())?;
        }
        info!(class = %name, collections = ?ids, "created class");
        Ok(id)
    }

    /// Remove a class that has no subclasses, its records, collections and
    /// indexes.
    pub(crate) fn drop_class(&mut self, id: ClassId) -> Result<()> {
        let class = self.get(id)?;
        let name = class.name.clone();
        if !class.sub_classes.is_empty() {
            return Err(Error::Schema(format!(
                "class '{}' cannot be dropped because it has sub classes [{}]. \
                 Remove the dependencies first",
                name,
                self.names_of(&class.sub_classes)?.join(", ")
            )));
        }
        let supers = class.super_classes.clone();
        let owned: Vec<CollectionId> = class.real_collection_ids().collect();

        for parent in supers {
            self.remove_super_class(id, parent)?;
        }

        let collections = self.env.collections.clone();
        for collection_id in owned {
            if collections.name_by_id(collection_id).is_some() {
                collections.truncate_collection(collection_id)?;
                collections.drop_collection(collection_id)?;
            }
            self.remove_collection_for_class(collection_id, id);
        }

        let indexes = self.env.indexes.clone();
        for index in indexes.class_indexes(&name) {
            indexes.drop_index(&index.name)?;
            debug!(class = %name, index = %index.name, "dropped class index");
        }

        self.by_name.remove(&normalize(&name));
        if let Some(record) = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .and_then(|slot| slot.persisted_id)
        {
            self.removed_records.push(record);
        }
        self.dirty.remove(&id);
        self.collection_to_class.retain(|_, owner| *owner != id);
        self.root_dirty = true;
        info!(class = %name, "dropped class");
        Ok(())
    }

    /// Rename a class. Renaming to the same name is a no-op; a change of
    /// case only, or a name already in use, is rejected.
    pub(crate) fn rename_class(&mut self, id: ClassId, new_name: &str) -> Result<()> {
        let new_name = check_class_name(new_name)?;
        let old_name = self.name_of(id)?;
        if old_name == new_name {
            return Ok(());
        }
        let old_key = normalize(&old_name);
        let new_key = normalize(&new_name);
        if old_key == new_key {
            return Err(Error::Schema(format!(
                "class '{}' cannot be renamed to '{}', names differ only by case",
                old_name, new_name
            )));
        }
        if self.by_name.contains_key(&new_key) {
            return Err(Error::Schema(format!(
                "class '{}' already exists in current database",
                new_name
            )));
        }

        self.by_name.remove(&old_key);
        self.by_name.insert(new_key, id);
        self.get_mut(id)?.name = new_name.clone();
        self.rename_own_collection(id, &old_key, &normalize(&new_name));
        self.env.indexes.rename_class(&old_name, &new_name)?;

        for other in self.class_ids() {
            let mut touched = false;
            for prop in self.get_mut(other)?.properties.values_mut() {
                if prop
                    .linked_class
                    .as_deref()
                    .map_or(false, |linked| linked.eq_ignore_ascii_case(&old_name))
                {
                    prop.linked_class = Some(new_name.clone());
                    touched = true;
                }
            }
            if touched {
                self.mark_dirty(other);
            }
        }

        // Neighbour documents store this class by name.
        let class = self.get(id)?;
        let neighbours: Vec<ClassId> = class
            .super_classes
            .iter()
            .chain(class.sub_classes.iter())
            .copied()
            .collect();
        for neighbour in neighbours {
            self.mark_dirty(neighbour);
        }
        self.mark_dirty(id);
        self.root_dirty = true;
        info!(from = %old_name, to = %new_name, "renamed class");
        Ok(())
    }

    fn rename_own_collection(&self, id: ClassId, old_name: &str, new_name: &str) {
        let collections = &self.env.collections;
        if collections.id_by_name(new_name).is_some() {
            return;
        }
        let Some(collection_id) = collections.id_by_name(old_name) else {
            return;
        };
        if !self
            .class(id)
            .map_or(false, |class| class.has_collection_id(collection_id))
        {
            return;
        }
        if let Err(e) = collections.rename_collection(collection_id, new_name) {
            warn!(
                collection_id,
                from = %old_name,
                to = %new_name,
                error = %e,
                "could not rename class collection"
            );
        }
    }

    pub(crate) fn set_abstract(&mut self, id: ClassId, is_abstract: bool) -> Result<()> {
        let class = self.get(id)?;
        if class.is_abstract == is_abstract {
            return Ok(());
        }
        let name = class.name.clone();

        if is_abstract {
            let collections = self.env.collections.clone();
            let mut records = 0;
            for collection_id in class.polymorphic_collection_ids.iter().copied() {
                if collections.name_by_id(collection_id).is_some() {
                    records += collections.count_records(collection_id)?;
                }
            }
            if records > 0 {
                return Err(Error::Schema(format!(
                    "cannot set the class '{}' as abstract because contains records",
                    name
                )));
            }

            let owned: Vec<CollectionId> = class.real_collection_ids().collect();
            let lower = name.to_lowercase();
            for collection_id in &owned {
                self.try_drop_collection(&lower, *collection_id)?;
            }
            self.get_mut(id)?.clear_collections();
            self.remove_polymorphic_ids(id, &owned)?;
            for collection_id in owned {
                self.remove_collection_for_class(collection_id, id);
            }
        } else {
            let collection_id = self
                .create_collections_for_class(&name, 1)?
                .first()
                .copied()
                .ok_or_else(|| {
                    Error::Collection(format!("no collection allocated for class '{}'", name))
                })?;
            self.check_collection_can_be_added(collection_id, Some(id))?;
            self.get_mut(id)?.insert_collection_id(collection_id);
            self.add_collection_for_class(collection_id, id)?;

            let mut ids = vec![collection_id];
            for sub in self.get(id)?.sub_classes.clone() {
                ids.extend_from_slice(&self.get(sub)?.polymorphic_collection_ids);
            }
            self.add_polymorphic_ids(id, &ids)?;
        }

        self.mark_dirty(id);
        info!(class = %name, is_abstract, "changed class abstractness");
        Ok(())
    }

    pub(crate) fn apply_class_change(&mut self, id: ClassId, change: ClassChange) -> Result<()> {
        match change {
            ClassChange::Name(name) => return self.rename_class(id, &name),
            ClassChange::Abstract(flag) => return self.set_abstract(id, flag),
            ClassChange::AddCollection(collection_id) => {
                return self.add_collection_id(id, collection_id)
            }
            ClassChange::RemoveCollection(collection_id) => {
                return self.remove_collection_id(id, collection_id)
            }
            ClassChange::SuperClasses(names) => {
                let supers = names
                    .iter()
                    .map(|n| self.require(n))
                    .collect::<Result<Vec<_>>>()?;
                return self.set_super_classes(id, supers);
            }
            ClassChange::AddSuperClass(name) => {
                let parent = self.require(&name)?;
                return self.add_super_class(id, parent);
            }
            ClassChange::RemoveSuperClass(name) => {
                let parent = self.require(&name)?;
                return self.remove_super_class(id, parent);
            }
            ClassChange::Description(description) => self.get_mut(id)?.set_description(description),
            ClassChange::StrictMode(strict) => self.get_mut(id)?.strict_mode = strict,
            ClassChange::OverSize(over_size) => self.get_mut(id)?.set_over_size(over_size)?,
            ClassChange::Custom(name, value) => {
                self.get_mut(id)?.set_custom(&name, value.as_deref())
            }
            ClassChange::ClearCustom => self.get_mut(id)?.custom_fields.clear(),
            ClassChange::CollectionSelection(strategy) => {
                self.get_mut(id)?.set_collection_selection(&strategy)?
            }
        }
        self.mark_dirty(id);
        Ok(())
    }
}
