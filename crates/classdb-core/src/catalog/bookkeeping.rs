//! Collection ownership and polymorphic id propagation.

use super::class::{insert_sorted, remove_sorted};
use super::state::CatalogState;
use crate::error::{Error, Result};
use crate::types::{ClassId, CollectionId, NOT_EXISTENT_COLLECTION_ID};
use tracing::{debug, warn};

impl CatalogState {
    /// Allocate the collections of a new class.
    ///
    /// The first collection is named after the class, reusing an existing
    /// collection of that name if no class owns it. Further collections are
    /// named `<class>_<n>`. Internal classes get exactly one.
    pub(crate) fn create_collections_for_class(
        &mut self,
        class_name: &str,
        count: usize,
    ) -> Result<Vec<CollectionId>> {
        let lower = class_name.to_lowercase();
        let count = if self.config().is_internal_class(&lower) {
            1
        } else {
            count.max(1)
        };
        let collections = self.env.collections.clone();

        let mut ids = Vec::with_capacity(count);
        let first = match collections.id_by_name(&lower) {
            Some(existing) if !self.is_collection_taken(existing) => existing,
            Some(_) => collections.add_collection(&self.next_available_collection_name(&lower))?,
            None => collections.add_collection(&lower)?,
        };
        ids.push(first);
        for _ in 1..count {
            ids.push(collections.add_collection(&self.next_available_collection_name(&lower))?);
        }
        debug!(class = %class_name, collections = ?ids, "allocated collections");
        Ok(ids)
    }

    /// First `<name>_<n>` (n >= 1) that no collection uses.
    pub(crate) fn next_available_collection_name(&self, lower_name: &str) -> String {
        (1..)
            .map(|i| format!("{}_{}", lower_name, i))
            .find(|candidate| self.env.collections.id_by_name(candidate).is_none())
            .unwrap_or_else(|| lower_name.to_string())
    }

    fn is_collection_taken(&self, collection_id: CollectionId) -> bool {
        self.collection_to_class.contains_key(&collection_id)
            || self.blob_collections.contains(&collection_id)
    }

    /// Fail if any of the collections already belongs to a class or to blobs.
    pub(crate) fn check_collections_are_absent(&self, ids: &[CollectionId]) -> Result<()> {
        for id in ids {
            self.check_collection_can_be_added(*id, None)?;
        }
        Ok(())
    }

    /// Fail if the collection is reserved for blobs or owned by a class
    /// other than `owner`.
    pub(crate) fn check_collection_can_be_added(
        &self,
        collection_id: CollectionId,
        owner: Option<ClassId>,
    ) -> Result<()> {
        if collection_id == NOT_EXISTENT_COLLECTION_ID {
            return Ok(());
        }
        if self.blob_collections.contains(&collection_id) {
            return Err(Error::Schema(format!(
                "collection with id {} already belongs to blobs",
                collection_id
            )));
        }
        if let Some(current) = self.collection_to_class.get(&collection_id) {
            if Some(*current) != owner {
                return Err(Error::Schema(format!(
                    "collection with id {} already belongs to the class '{}'",
                    collection_id,
                    self.name_of(*current)?
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn add_collection_for_class(
        &mut self,
        collection_id: CollectionId,
        owner: ClassId,
    ) -> Result<()> {
        if collection_id == NOT_EXISTENT_COLLECTION_ID {
            return Ok(());
        }
        self.check_collection_can_be_added(collection_id, Some(owner))?;
        self.collection_to_class.insert(collection_id, owner);
        Ok(())
    }

    /// Forget the owner of a collection, but only if `owner` owns it.
    pub(crate) fn remove_collection_for_class(&mut self, collection_id: CollectionId, owner: ClassId) {
        if self.collection_to_class.get(&collection_id) == Some(&owner) {
            self.collection_to_class.remove(&collection_id);
        }
    }

    /// Classes whose polymorphic set contains the collection.
    pub fn classes_relying_on_collection(&self, collection_id: CollectionId) -> Vec<ClassId> {
        self.class_ids()
            .into_iter()
            .filter(|id| {
                self.class(*id)
                    .map_or(false, |c| c.has_polymorphic_collection_id(collection_id))
            })
            .collect()
    }

    /// Attach an existing collection to a concrete class.
    pub(crate) fn add_collection_id(&mut self, class: ClassId, collection_id: CollectionId) -> Result<()> {
        let descriptor = self.get(class)?;
        if descriptor.is_abstract {
            return Err(Error::Schema(format!(
                "impossible to associate a collection to the abstract class '{}'",
                descriptor.name
            )));
        }
        if collection_id == NOT_EXISTENT_COLLECTION_ID || descriptor.has_collection_id(collection_id) {
            return Ok(());
        }
        self.check_collection_can_be_added(collection_id, Some(class))?;

        self.get_mut(class)?.insert_collection_id(collection_id);
        self.add_polymorphic_ids(class, &[collection_id])?;
        self.add_collection_for_class(collection_id, class)?;
        self.mark_dirty(class);
        Ok(())
    }

    /// Detach a collection from a class. The last collection cannot go.
    pub(crate) fn remove_collection_id(&mut self, class: ClassId, collection_id: CollectionId) -> Result<()> {
        let descriptor = self.get(class)?;
        if !descriptor.has_collection_id(collection_id) {
            return Ok(());
        }
        if descriptor.real_collection_ids().count() == 1 {
            return Err(Error::Schema(format!(
                "impossible to remove the last collection of class '{}', drop the class instead",
                descriptor.name
            )));
        }

        self.get_mut(class)?.remove_collection_id(collection_id);
        self.remove_polymorphic_ids(class, &[collection_id])?;
        self.remove_collection_for_class(collection_id, class);
        self.mark_dirty(class);
        Ok(())
    }

    /// Reserve a collection for blobs.
    pub(crate) fn add_blob_collection(&mut self, collection_id: CollectionId) -> Result<()> {
        if let Some(owner) = self.collection_to_class.get(&collection_id) {
            return Err(Error::Schema(format!(
                "collection with id {} already belongs to the class '{}'",
                collection_id,
                self.name_of(*owner)?
            )));
        }
        if self.blob_collections.insert(collection_id) {
            self.root_dirty = true;
        }
        Ok(())
    }

    pub(crate) fn remove_blob_collection(&mut self, collection_id: CollectionId) -> bool {
        let removed = self.blob_collections.remove(&collection_id);
        if removed {
            self.root_dirty = true;
        }
        removed
    }

    /// Drop a collection if it carries the class's own name and is empty.
    pub(crate) fn try_drop_collection(&self, lower_class_name: &str, collection_id: CollectionId) -> Result<()> {
        let collections = &self.env.collections;
        if collections.name_by_id(collection_id).as_deref() == Some(lower_class_name)
            && collections.count_records(collection_id)? == 0
        {
            collections.drop_collection(collection_id)?;
            debug!(collection_id, "dropped default collection");
        }
        Ok(())
    }

    /// Add ids to the polymorphic set of `start` and every ancestor.
    ///
    /// Each id that is new to a class is registered with that class's
    /// indexes. If registration fails the id is left out of that class's
    /// set and the failure is logged.
    pub(crate) fn add_polymorphic_ids(&mut self, start: ClassId, ids: &[CollectionId]) -> Result<()> {
        for target in self.self_and_ancestors(start)? {
            for collection_id in ids.iter().copied() {
                if collection_id == NOT_EXISTENT_COLLECTION_ID {
                    continue;
                }
                if !insert_sorted(&mut self.get_mut(target)?.polymorphic_collection_ids, collection_id) {
                    continue;
                }
                if !self.register_with_indexes(target, collection_id)? {
                    remove_sorted(&mut self.get_mut(target)?.polymorphic_collection_ids, collection_id);
                }
            }
        }
        Ok(())
    }

    /// Remove ids from the polymorphic sets of `start` and its ancestors
    /// wherever no remaining direct id or subclass still contributes them.
    ///
    /// Runs to a fixpoint so diamonds keep ids reachable through another path.
    pub(crate) fn remove_polymorphic_ids(&mut self, start: ClassId, ids: &[CollectionId]) -> Result<()> {
        let affected = self.self_and_ancestors(start)?;
        loop {
            let mut changed = false;
            for target in &affected {
                for collection_id in ids.iter().copied() {
                    let class = self.get(*target)?;
                    if !class.has_polymorphic_collection_id(collection_id)
                        || class.has_collection_id(collection_id)
                    {
                        continue;
                    }
                    let still_inherited = class.sub_classes.iter().any(|sub| {
                        self.class(*sub)
                            .map_or(false, |s| s.has_polymorphic_collection_id(collection_id))
                    });
                    if still_inherited {
                        continue;
                    }
                    remove_sorted(&mut self.get_mut(*target)?.polymorphic_collection_ids, collection_id);
                    self.deregister_from_indexes(*target, collection_id)?;
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    fn register_with_indexes(&self, class: ClassId, collection_id: CollectionId) -> Result<bool> {
        let name = self.name_of(class)?;
        for index in self.env.indexes.class_indexes(&name) {
            if let Err(e) = self.env.indexes.add_collection_to_index(collection_id, &index.name) {
                warn!(
                    class = %name,
                    index = %index.name,
                    collection_id,
                    error = %e,
                    "could not add collection to index, leaving it out of the polymorphic set"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn deregister_from_indexes(&self, class: ClassId, collection_id: CollectionId) -> Result<()> {
        let name = self.name_of(class)?;
        for index in self.env.indexes.class_indexes(&name) {
            if let Err(e) = self
                .env
                .indexes
                .remove_collection_from_index(collection_id, &index.name)
            {
                warn!(
                    class = %name,
                    index = %index.name,
                    collection_id,
                    error = %e,
                    "could not remove collection from index"
                );
            }
        }
        Ok(())
    }
}
