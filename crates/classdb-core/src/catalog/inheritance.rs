//! Multiple inheritance: super/subclass edges and property conflicts.

use super::property::PropertyDescriptor;
use super::state::CatalogState;
use crate::error::{Error, Result};
use crate::types::ClassId;
use std::collections::{BTreeMap, BTreeSet};

impl CatalogState {
    /// Flattened properties of a class keyed by lower-cased name.
    ///
    /// Super classes contribute in reverse declaration order, so the first
    /// declared super class wins among supers; the class's own properties
    /// win over everything inherited.
    pub fn properties_map(&self, id: ClassId) -> BTreeMap<String, &PropertyDescriptor> {
        let mut map = BTreeMap::new();
        let mut visiting = BTreeSet::new();
        self.collect_properties(id, &mut map, &mut visiting);
        map
    }

    fn collect_properties<'a>(
        &'a self,
        id: ClassId,
        map: &mut BTreeMap<String, &'a PropertyDescriptor>,
        visiting: &mut BTreeSet<ClassId>,
    ) {
        if !visiting.insert(id) {
            return;
        }
        if let Some(class) = self.class(id) {
            for super_id in class.super_classes.iter().rev() {
                self.collect_properties(*super_id, map, visiting);
            }
            for (key, prop) in &class.properties {
                map.insert(key.clone(), prop);
            }
        }
        visiting.remove(&id);
    }

    /// Property by name, resolved the same way as
    /// [`properties_map`](Self::properties_map): own first, then each super
    /// class depth-first in declaration order.
    pub fn find_property(&self, id: ClassId, name: &str) -> Option<&PropertyDescriptor> {
        let owner = self.property_owner(id, name)?;
        self.class(owner)?.properties.get(&name.to_lowercase())
    }

    /// Class whose declaration of `name` is the one `id` sees.
    pub(crate) fn property_owner(&self, id: ClassId, name: &str) -> Option<ClassId> {
        let key = name.to_lowercase();
        let mut visiting = BTreeSet::new();
        self.owner_by_key(id, &key, &mut visiting)
    }

    fn owner_by_key(
        &self,
        id: ClassId,
        key: &str,
        visiting: &mut BTreeSet<ClassId>,
    ) -> Option<ClassId> {
        if !visiting.insert(id) {
            return None;
        }
        let class = self.class(id)?;
        let owner = if class.properties.contains_key(key) {
            Some(id)
        } else {
            class
                .super_classes
                .iter()
                .find_map(|super_id| self.owner_by_key(*super_id, key, visiting))
        };
        visiting.remove(&id);
        owner
    }

    /// Whether the class declares or inherits the property.
    pub fn exists_property(&self, id: ClassId, name: &str) -> bool {
        self.find_property(id, name).is_some()
    }

    /// Fail if adding `parent` to `child` would create a cycle.
    pub(crate) fn check_recursion(&self, parent: ClassId, child: ClassId) -> Result<()> {
        if self.is_sub_class_of(parent, child) {
            return Err(Error::Cycle {
                class: self.name_of(child)?,
                super_class: self.name_of(parent)?,
            });
        }
        Ok(())
    }

    /// Fail if `child` and `parent` see a same-named property with
    /// different types.
    pub(crate) fn check_property_conflict(&self, child: ClassId, parent: ClassId) -> Result<()> {
        let own = self.properties_map(child);
        self.check_against(child, parent, &own)
    }

    /// Like [`check_property_conflict`](Self::check_property_conflict) but
    /// only against the properties `child` declares itself, so supers that
    /// are about to be replaced do not count.
    fn check_declared_conflict(&self, child: ClassId, parent: ClassId) -> Result<()> {
        let own: BTreeMap<String, &PropertyDescriptor> = self
            .get(child)?
            .properties
            .iter()
            .map(|(key, prop)| (key.clone(), prop))
            .collect();
        self.check_against(child, parent, &own)
    }

    fn check_against(
        &self,
        child: ClassId,
        parent: ClassId,
        own: &BTreeMap<String, &PropertyDescriptor>,
    ) -> Result<()> {
        for (key, inherited) in self.properties_map(parent) {
            if let Some(existing) = own.get(&key) {
                if existing.property_type != inherited.property_type {
                    return Err(Error::Schema(format!(
                        "cannot add base class '{}' to '{}', because of property conflict: \
                         '{}' ({}) vs '{}' ({})",
                        self.name_of(parent)?,
                        self.name_of(child)?,
                        existing.name,
                        existing.property_type,
                        inherited.name,
                        inherited.property_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fail if any property name is seen with two different types across
    /// the flattened properties of the given classes.
    pub(crate) fn check_parameters_conflict(&self, classes: &[ClassId]) -> Result<()> {
        let mut cumulative: BTreeMap<String, &PropertyDescriptor> = BTreeMap::new();
        for id in classes {
            let properties = self.properties_map(*id);
            for (key, prop) in &properties {
                if let Some(existing) = cumulative.get(key) {
                    if existing.property_type != prop.property_type {
                        return Err(Error::Schema(format!(
                            "properties conflict detected: '{}' ({}) vs '{}' ({})",
                            existing.name,
                            existing.property_type,
                            prop.name,
                            prop.property_type
                        )));
                    }
                }
            }
            cumulative.extend(properties);
        }
        Ok(())
    }

    pub(crate) fn check_distinct(&self, supers: &[ClassId]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for id in supers {
            if !seen.insert(*id) {
                return Err(Error::Schema(format!(
                    "duplicated superclass '{}'",
                    self.name_of(*id)?
                )));
            }
        }
        Ok(())
    }

    /// Register `child` as a subclass of `parent` and push the child's
    /// polymorphic ids up through `parent` and its ancestors.
    pub(crate) fn link_sub_class(&mut self, parent: ClassId, child: ClassId) -> Result<()> {
        self.check_recursion(parent, child)?;
        let parent_class = self.get_mut(parent)?;
        if !parent_class.sub_classes.contains(&child) {
            parent_class.sub_classes.push(child);
        }
        let inherited = self.get(child)?.polymorphic_collection_ids.clone();
        self.add_polymorphic_ids(parent, &inherited)?;
        self.mark_dirty(parent);
        self.mark_dirty(child);
        Ok(())
    }

    /// Undo [`link_sub_class`](Self::link_sub_class).
    pub(crate) fn unlink_sub_class(&mut self, parent: ClassId, child: ClassId) -> Result<()> {
        self.get_mut(parent)?.sub_classes.retain(|id| *id != child);
        let inherited = self.get(child)?.polymorphic_collection_ids.clone();
        self.remove_polymorphic_ids(parent, &inherited)?;
        self.mark_dirty(parent);
        self.mark_dirty(child);
        Ok(())
    }

    pub(crate) fn add_super_class(&mut self, child: ClassId, parent: ClassId) -> Result<()> {
        if self.get(child)?.super_classes.contains(&parent) {
            return Err(Error::Schema(format!(
                "class '{}' was already added as superclass of '{}'",
                self.name_of(parent)?,
                self.name_of(child)?
            )));
        }
        self.check_property_conflict(child, parent)?;
        self.link_sub_class(parent, child)?;
        self.get_mut(child)?.super_classes.push(parent);
        Ok(())
    }

    pub(crate) fn remove_super_class(&mut self, child: ClassId, parent: ClassId) -> Result<()> {
        if !self.get(child)?.super_classes.contains(&parent) {
            return Ok(());
        }
        self.get_mut(child)?.super_classes.retain(|id| *id != parent);
        self.unlink_sub_class(parent, child)
    }

    /// Replace the super classes of `child`.
    ///
    /// Removed supers are unlinked before added supers are linked. A failure
    /// while linking leaves the edges applied so far in place.
    pub(crate) fn set_super_classes(&mut self, child: ClassId, supers: Vec<ClassId>) -> Result<()> {
        self.check_distinct(&supers)?;
        self.check_parameters_conflict(&supers)?;
        for parent in &supers {
            self.check_declared_conflict(child, *parent)?;
        }

        let current = self.get(child)?.super_classes.clone();
        for removed in current.iter().filter(|id| !supers.contains(id)) {
            self.remove_super_class(child, *removed)?;
        }
        for added in supers.iter().filter(|id| !current.contains(id)) {
            self.link_sub_class(*added, child)?;
            self.get_mut(child)?.super_classes.push(*added);
        }

        self.get_mut(child)?.super_classes = supers;
        self.mark_dirty(child);
        Ok(())
    }
}
