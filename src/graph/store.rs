//! EntityStore: the live, editable entity map of one crate
//!
//! Entities are held as `Arc<Entity>` and mutated through `Arc::make_mut`,
//! so the saved baseline and any map handed out to a caller keep seeing
//! the version they were given.

use super::crate_graph::CrateGraph;
use super::entity::{Entity, EntityId, EntityMap, EntryValue, Properties, PropertyValue};
use crate::context::specs::RO_CRATE_SPEC_PREFIX;
use crate::context::ContextValue;
use crate::diff::{self, Diff, TYPE_PROPERTY};
use crate::reconcile::{self, ServerDifferences};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Conventional id of the metadata descriptor
pub const METADATA_DESCRIPTOR_ID: &str = "ro-crate-metadata.json";

/// Conventional id of the root data entity
pub const ROOT_ENTITY_ID: &str = "./";

/// Where a reference to some entity lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSite {
    pub entity: EntityId,
    pub property: String,
    pub index: usize,
}

/// Whether `entity` is an RO-Crate metadata descriptor: a `CreativeWork`
/// that `conformsTo` an RO-Crate specification
pub fn is_metadata_descriptor(entity: &Entity) -> bool {
    entity.has_type("CreativeWork")
        && entity
            .get("conformsTo")
            .map(|v| {
                v.entries().iter().any(|e| {
                    e.as_reference().is_some_and(|id| {
                        id.as_str().starts_with(RO_CRATE_SPEC_PREFIX)
                            || id.as_str().starts_with("http://w3id.org/ro/crate/")
                    })
                })
            })
            .unwrap_or(false)
}

/// Find the metadata descriptor among `entities`, preferring the
/// conventional `ro-crate-metadata.json` id
pub fn find_metadata_descriptor<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Option<&'a Entity> {
    let mut first = None;
    for entity in entities {
        if is_metadata_descriptor(entity) {
            if entity.id.as_str() == METADATA_DESCRIPTOR_ID {
                return Some(entity);
            }
            first.get_or_insert(entity);
        }
    }
    first
}

/// Root detection used everywhere in the crate.
///
/// Follows the descriptor's `about` reference. Without a descriptor, an
/// entity with the conventional id `./` is taken as root.
pub fn find_root_entity_id<'a>(entities: impl IntoIterator<Item = &'a Entity> + Clone) -> Option<EntityId> {
    if let Some(descriptor) = find_metadata_descriptor(entities.clone()) {
        return descriptor
            .get("about")
            .and_then(|v| v.entries().iter().find_map(|e| e.as_reference().cloned()));
    }
    entities
        .into_iter()
        .find(|e| e.id.as_str() == ROOT_ENTITY_ID)
        .map(|e| e.id.clone())
}

impl CrateGraph {
    /// Root data entity id, see [`find_root_entity_id`]
    pub fn root_entity_id(&self) -> Option<EntityId> {
        find_root_entity_id(self.entities.iter())
    }
}

/// Live entity map of a crate plus the baseline it was last saved as
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: EntityMap,
    /// Graph order of the live entities
    order: Vec<EntityId>,
    /// Snapshot taken at load and at each save; replaced, never edited in place
    baseline: Arc<EntityMap>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a graph; the loaded state is also the baseline
    pub fn from_graph(graph: &CrateGraph) -> Self {
        let mut store = Self::new();
        store.reset(graph);
        store
    }

    /// Replace everything, baseline included
    pub fn reset(&mut self, graph: &CrateGraph) {
        self.entities = graph.entity_map();
        self.order = graph.entities.iter().map(|e| e.id.clone()).collect();
        self.baseline = Arc::new(self.entities.clone());
    }

    // === Reads ===

    /// Read-only view of the live entities
    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id).map(AsRef::as_ref)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Entity ids in graph order
    pub fn ids_in_order(&self) -> &[EntityId] {
        &self.order
    }

    /// Entities in graph order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + Clone {
        self.order.iter().filter_map(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn root_entity_id(&self) -> Option<EntityId> {
        find_root_entity_id(self.iter())
    }

    pub fn metadata_descriptor_id(&self) -> Option<EntityId> {
        find_metadata_descriptor(self.iter()).map(|e| e.id.clone())
    }

    /// Serialize the live state in graph order
    pub fn to_graph(&self, context: ContextValue) -> CrateGraph {
        CrateGraph {
            context,
            entities: self.iter().cloned().collect(),
        }
    }

    // === Structural mutation ===

    /// Insert a new entity. Returns false and changes nothing if the id is taken.
    pub fn add_entity<I, T>(&mut self, id: impl Into<EntityId>, types: I, properties: Properties) -> bool
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let id = id.into();
        if self.entities.contains_key(&id) {
            tracing::debug!(entity = %id, "add_entity refused: id already exists");
            return false;
        }
        let mut entity = Entity::new(id.clone(), types);
        entity.properties = properties;
        self.order.push(id.clone());
        self.entities.insert(id, Arc::new(entity));
        true
    }

    /// Insert or replace a whole entity, keeping its position if it exists
    pub fn put_entity(&mut self, entity: Entity) {
        let id = entity.id.clone();
        if !self.entities.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.entities.insert(id, Arc::new(entity));
    }

    /// Remove the node itself. References to it elsewhere are left dangling.
    pub fn remove_entity(&mut self, id: &EntityId) -> Option<Arc<Entity>> {
        let removed = self.entities.remove(id)?;
        self.order.retain(|o| o != id);
        Some(removed)
    }

    fn entity_mut(&mut self, id: &EntityId, operation: &str) -> Option<&mut Entity> {
        match self.entities.get_mut(id) {
            Some(entity) => Some(Arc::make_mut(entity)),
            None => {
                tracing::warn!(entity = %id, operation, "entity not found, ignoring");
                None
            }
        }
    }

    /// Set one value of a property.
    ///
    /// `None` replaces the whole property with a single value. An index past
    /// the end appends instead of failing.
    pub fn set_property_value(
        &mut self,
        id: &EntityId,
        name: &str,
        value: EntryValue,
        index: Option<usize>,
    ) -> bool {
        let Some(entity) = self.entity_mut(id, "set_property_value") else {
            return false;
        };
        let Some(index) = index else {
            entity.properties.insert(name.to_string(), PropertyValue::Single(value));
            return true;
        };

        let new_value = match entity.properties.remove(name) {
            None => PropertyValue::Single(value),
            Some(PropertyValue::Single(_)) if index == 0 => PropertyValue::Single(value),
            Some(existing) => {
                let mut entries = existing.into_entries();
                match entries.get_mut(index) {
                    Some(slot) => *slot = value,
                    None => entries.push(value),
                }
                PropertyValue::List(entries)
            }
        };
        entity.properties.insert(name.to_string(), new_value);
        true
    }

    /// Append a value, turning a single-valued property into a list
    pub fn add_property_entry(&mut self, id: &EntityId, name: &str, value: EntryValue) -> bool {
        let Some(entity) = self.entity_mut(id, "add_property_entry") else {
            return false;
        };
        let new_value = match entity.properties.remove(name) {
            None => PropertyValue::Single(value),
            Some(existing) => {
                let mut entries = existing.into_entries();
                entries.push(value);
                PropertyValue::List(entries)
            }
        };
        entity.properties.insert(name.to_string(), new_value);
        true
    }

    /// Remove one value. A property left without values is removed; a list
    /// stays a list while it has entries.
    pub fn remove_property_entry(&mut self, id: &EntityId, name: &str, index: usize) -> bool {
        let Some(entity) = self.entity_mut(id, "remove_property_entry") else {
            return false;
        };
        let Some(existing) = entity.properties.get(name) else {
            return false;
        };
        if index >= existing.len() {
            return false;
        }
        let was_list = matches!(existing, PropertyValue::List(_));
        let mut entries = existing.clone().into_entries();
        entries.remove(index);
        match PropertyValue::from_entries_shaped(entries, was_list) {
            Some(value) => entity.properties.insert(name.to_string(), value),
            None => entity.properties.remove(name),
        };
        true
    }

    /// Drop a property entirely
    pub fn remove_property(&mut self, id: &EntityId, name: &str) -> bool {
        match self.entity_mut(id, "remove_property") {
            Some(entity) => entity.properties.remove(name).is_some(),
            None => false,
        }
    }

    pub fn set_types<I, T>(&mut self, id: &EntityId, types: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        match self.entity_mut(id, "set_types") {
            Some(entity) => {
                entity.types = types.into_iter().map(Into::into).collect();
                true
            }
            None => false,
        }
    }

    /// Rename an entity and rewrite every reference to it
    pub fn change_entity_id(&mut self, old: &EntityId, new: impl Into<EntityId>) -> bool {
        let new = new.into();
        if self.entities.contains_key(&new) {
            tracing::warn!(from = %old, to = %new, "change_entity_id refused: target id exists");
            return false;
        }
        let Some(entity) = self.entities.remove(old) else {
            tracing::warn!(entity = %old, "change_entity_id: entity not found");
            return false;
        };
        let mut entity = Arc::unwrap_or_clone(entity);
        entity.id = new.clone();
        self.entities.insert(new.clone(), Arc::new(entity));
        for slot in self.order.iter_mut() {
            if slot == old {
                *slot = new.clone();
            }
        }

        for shared in self.entities.values_mut() {
            if !shared.references_id(old) {
                continue;
            }
            let entity = Arc::make_mut(shared);
            for value in entity.properties.values_mut() {
                let entries = match value {
                    PropertyValue::Single(v) => std::slice::from_mut(v),
                    PropertyValue::List(vs) => vs.as_mut_slice(),
                };
                for entry in entries {
                    if entry.as_reference() == Some(old) {
                        *entry = EntryValue::Reference(new.clone());
                    }
                }
            }
        }
        true
    }

    /// Every place a live entity references `target`, in graph order
    pub fn find_references_to(&self, target: &EntityId) -> Vec<ReferenceSite> {
        self.iter()
            .flat_map(|entity| {
                entity
                    .references()
                    .filter(|(_, _, id)| *id == target)
                    .map(|(property, index, _)| ReferenceSite {
                        entity: entity.id.clone(),
                        property: property.to_string(),
                        index,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Remove every reference to `target`; returns how many were removed
    pub fn remove_references_to(&mut self, target: &EntityId) -> usize {
        let mut removed = 0;
        for shared in self.entities.values_mut() {
            if !shared.references_id(target) {
                continue;
            }
            let entity = Arc::make_mut(shared);
            let names: Vec<String> = entity.properties.keys().cloned().collect();
            for name in names {
                let Some(value) = entity.properties.remove(&name) else {
                    continue;
                };
                let before = value.len();
                let was_list = matches!(value, PropertyValue::List(_));
                let kept: Vec<EntryValue> = value
                    .into_entries()
                    .into_iter()
                    .filter(|e| e.as_reference() != Some(target))
                    .collect();
                removed += before - kept.len();
                if let Some(v) = PropertyValue::from_entries_shaped(kept, was_list) {
                    entity.properties.insert(name, v);
                }
            }
        }
        removed
    }

    // === Baseline ===

    /// The last saved state
    pub fn baseline(&self) -> &EntityMap {
        &self.baseline
    }

    /// Shared handle to the current baseline snapshot
    pub fn baseline_snapshot(&self) -> Arc<EntityMap> {
        Arc::clone(&self.baseline)
    }

    pub fn baseline_entity(&self, id: &EntityId) -> Option<&Entity> {
        self.baseline.get(id).map(AsRef::as_ref)
    }

    /// Record the live version of one entity as saved
    pub fn mark_saved(&mut self, id: &EntityId) {
        let live = self.entities.get(id).cloned();
        let baseline = Arc::make_mut(&mut self.baseline);
        match live {
            Some(entity) => {
                baseline.insert(id.clone(), entity);
            }
            None => {
                baseline.remove(id);
            }
        }
    }

    /// Record the entire live state as saved, swapping the baseline at once
    pub fn mark_all_saved(&mut self) {
        self.baseline = Arc::new(self.entities.clone());
    }

    /// Restore an entity to its baseline version, removing it if it is new
    pub fn revert_entity(&mut self, id: &EntityId) -> bool {
        match self.baseline.get(id).cloned() {
            Some(saved) => {
                if !self.entities.contains_key(id) {
                    self.order.push(id.clone());
                }
                self.entities.insert(id.clone(), saved);
                true
            }
            None => self.remove_entity(id).is_some(),
        }
    }

    /// Restore one property to its baseline value
    pub fn revert_property(&mut self, id: &EntityId, name: &str) -> bool {
        let saved = self.baseline.get(id).cloned();
        let Some(entity) = self.entity_mut(id, "revert_property") else {
            return false;
        };
        if name == TYPE_PROPERTY {
            if let Some(saved) = saved {
                entity.types = saved.types.clone();
            }
            return true;
        }
        match saved.as_ref().and_then(|s| s.get(name)) {
            Some(value) => {
                entity.properties.insert(name.to_string(), value.clone());
            }
            None => {
                entity.properties.remove(name);
            }
        }
        true
    }

    // === Server reconciliation ===

    /// Apply server overwrites to the live state and the baseline alike, so
    /// forced values do not show up as unsaved local edits.
    ///
    /// Returns how many property patches had no live target.
    pub fn apply_server_differences(&mut self, differences: &ServerDifferences) -> usize {
        for entity in &differences.force_entities {
            if !self.entities.contains_key(&entity.id) {
                self.order.push(entity.id.clone());
            }
        }
        let skipped = reconcile::apply_forced_updates(&mut self.entities, differences, true);
        self.order.retain(|id| self.entities.contains_key(id));
        reconcile::apply_forced_updates(Arc::make_mut(&mut self.baseline), differences, false);
        skipped
    }

    // === Diffs ===

    pub fn entity_diff(&self, id: &EntityId) -> Diff {
        diff::entity_diff(self.get(id), self.baseline_entity(id))
    }

    pub fn property_diff(&self, id: &EntityId, name: &str) -> Diff {
        diff::property_diff(self.get(id), self.baseline_entity(id), name)
    }

    pub fn changelist(&self) -> BTreeMap<EntityId, Diff> {
        diff::changelist(&self.entities, &self.baseline)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.changelist().values().any(|d| d.is_changed())
    }
}
