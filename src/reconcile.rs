//! Server reconciliation
//!
//! When the authoritative copy of a crate is fetched again, local state is
//! brought up to date at property granularity: whatever the server changed
//! since the last fetch overwrites local state, everything else (including
//! pending local edits) is left alone. When both sides changed the same
//! property the server wins and a warning is logged. A server entity with
//! no local counterpart is always forced in whole, even one the user deleted.

use crate::diff::{changed_properties, entities_equal, TYPE_PROPERTY};
use crate::graph::{CrateGraph, Entity, EntityId, EntityMap, EntryValue, PropertyValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-property overwrites for one entity; `None` means the server removed it
pub type PropertyForces = BTreeMap<String, Option<PropertyValue>>;

/// Overwrites needed to bring local state in line with the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerDifferences {
    /// Entities to insert or replace wholesale, in server graph order
    pub force_entities: Vec<Entity>,
    /// Individual properties to overwrite
    pub force_properties: BTreeMap<EntityId, PropertyForces>,
    /// Entities the server deleted since the last fetch
    pub removed_entities: Vec<EntityId>,
}

impl ServerDifferences {
    pub fn is_empty(&self) -> bool {
        self.force_entities.is_empty() && self.force_properties.is_empty() && self.removed_entities.is_empty()
    }
}

fn property_of(entity: &Entity, name: &str) -> Option<PropertyValue> {
    if name == TYPE_PROPERTY {
        return Some(PropertyValue::List(
            entity.types.iter().cloned().map(EntryValue::Text).collect(),
        ));
    }
    entity.get(name).cloned()
}

fn same_value(a: &Option<PropertyValue>, b: &Option<PropertyValue>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x.structurally_eq(y),
        (None, None) => true,
        _ => false,
    }
}

/// Work out which parts of `live` the fresh server graph must overwrite.
///
/// `last_known` is the server graph as of the previous fetch; comparing it
/// with `fresh` tells what the server itself changed in between.
pub fn compute_server_differences(fresh: &CrateGraph, last_known: &CrateGraph, live: &EntityMap) -> ServerDifferences {
    let previous = last_known.index();
    let mut out = ServerDifferences::default();

    for server in &fresh.entities {
        let local = live.get(&server.id);
        let before = previous.get(&server.id).copied();

        match (local, before) {
            (None, _) => out.force_entities.push(server.clone()),
            (Some(_), None) => out.force_entities.push(server.clone()),
            (Some(local), Some(before)) => {
                if entities_equal(server, before) {
                    continue;
                }
                let mut forces = PropertyForces::new();
                for name in changed_properties(before, server) {
                    let new_value = property_of(server, &name);
                    let old_value = property_of(before, &name);
                    let local_value = property_of(local, &name);
                    if !same_value(&local_value, &old_value) && !same_value(&local_value, &new_value) {
                        tracing::warn!(
                            entity = %server.id,
                            property = %name,
                            "conflicting edit: server change overrides local edit"
                        );
                    }
                    forces.insert(name, new_value);
                }
                if !forces.is_empty() {
                    out.force_properties.insert(server.id.clone(), forces);
                }
            }
        }
    }

    let current = fresh.index();
    for before in &last_known.entities {
        if !current.contains_key(&before.id) && live.contains_key(&before.id) {
            out.removed_entities.push(before.id.clone());
        }
    }

    out
}

/// Apply per-property forces to one entity
pub(crate) fn patch_entity(entity: &mut Entity, forces: &PropertyForces) {
    for (name, value) in forces {
        if name == TYPE_PROPERTY {
            entity.types = value
                .as_ref()
                .map(|v| v.entries().iter().filter_map(|e| e.as_text().map(str::to_string)).collect())
                .unwrap_or_default();
            continue;
        }
        match value {
            Some(v) => {
                entity.properties.insert(name.clone(), v.clone());
            }
            None => {
                entity.properties.remove(name);
            }
        }
    }
}

/// Apply forced updates to a copy of `local`.
///
/// Whole entities go in first, then removals, then property patches. A
/// patch whose entity no longer exists locally is logged and skipped.
pub fn execute_forced_updates(local: &EntityMap, differences: &ServerDifferences) -> EntityMap {
    let mut updated = local.clone();
    apply_forced_updates(&mut updated, differences, true);
    updated
}

/// In-place variant; `log_missing` controls whether absent targets are errors
pub(crate) fn apply_forced_updates(map: &mut EntityMap, differences: &ServerDifferences, log_missing: bool) -> usize {
    let mut skipped = 0;
    for entity in &differences.force_entities {
        map.insert(entity.id.clone(), Arc::new(entity.clone()));
    }
    for id in &differences.removed_entities {
        map.remove(id);
    }
    for (id, forces) in &differences.force_properties {
        match map.get_mut(id) {
            Some(shared) => patch_entity(Arc::make_mut(shared), forces),
            None => {
                if log_missing {
                    tracing::error!(entity = %id, "forced property update for missing entity skipped");
                }
                skipped += 1;
            }
        }
    }
    skipped
}
