//! Change detection against the saved baseline
//!
//! Every function here is a pure function of the live and baseline
//! entities. Nothing is cached, so a diff can never be stale.

use crate::graph::{Entity, EntityId, EntityMap, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Property name under which the entity's types can be diffed
pub const TYPE_PROPERTY: &str = "@type";

/// Change status of an entity or property relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diff {
    /// Unchanged, or absent on both sides
    None,
    /// Live only
    New,
    /// On both sides but different
    Modified,
    /// Baseline only
    Deleted,
}

impl Diff {
    pub fn is_changed(self) -> bool {
        self != Diff::None
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Diff::None => "unchanged",
            Diff::New => "new",
            Diff::Modified => "modified",
            Diff::Deleted => "deleted",
        };
        f.pad(s)
    }
}

/// Editor-internal keys never count as changes
pub fn is_internal_key(name: &str) -> bool {
    name.starts_with("__")
}

fn classify<T>(live: Option<T>, baseline: Option<T>, eq: impl Fn(&T, &T) -> bool) -> Diff {
    match (live, baseline) {
        (None, None) => Diff::None,
        (Some(_), None) => Diff::New,
        (None, Some(_)) => Diff::Deleted,
        (Some(a), Some(b)) if eq(&a, &b) => Diff::None,
        (Some(_), Some(_)) => Diff::Modified,
    }
}

/// Structural equality of two entities, ignoring internal keys
pub fn entities_equal(a: &Entity, b: &Entity) -> bool {
    if a.id != b.id || a.types != b.types {
        return false;
    }
    let names: BTreeSet<&String> = a
        .properties
        .keys()
        .chain(b.properties.keys())
        .filter(|k| !is_internal_key(k))
        .collect();
    names.into_iter().all(|name| {
        match (a.properties.get(name), b.properties.get(name)) {
            (Some(x), Some(y)) => x.structurally_eq(y),
            (None, None) => true,
            _ => false,
        }
    })
}

/// Whole-entity diff
pub fn entity_diff(live: Option<&Entity>, baseline: Option<&Entity>) -> Diff {
    classify(live, baseline, |a, b| entities_equal(a, b))
}

/// Diff of a single property; `@type` diffs the entity's types
pub fn property_diff(live: Option<&Entity>, baseline: Option<&Entity>, name: &str) -> Diff {
    if name == TYPE_PROPERTY {
        return classify(
            live.map(|e| &e.types),
            baseline.map(|e| &e.types),
            |a, b| a == b,
        );
    }
    if is_internal_key(name) {
        return Diff::None;
    }
    classify(
        live.and_then(|e| e.get(name)),
        baseline.and_then(|e| e.get(name)),
        |a: &&PropertyValue, b: &&PropertyValue| a.structurally_eq(b),
    )
}

/// Names of the properties that differ between two versions of an entity,
/// `@type` included, in sorted order
pub fn changed_properties(a: &Entity, b: &Entity) -> Vec<String> {
    let mut changed = Vec::new();
    if a.types != b.types {
        changed.push(TYPE_PROPERTY.to_string());
    }
    let names: BTreeSet<&String> = a.properties.keys().chain(b.properties.keys()).collect();
    for name in names {
        if property_diff(Some(a), Some(b), name).is_changed() {
            changed.push(name.clone());
        }
    }
    changed
}

/// Diff of every entity on either side, keyed by id
pub fn changelist(live: &EntityMap, baseline: &EntityMap) -> BTreeMap<EntityId, Diff> {
    live.keys()
        .chain(baseline.keys())
        .map(|id| {
            let diff = entity_diff(
                live.get(id).map(AsRef::as_ref),
                baseline.get(id).map(AsRef::as_ref),
            );
            (id.clone(), diff)
        })
        .collect()
}

/// Number of entries that are not `Diff::None`
pub fn unsaved_count(changes: &BTreeMap<EntityId, Diff>) -> usize {
    changes.values().filter(|d| d.is_changed()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntryValue;
    use std::sync::Arc;

    fn person(name: &str) -> Entity {
        Entity::new("#p", ["Person"]).with_text("name", name)
    }

    #[test]
    fn entity_diff_taxonomy() {
        let a = person("Max");
        assert_eq!(entity_diff(Some(&a), None), Diff::New);
        assert_eq!(entity_diff(None, Some(&a)), Diff::Deleted);
        assert_eq!(entity_diff(None, None), Diff::None);
        assert_eq!(entity_diff(Some(&a), Some(&a.clone())), Diff::None);
        assert_eq!(entity_diff(Some(&person("Moritz")), Some(&a)), Diff::Modified);
    }

    #[test]
    fn internal_keys_are_ignored() {
        let a = person("Max");
        let b = person("Max").with_text("__editorState", "focused");
        assert_eq!(entity_diff(Some(&b), Some(&a)), Diff::None);
        assert_eq!(property_diff(Some(&b), Some(&a), "__editorState"), Diff::None);
    }

    #[test]
    fn type_changes_are_modifications() {
        let a = person("Max");
        let mut b = a.clone();
        b.types.push("Author".into());
        assert_eq!(entity_diff(Some(&b), Some(&a)), Diff::Modified);
        assert_eq!(property_diff(Some(&b), Some(&a), TYPE_PROPERTY), Diff::Modified);
        assert_eq!(property_diff(Some(&b), Some(&a), "name"), Diff::None);
    }

    #[test]
    fn property_diff_taxonomy() {
        let base = person("Max");
        let live = person("Max").with_text("email", "max@example.org");
        assert_eq!(property_diff(Some(&live), Some(&base), "email"), Diff::New);
        assert_eq!(property_diff(Some(&base), Some(&live), "email"), Diff::Deleted);
        assert_eq!(property_diff(Some(&live), None, "name"), Diff::New);
        assert_eq!(property_diff(None, Some(&base), "name"), Diff::Deleted);
        assert_eq!(property_diff(Some(&live), Some(&base), "missing"), Diff::None);
    }

    #[test]
    fn reordering_is_a_modification() {
        let a = Entity::new("./", ["Dataset"]).with_property(
            "hasPart",
            PropertyValue::List(vec![EntryValue::reference("a"), EntryValue::reference("b")]),
        );
        let b = Entity::new("./", ["Dataset"]).with_property(
            "hasPart",
            PropertyValue::List(vec![EntryValue::reference("b"), EntryValue::reference("a")]),
        );
        assert_eq!(property_diff(Some(&b), Some(&a), "hasPart"), Diff::Modified);
        assert_eq!(changed_properties(&a, &b), vec!["hasPart".to_string()]);
    }

    #[test]
    fn one_element_list_matches_single_value() {
        let single = Entity::new("./", ["Dataset"]).with_reference("hasPart", "a");
        let list = Entity::new("./", ["Dataset"])
            .with_property("hasPart", PropertyValue::List(vec![EntryValue::reference("a")]));
        assert_eq!(property_diff(Some(&list), Some(&single), "hasPart"), Diff::None);
        assert!(entities_equal(&single, &list));
        assert!(changed_properties(&single, &list).is_empty());
    }

    #[test]
    fn changelist_covers_both_sides() {
        let mut live = EntityMap::new();
        let mut base = EntityMap::new();
        live.insert("#same".into(), Arc::new(Entity::new("#same", ["Thing"])));
        base.insert("#same".into(), Arc::new(Entity::new("#same", ["Thing"])));
        live.insert("#new".into(), Arc::new(Entity::new("#new", ["Thing"])));
        base.insert("#gone".into(), Arc::new(Entity::new("#gone", ["Thing"])));

        let changes = changelist(&live, &base);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[&EntityId::from("#same")], Diff::None);
        assert_eq!(changes[&EntityId::from("#new")], Diff::New);
        assert_eq!(changes[&EntityId::from("#gone")], Diff::Deleted);
        assert_eq!(unsaved_count(&changes), 2);
    }
}
