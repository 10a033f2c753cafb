//! CrateGraph: a parsed `ro-crate-metadata.json` document
//!
//! Parsing flattens the JSON-LD graph: nested node objects are lifted into
//! top-level entities and replaced by `{"@id"}` references, so every
//! entity is addressable by id and the rest of the crate works with the
//! flat form only.

use super::entity::{reference_target, Entity, EntityId, EntityMap, EntryValue, PropertyValue};
use crate::context::ContextValue;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a document does not have the shape of a crate graph.
///
/// These are structural precondition violations and are propagated to the
/// caller, unlike dangling references or unknown contexts which only
/// degrade behavior.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Crate document has no @graph array")]
    MissingGraph,

    #[error("Entity without a string @id")]
    MissingId,

    #[error("Entity {0} has no @type")]
    MissingType(String),

    #[error("Duplicate entity id: {0}")]
    DuplicateId(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid @context: {0}")]
    InvalidContext(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for graph parsing
pub type GraphResult<T> = Result<T, GraphError>;

/// Type given to nested node objects that carry no `@type` of their own
const UNTYPED_NESTED_TYPE: &str = "Thing";

/// An ordered list of entities plus the `@context` they are written against
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrateGraph {
    pub context: ContextValue,
    pub entities: Vec<Entity>,
}

impl CrateGraph {
    pub fn new(context: ContextValue) -> Self {
        Self {
            context,
            entities: Vec::new(),
        }
    }

    /// Add an entity to the end of the graph
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Parse JSON text
    pub fn from_json_str(json: &str) -> GraphResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Parse a JSON-LD document, flattening nested entities
    pub fn from_value(value: &Value) -> GraphResult<Self> {
        let obj = value.as_object().ok_or(GraphError::MissingGraph)?;
        let items = obj
            .get("@graph")
            .and_then(Value::as_array)
            .ok_or(GraphError::MissingGraph)?;

        let context = match obj.get("@context") {
            None | Some(Value::Null) => ContextValue::empty(),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|_| GraphError::InvalidContext(raw.to_string()))?,
        };

        let mut flattener = Flattener::default();
        for item in items {
            let node = item
                .as_object()
                .ok_or_else(|| GraphError::InvalidValue(format!("graph item is not an object: {}", item)))?;
            flattener.flatten_node(node, true)?;
        }

        Ok(Self {
            context,
            entities: flattener.entities,
        })
    }

    /// Serialize back to a JSON-LD document in graph order
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@context".to_string(), self.context.to_value());
        obj.insert(
            "@graph".to_string(),
            Value::Array(self.entities.iter().map(Entity::to_value).collect()),
        );
        Value::Object(obj)
    }

    pub fn to_json_string_pretty(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    /// Flat map view, id to shared entity
    pub fn entity_map(&self) -> EntityMap {
        self.entities
            .iter()
            .map(|e| (e.id.clone(), Arc::new(e.clone())))
            .collect()
    }

    /// Entities keyed by id, borrowing from the graph
    pub fn index(&self) -> HashMap<&EntityId, &Entity> {
        self.entities.iter().map(|e| (&e.id, e)).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Serialize for CrateGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CrateGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

/// Lifts nested node objects out into top-level entities
#[derive(Default)]
struct Flattener {
    entities: Vec<Entity>,
    positions: HashMap<EntityId, usize>,
    top_level: HashSet<EntityId>,
    blank_nodes: usize,
}

impl Flattener {
    fn next_blank_id(&mut self) -> EntityId {
        let id = EntityId::from_string(format!("_:b{}", self.blank_nodes));
        self.blank_nodes += 1;
        id
    }

    fn flatten_node(&mut self, node: &Map<String, Value>, top_level: bool) -> GraphResult<EntityId> {
        let id = match node.get("@id") {
            Some(Value::String(s)) => EntityId::from_string(s.clone()),
            Some(_) => return Err(GraphError::MissingId),
            None if top_level => return Err(GraphError::MissingId),
            None => self.next_blank_id(),
        };

        let types = match node.get("@type") {
            Some(raw) => Entity::parse_types(raw)?,
            None if top_level => return Err(GraphError::MissingType(id.to_string())),
            None => vec![UNTYPED_NESTED_TYPE.to_string()],
        };

        if top_level && !self.top_level.insert(id.clone()) {
            return Err(GraphError::DuplicateId(id.to_string()));
        }

        // Reserve the slot before descending so a parent precedes its children
        let existing = self.positions.get(&id).copied();
        let position = match existing {
            Some(pos) => pos,
            None => {
                self.entities.push(Entity::new(id.clone(), Vec::<String>::new()));
                self.positions.insert(id.clone(), self.entities.len() - 1);
                self.entities.len() - 1
            }
        };

        let mut properties = BTreeMap::new();
        for (key, raw) in node {
            if key == "@id" || key == "@type" {
                continue;
            }
            let entries = self.flatten_entries(raw)?;
            if let Some(value) = flatten_shape(raw, entries) {
                properties.insert(key.clone(), value);
            }
        }

        let entity = &mut self.entities[position];
        if existing.is_none() {
            entity.types = types;
            entity.properties = properties;
        } else {
            // Same node described twice: union the descriptions
            for t in types {
                if !entity.types.contains(&t) {
                    entity.types.push(t);
                }
            }
            for (key, value) in properties {
                entity.properties.entry(key).or_insert(value);
            }
        }

        Ok(id)
    }

    fn flatten_entries(&mut self, raw: &Value) -> GraphResult<Vec<EntryValue>> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(_) => {
                            return Err(GraphError::InvalidValue(format!("nested array: {}", raw)))
                        }
                        Value::Null => {}
                        other => out.push(self.flatten_entry(other)?),
                    }
                }
                Ok(out)
            }
            other => Ok(vec![self.flatten_entry(other)?]),
        }
    }

    fn flatten_entry(&mut self, raw: &Value) -> GraphResult<EntryValue> {
        if let Some(target) = reference_target(raw) {
            return Ok(EntryValue::reference(target));
        }
        if let Some(scalar) = EntryValue::from_scalar(raw) {
            return Ok(scalar);
        }
        match raw {
            Value::Object(node) => {
                let id = self.flatten_node(node, false)?;
                Ok(EntryValue::Reference(id))
            }
            other => Err(GraphError::InvalidValue(other.to_string())),
        }
    }
}

/// Arrays stay lists even with one element; bare values stay single
fn flatten_shape(raw: &Value, entries: Vec<EntryValue>) -> Option<PropertyValue> {
    PropertyValue::from_entries_shaped(entries, raw.is_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_graph_fails_fast() {
        let err = CrateGraph::from_value(&json!({"@context": "x"})).unwrap_err();
        assert!(matches!(err, GraphError::MissingGraph));

        let err = CrateGraph::from_value(&json!({"@graph": {}})).unwrap_err();
        assert!(matches!(err, GraphError::MissingGraph));

        let err = CrateGraph::from_value(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, GraphError::MissingGraph));
    }

    #[test]
    fn missing_context_is_empty() {
        let g = CrateGraph::from_value(&json!({"@graph": []})).unwrap();
        assert!(g.context.is_empty());
        assert!(g.is_empty());
    }

    #[test]
    fn duplicate_top_level_ids_are_rejected() {
        let err = CrateGraph::from_value(&json!({
            "@graph": [
                {"@id": "#a", "@type": "Person"},
                {"@id": "#a", "@type": "Person"}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(id) if id == "#a"));
    }

    #[test]
    fn nested_entities_are_lifted() {
        let g = CrateGraph::from_value(&json!({
            "@graph": [{
                "@id": "./",
                "@type": "Dataset",
                "author": {"@id": "#max", "@type": "Person", "name": "Max"},
                "funder": {"@type": "Organization", "name": "Agency"}
            }]
        }))
        .unwrap();

        assert_eq!(g.len(), 3);
        assert_eq!(g.entities[0].id.as_str(), "./");
        let root = &g.entities[0];
        assert_eq!(root.get("author"), Some(&PropertyValue::Single(EntryValue::reference("#max"))));

        let max = g.get(&EntityId::from("#max")).unwrap();
        assert_eq!(max.get("name"), Some(&PropertyValue::Single(EntryValue::text("Max"))));

        let funder_ref = root.get("funder").unwrap().entries()[0].as_reference().unwrap().clone();
        assert!(funder_ref.is_blank_node());
        assert!(g.get(&funder_ref).unwrap().has_type("Organization"));
    }

    #[test]
    fn nested_and_top_level_descriptions_merge() {
        let g = CrateGraph::from_value(&json!({
            "@graph": [
                {"@id": "./", "@type": "Dataset", "author": {"@id": "#max", "@type": "Person", "email": "m@x.org"}},
                {"@id": "#max", "@type": "Person", "name": "Max"}
            ]
        }))
        .unwrap();
        assert_eq!(g.len(), 2);
        let max = g.get(&EntityId::from("#max")).unwrap();
        assert!(max.get("email").is_some());
        assert!(max.get("name").is_some());
    }

    #[test]
    fn one_element_arrays_stay_lists() {
        let g = CrateGraph::from_value(&json!({
            "@graph": [{"@id": "./", "@type": "Dataset", "hasPart": [{"@id": "a"}], "keywords": []}]
        }))
        .unwrap();
        let root = &g.entities[0];
        assert!(matches!(root.get("hasPart"), Some(PropertyValue::List(v)) if v.len() == 1));
        assert!(root.get("keywords").is_none());
    }

    #[test]
    fn serialization_is_deterministic() {
        let g = CrateGraph::new(ContextValue::from("https://w3id.org/ro/crate/1.1/context")).with_entity(
            Entity::new("./", ["Dataset"])
                .with_text("name", "n")
                .with_text("description", "d"),
        );
        let text = g.to_json_string_pretty().unwrap();
        let desc = text.find("description").unwrap();
        let name = text.find("\"name\"").unwrap();
        assert!(desc < name);
        assert_eq!(g.to_json_string_pretty().unwrap(), text);
    }
}
