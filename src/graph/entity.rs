//! Entity representation in the crate graph

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::GraphError;

/// Stable identifier of an entity (`@id`)
///
/// Serializes as a plain string ("./", "#person-1", "data/file.csv", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an EntityId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh local identifier (`#<uuid>`) for a new entity
    pub fn generate() -> Self {
        Self(format!("#{}", Uuid::new_v4()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank node identifiers assigned while flattening nested objects
    pub fn is_blank_node(&self) -> bool {
        self.0.starts_with("_:")
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single value inside a property
///
/// Scalars are kept as canonical strings: numbers as their decimal text,
/// booleans as "true"/"false", dates as ISO 8601. Parsing them back is up
/// to whoever renders the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryValue {
    Text(String),
    /// Pointer to another entity, `{"@id": ...}` on the wire
    Reference(EntityId),
}

impl EntryValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn reference(id: impl Into<EntityId>) -> Self {
        Self::Reference(id.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&EntityId> {
        match self {
            Self::Reference(id) => Some(id),
            Self::Text(_) => None,
        }
    }

    /// Canonicalize a JSON scalar into a text value.
    ///
    /// Returns `None` for `null`, arrays and objects other than `@value`
    /// wrappers; those are handled by the flattener.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Text(n.to_string())),
            Value::Bool(b) => Some(Self::Text(b.to_string())),
            Value::Object(obj) => match obj.get("@value") {
                Some(Value::Object(_)) | Some(Value::Array(_)) | Some(Value::Null) | None => None,
                Some(inner) => Self::from_scalar(inner),
            },
            Value::Null | Value::Array(_) => None,
        }
    }

    /// Parse a value from a flat representation (scalar or `{"@id"}` only)
    pub fn from_flat_value(value: &Value) -> Result<Self, GraphError> {
        if let Some(id) = reference_target(value) {
            return Ok(Self::Reference(EntityId::from_string(id)));
        }
        Self::from_scalar(value)
            .ok_or_else(|| GraphError::InvalidValue(format!("not a flat value: {}", value)))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Reference(id) => {
                let mut obj = Map::new();
                obj.insert("@id".to_string(), Value::String(id.as_str().to_string()));
                Value::Object(obj)
            }
        }
    }
}

/// If `value` is exactly `{"@id": "<string>"}`, return the target id
pub(crate) fn reference_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("@id")?.as_str()
}

impl Serialize for EntryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Reference(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("@id", id.as_str())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for EntryValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_flat_value(&value).map_err(de::Error::custom)
    }
}

/// Value of a named property: one entry or an ordered list of entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Single(EntryValue),
    List(Vec<EntryValue>),
}

impl PropertyValue {
    /// Entries in order, regardless of shape
    pub fn entries(&self) -> &[EntryValue] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::List(vs) => vs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Normalize a list of entries: zero entries is no property at all,
    /// one entry is single-valued.
    pub fn from_entries(mut entries: Vec<EntryValue>) -> Option<Self> {
        match entries.len() {
            0 => None,
            1 => entries.pop().map(Self::Single),
            _ => Some(Self::List(entries)),
        }
    }

    /// Like `from_entries`, but a list stays a list while it has entries
    pub fn from_entries_shaped(entries: Vec<EntryValue>, list: bool) -> Option<Self> {
        if list && !entries.is_empty() {
            return Some(Self::List(entries));
        }
        Self::from_entries(entries)
    }

    pub fn into_entries(self) -> Vec<EntryValue> {
        match self {
            Self::Single(v) => vec![v],
            Self::List(vs) => vs,
        }
    }

    /// Structural equality: references match on `@id` only and list order
    /// is significant. A single value equals a one-element list holding it.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        let (a, b) = (self.entries(), other.entries());
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| entry_eq(x, y))
    }

    pub fn from_flat_value(value: &Value) -> Result<Self, GraphError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(EntryValue::from_flat_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            other => EntryValue::from_flat_value(other).map(Self::Single),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Single(v) => v.to_value(),
            Self::List(vs) => Value::Array(vs.iter().map(EntryValue::to_value).collect()),
        }
    }
}

fn entry_eq(a: &EntryValue, b: &EntryValue) -> bool {
    match (a, b) {
        (EntryValue::Text(x), EntryValue::Text(y)) => x == y,
        (EntryValue::Reference(x), EntryValue::Reference(y)) => x == y,
        _ => false,
    }
}

impl From<EntryValue> for PropertyValue {
    fn from(v: EntryValue) -> Self {
        Self::Single(v)
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(v) => v.serialize(serializer),
            Self::List(vs) => vs.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_flat_value(&value).map_err(de::Error::custom)
    }
}

/// Properties collection, sorted by name for deterministic output
pub type Properties = BTreeMap<String, PropertyValue>;

/// The flat map of a crate: id to shared, copy-on-write entity
pub type EntityMap = HashMap<EntityId, Arc<Entity>>;

/// Types that mark an entity as describing a file or folder
const DATA_ENTITY_TYPES: [&str; 2] = ["File", "Dataset"];

/// One node of the JSON-LD graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Unique identifier (`@id`)
    pub id: EntityId,
    /// Type names (`@type`), at least one for a valid entity
    pub types: Vec<String>,
    /// Every other key of the JSON object
    pub properties: Properties,
}

impl Entity {
    /// Create a new entity with the given id and types
    pub fn new<I, T>(id: impl Into<EntityId>, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            id: id.into(),
            types: types.into_iter().map(Into::into).collect(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property to the entity
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add a text property
    pub fn with_text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_property(key, EntryValue::text(value))
    }

    /// Add a reference property
    pub fn with_reference(self, key: impl Into<String>, target: impl Into<EntityId>) -> Self {
        self.with_property(key, EntryValue::reference(target))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }

    /// Files and folders, as opposed to contextual entities
    pub fn is_data_entity(&self) -> bool {
        DATA_ENTITY_TYPES.iter().any(|t| self.has_type(t))
    }

    /// Every reference held by this entity as `(property, index, target)`
    pub fn references(&self) -> impl Iterator<Item = (&str, usize, &EntityId)> {
        self.properties.iter().flat_map(|(name, value)| {
            value
                .entries()
                .iter()
                .enumerate()
                .filter_map(move |(i, v)| v.as_reference().map(|id| (name.as_str(), i, id)))
        })
    }

    /// Whether any property of this entity points at `target`
    pub fn references_id(&self, target: &EntityId) -> bool {
        self.references().any(|(_, _, id)| id == target)
    }

    /// Serialize `@type` the way RO-Crate writes it: a string for one type
    pub(crate) fn types_value(&self) -> Value {
        match self.types.as_slice() {
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        }
    }

    /// Parse `@type` from either shape
    pub(crate) fn parse_types(value: &Value) -> Result<Vec<String>, GraphError> {
        match value {
            Value::String(s) => Ok(vec![s.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| GraphError::InvalidValue(format!("@type entry is not a string: {}", v)))
                })
                .collect(),
            other => Err(GraphError::InvalidValue(format!("@type is not a string or array: {}", other))),
        }
    }

    /// Build an entity from an already-flat JSON object.
    ///
    /// Nested entities are rejected here; `CrateGraph` flattens them first.
    pub fn from_flat_value(value: &Value) -> Result<Self, GraphError> {
        let obj = value
            .as_object()
            .ok_or_else(|| GraphError::InvalidValue(format!("entity is not an object: {}", value)))?;
        let id = obj
            .get("@id")
            .and_then(Value::as_str)
            .ok_or(GraphError::MissingId)?;
        let types = obj
            .get("@type")
            .ok_or_else(|| GraphError::MissingType(id.to_string()))
            .and_then(Self::parse_types)?;

        let mut properties = BTreeMap::new();
        for (key, raw) in obj {
            if key == "@id" || key == "@type" || is_absent(raw) {
                continue;
            }
            properties.insert(key.clone(), PropertyValue::from_flat_value(raw)?);
        }

        Ok(Self {
            id: EntityId::from_string(id),
            types,
            properties,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@id".to_string(), Value::String(self.id.as_str().to_string()));
        obj.insert("@type".to_string(), self.types_value());
        for (key, value) in &self.properties {
            obj.insert(key.clone(), value.to_value());
        }
        Value::Object(obj)
    }
}

/// `null` and `[]` carry no values and never become properties
fn is_absent(raw: &Value) -> bool {
    raw.is_null() || raw.as_array().is_some_and(Vec::is_empty)
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len() + 2))?;
        map.serialize_entry("@id", &self.id)?;
        match self.types.as_slice() {
            [single] => map.serialize_entry("@type", single)?,
            many => map.serialize_entry("@type", many)?,
        }
        for (key, value) in &self.properties {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_flat_value(&value).map_err(de::Error::custom)
    }
}
