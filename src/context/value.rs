//! Raw `@context` values as they appear in a crate document

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One item of an array-valued `@context`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextItem {
    /// Reference to a context document, e.g. `https://w3id.org/ro/crate/1.1/context`
    Reference(String),
    /// Inline term definitions, `@vocab`, `@base`, custom prefixes
    Inline(Map<String, Value>),
}

/// The `@context` of a crate: a URI, an inline object, or an array of both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Reference(String),
    Inline(Map<String, Value>),
    List(Vec<ContextItem>),
}

impl ContextValue {
    pub fn reference(uri: impl Into<String>) -> Self {
        Self::Reference(uri.into())
    }

    /// An empty inline context, used when a document carries none
    pub fn empty() -> Self {
        Self::Inline(Map::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Reference(uri) => uri.is_empty(),
            Self::Inline(map) => map.is_empty(),
            Self::List(items) => items.iter().all(|item| match item {
                ContextItem::Reference(uri) => uri.is_empty(),
                ContextItem::Inline(map) => map.is_empty(),
            }),
        }
    }

    /// Flatten into the ordered list of items the resolver walks
    pub fn items(&self) -> Vec<ContextItem> {
        match self {
            Self::Reference(uri) => vec![ContextItem::Reference(uri.clone())],
            Self::Inline(map) => vec![ContextItem::Inline(map.clone())],
            Self::List(items) => items.clone(),
        }
    }

    /// Every referenced context document URI, in order
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Reference(uri) => vec![uri.as_str()],
            Self::Inline(_) => Vec::new(),
            Self::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    ContextItem::Reference(uri) => Some(uri.as_str()),
                    ContextItem::Inline(_) => None,
                })
                .collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Reference(uri) => Value::String(uri.clone()),
            Self::Inline(map) => Value::Object(map.clone()),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        ContextItem::Reference(uri) => Value::String(uri.clone()),
                        ContextItem::Inline(map) => Value::Object(map.clone()),
                    })
                    .collect(),
            ),
        }
    }
}

impl Default for ContextValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for ContextValue {
    fn from(uri: &str) -> Self {
        Self::Reference(uri.to_string())
    }
}
