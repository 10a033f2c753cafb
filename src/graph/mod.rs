//! Core graph data structures

mod crate_graph;
mod entity;
mod store;


pub use crate_graph::{CrateGraph, GraphError, GraphResult};
pub use entity::{Entity, EntityId, EntityMap, EntryValue, Properties, PropertyValue};
pub use store::{
    find_metadata_descriptor, find_root_entity_id, is_metadata_descriptor, EntityStore, ReferenceSite,
    METADATA_DESCRIPTOR_ID, ROOT_ENTITY_ID,
};
