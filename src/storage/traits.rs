//! Storage trait definitions

use crate::graph::{CrateGraph, Entity, GraphError};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed crate: {0}")]
    Graph(#[from] GraphError),

    #[error("Crate not found: {0}")]
    CrateNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parse error: {0}")]
    DateParse(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Where crates are fetched from and persisted to.
///
/// Entity-level writes return `Ok(false)` when the store refuses the change
/// (creating an id that exists, updating or deleting one that does not).
/// Writing to an unknown crate is `StorageError::CrateNotFound`; other
/// `Err`s mean the backend itself failed.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait CrateStore: Send + Sync {
    /// Fetch a crate as a flat graph
    fn get_crate(&self, crate_id: &str) -> StorageResult<CrateGraph>;

    /// Replace a crate's metadata document with `json`
    fn save_ro_crate_metadata_json(&self, crate_id: &str, json: &str) -> StorageResult<()>;

    /// Add a new entity to a crate
    fn create_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool>;

    /// Overwrite an existing entity
    fn update_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool>;

    /// Remove an entity
    fn delete_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool>;

    /// Ids of every stored crate
    fn list_crates(&self) -> StorageResult<Vec<String>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: CrateStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Apply an entity-level write to a graph held in memory.
///
/// Shared by stores that keep whole documents rather than entity rows.
pub(crate) fn apply_entity_write(graph: &mut CrateGraph, entity: &Entity, write: EntityWrite) -> bool {
    let position = graph.entities.iter().position(|e| e.id == entity.id);
    match (write, position) {
        (EntityWrite::Create, None) => {
            graph.entities.push(entity.clone());
            true
        }
        (EntityWrite::Update, Some(i)) => {
            graph.entities[i] = entity.clone();
            true
        }
        (EntityWrite::Delete, Some(i)) => {
            graph.entities.remove(i);
            true
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntityWrite {
    Create,
    Update,
    Delete,
}
