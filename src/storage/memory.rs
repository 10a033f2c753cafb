//! In-memory crate store for demos and tests

use super::traits::{apply_entity_write, CrateStore, EntityWrite, StorageError, StorageResult};
use crate::graph::{CrateGraph, Entity};
use dashmap::DashMap;

/// Crates held in a concurrent map, keyed by crate id
#[derive(Debug, Default)]
pub struct MemoryStore {
    crates: DashMap<String, CrateGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            crates: DashMap::new(),
        }
    }

    /// Store a crate under `crate_id`, replacing any previous one
    pub fn insert_crate(&self, crate_id: impl Into<String>, graph: CrateGraph) {
        self.crates.insert(crate_id.into(), graph);
    }

    pub fn remove_crate(&self, crate_id: &str) -> Option<CrateGraph> {
        self.crates.remove(crate_id).map(|(_, g)| g)
    }

    fn write(&self, crate_id: &str, entity: &Entity, write: EntityWrite) -> StorageResult<bool> {
        let mut graph = self
            .crates
            .get_mut(crate_id)
            .ok_or_else(|| StorageError::CrateNotFound(crate_id.to_string()))?;
        Ok(apply_entity_write(&mut graph, entity, write))
    }
}

impl CrateStore for MemoryStore {
    fn get_crate(&self, crate_id: &str) -> StorageResult<CrateGraph> {
        self.crates
            .get(crate_id)
            .map(|r| r.clone())
            .ok_or_else(|| StorageError::CrateNotFound(crate_id.to_string()))
    }

    fn save_ro_crate_metadata_json(&self, crate_id: &str, json: &str) -> StorageResult<()> {
        let graph = CrateGraph::from_json_str(json)?;
        self.crates.insert(crate_id.to_string(), graph);
        Ok(())
    }

    fn create_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        self.write(crate_id, entity, EntityWrite::Create)
    }

    fn update_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        self.write(crate_id, entity, EntityWrite::Update)
    }

    fn delete_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        self.write(crate_id, entity, EntityWrite::Delete)
    }

    fn list_crates(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self.crates.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
