//! Crates stored as plain directories on disk
//!
//! A crate id is a directory name under the store root; the crate itself is
//! the `ro-crate-metadata.json` inside it.

use super::traits::{apply_entity_write, CrateStore, EntityWrite, StorageError, StorageResult};
use crate::graph::{CrateGraph, Entity, METADATA_DESCRIPTOR_ID};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

pub struct DirectoryStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on metadata files
    write_lock: Mutex<()>,
}

impl DirectoryStore {
    /// Use `root` as the store, creating it if needed
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the metadata file for `crate_id`.
    ///
    /// Ids that would escape the store root are rejected as unknown.
    pub fn metadata_path(&self, crate_id: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(crate_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if crate_id.is_empty() || escapes {
            return Err(StorageError::CrateNotFound(crate_id.to_string()));
        }
        Ok(self.root.join(relative).join(METADATA_DESCRIPTOR_ID))
    }

    fn read(&self, crate_id: &str) -> StorageResult<(PathBuf, CrateGraph)> {
        let path = self.metadata_path(crate_id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::CrateNotFound(crate_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok((path, CrateGraph::from_json_str(&text)?))
    }

    fn write_file(path: &Path, json: &str) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn write(&self, crate_id: &str, entity: &Entity, write: EntityWrite) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let (path, mut graph) = self.read(crate_id)?;
        if !apply_entity_write(&mut graph, entity, write) {
            return Ok(false);
        }
        Self::write_file(&path, &graph.to_json_string_pretty()?)?;
        tracing::debug!(crate_id, entity = %entity.id, ?write, "metadata file rewritten");
        Ok(true)
    }
}

impl CrateStore for DirectoryStore {
    fn get_crate(&self, crate_id: &str) -> StorageResult<CrateGraph> {
        self.read(crate_id).map(|(_, graph)| graph)
    }

    fn save_ro_crate_metadata_json(&self, crate_id: &str, json: &str) -> StorageResult<()> {
        // Reject documents we could not read back
        let graph = CrateGraph::from_json_str(json)?;
        let path = self.metadata_path(crate_id)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        Self::write_file(&path, &graph.to_json_string_pretty()?)
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
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() || !entry.path().join(METADATA_DESCRIPTOR_ID).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
