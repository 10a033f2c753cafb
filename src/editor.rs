//! CrateEditor: one editing session over one crate
//!
//! Bundles the context resolver, the entity store with its saved baseline,
//! the last state fetched from the server, and the storage backend the
//! crate lives in. Nothing here is global; every session owns its state.

use crate::context::{ContextResolver, ContextValue, ResolverOptions};
use crate::diff::Diff;
use crate::graph::{CrateGraph, Entity, EntityId, EntityStore, GraphError, Properties};
use crate::reconcile::{compute_server_differences, ServerDifferences};
use crate::storage::{CrateStore, StorageError};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by editing sessions
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity id already in use: {0}")]
    DuplicateId(EntityId),

    #[error("Store refused to {operation} entity {entity}")]
    Rejected { operation: &'static str, entity: EntityId },
}

/// Result type for editor operations
pub type EditorResult<T> = Result<T, EditorError>;

/// An editing session
pub struct CrateEditor<S: CrateStore> {
    store: S,
    crate_id: String,
    options: ResolverOptions,
    resolver: ContextResolver,
    entities: EntityStore,
    /// Server state as of the last fetch or save
    last_known: CrateGraph,
}

impl<S: CrateStore> CrateEditor<S> {
    /// Fetch `crate_id` from `store` and start editing it
    pub fn open(store: S, crate_id: impl Into<String>) -> EditorResult<Self> {
        Self::open_with(store, crate_id, ResolverOptions::default())
    }

    pub fn open_with(store: S, crate_id: impl Into<String>, options: ResolverOptions) -> EditorResult<Self> {
        let crate_id = crate_id.into();
        let graph = store.get_crate(&crate_id)?;
        let mut editor = Self {
            store,
            crate_id: String::new(),
            options,
            resolver: ContextResolver::empty(),
            entities: EntityStore::new(),
            last_known: CrateGraph::default(),
        };
        editor.load(crate_id, graph);
        Ok(editor)
    }

    /// Replace the session with `graph`, which also becomes the baseline
    pub fn load(&mut self, crate_id: impl Into<String>, graph: CrateGraph) {
        self.crate_id = crate_id.into();
        self.resolver = ContextResolver::setup_with(&graph.context, self.options);
        self.entities.reset(&graph);
        tracing::info!(crate_id = %self.crate_id, entities = graph.len(), "crate loaded");
        self.last_known = graph;
    }

    // === Accessors ===

    pub fn crate_id(&self) -> &str {
        &self.crate_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    pub fn context(&self) -> &ContextValue {
        self.resolver.source()
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Mutable access for edits; saving goes through the editor
    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn last_known(&self) -> &CrateGraph {
        &self.last_known
    }

    /// Live state as a document
    pub fn to_graph(&self) -> CrateGraph {
        self.entities.to_graph(self.context().clone())
    }

    /// Swap in a new `@context`. Returns false when it is the one already
    /// in effect.
    pub fn set_context(&mut self, context: ContextValue) -> bool {
        if self.resolver.is_same_as(&context) {
            return false;
        }
        self.resolver = ContextResolver::setup_with(&context, self.options);
        true
    }

    /// Add an entity under a freshly generated local id
    pub fn create_entity<I, T>(&mut self, types: I, properties: Properties) -> EntityId
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut id = EntityId::generate();
        while self.entities.contains(&id) {
            id = EntityId::generate();
        }
        self.entities.add_entity(id.clone(), types, properties);
        id
    }

    // === Saving ===

    /// Persist one entity according to its diff and record it as saved.
    ///
    /// Returns the diff that was saved; `Diff::None` means nothing was sent.
    pub fn save_entity(&mut self, id: &EntityId) -> EditorResult<Diff> {
        let diff = self.entities.entity_diff(id);
        let (operation, entity) = match diff {
            Diff::None if self.entities.contains(id) => return Ok(Diff::None),
            Diff::None => return Err(EditorError::EntityNotFound(id.clone())),
            Diff::New => ("create", self.entities.get(id)),
            Diff::Modified => ("update", self.entities.get(id)),
            Diff::Deleted => ("delete", self.entities.baseline_entity(id)),
        };
        let entity = entity.cloned().ok_or_else(|| EditorError::EntityNotFound(id.clone()))?;

        let accepted = match diff {
            Diff::New => self.store.create_entity(&self.crate_id, &entity)?,
            Diff::Modified => self.store.update_entity(&self.crate_id, &entity)?,
            _ => self.store.delete_entity(&self.crate_id, &entity)?,
        };
        if !accepted {
            return Err(EditorError::Rejected {
                operation,
                entity: id.clone(),
            });
        }

        self.entities.mark_saved(id);
        let saved = self.entities.get(id).cloned();
        self.record_server_entity(id, saved);
        tracing::debug!(crate_id = %self.crate_id, entity = %id, %diff, "entity saved");
        Ok(diff)
    }

    /// Persist the whole document and swap the baseline at once
    pub fn save_all(&mut self) -> EditorResult<()> {
        let graph = self.to_graph();
        let json = graph.to_json_string_pretty()?;
        self.store.save_ro_crate_metadata_json(&self.crate_id, &json)?;
        self.entities.mark_all_saved();
        tracing::info!(crate_id = %self.crate_id, entities = graph.len(), "crate saved");
        self.last_known = graph;
        Ok(())
    }

    /// Save the edited version of `id` as a new entity `new_id` and put
    /// `id` back to its saved state
    pub fn save_entity_as(&mut self, id: &EntityId, new_id: impl Into<EntityId>) -> EditorResult<EntityId> {
        let new_id = new_id.into();
        let mut copy = self
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| EditorError::EntityNotFound(id.clone()))?;
        if self.entities.contains(&new_id) {
            return Err(EditorError::DuplicateId(new_id));
        }
        copy.id = new_id.clone();

        if !self.store.create_entity(&self.crate_id, &copy)? {
            return Err(EditorError::Rejected {
                operation: "create",
                entity: new_id,
            });
        }
        self.entities.put_entity(copy.clone());
        self.entities.mark_saved(&new_id);
        self.record_server_entity(&new_id, Some(copy));
        self.entities.revert_entity(id);
        Ok(new_id)
    }

    fn record_server_entity(&mut self, id: &EntityId, entity: Option<Entity>) {
        let position = self.last_known.entities.iter().position(|e| &e.id == id);
        match (position, entity) {
            (Some(i), Some(entity)) => self.last_known.entities[i] = entity,
            (None, Some(entity)) => self.last_known.entities.push(entity),
            (Some(i), None) => {
                self.last_known.entities.remove(i);
            }
            (None, None) => {}
        }
    }

    // === Server round trips ===

    /// Refetch the crate and throw away every local change
    pub fn reload(&mut self) -> EditorResult<()> {
        let graph = self.store.get_crate(&self.crate_id)?;
        let crate_id = std::mem::take(&mut self.crate_id);
        self.load(crate_id, graph);
        Ok(())
    }

    /// Refetch the crate and merge server changes into the session
    pub fn refresh(&mut self) -> EditorResult<ServerDifferences> {
        let graph = self.store.get_crate(&self.crate_id)?;
        Ok(self.merge_server_graph(graph))
    }

    /// Merge a freshly fetched metadata document into the session.
    ///
    /// A document without `@graph` is an error and leaves the session as it was.
    pub fn apply_server_differences(&mut self, fresh: &Value) -> EditorResult<ServerDifferences> {
        let graph = CrateGraph::from_value(fresh)?;
        Ok(self.merge_server_graph(graph))
    }

    fn merge_server_graph(&mut self, fresh: CrateGraph) -> ServerDifferences {
        let differences = compute_server_differences(&fresh, &self.last_known, self.entities.entities());
        let skipped = self.entities.apply_server_differences(&differences);
        if skipped > 0 {
            tracing::warn!(crate_id = %self.crate_id, skipped, "some server updates had no local target");
        }
        if self.set_context(fresh.context.clone()) {
            tracing::info!(crate_id = %self.crate_id, "server changed the crate context");
        }
        tracing::info!(
            crate_id = %self.crate_id,
            entities = differences.force_entities.len(),
            patched = differences.force_properties.len(),
            removed = differences.removed_entities.len(),
            "server changes merged"
        );
        self.last_known = fresh;
        differences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntryValue, PropertyValue};
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {"@id": "ro-crate-metadata.json", "@type": "CreativeWork",
                 "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"}, "about": {"@id": "./"}},
                {"@id": "./", "@type": "Dataset", "name": "Session"},
                {"@id": "#x", "@type": "Thing", "name": "Old"}
            ]
        })
    }

    fn editor() -> CrateEditor<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_crate("c", CrateGraph::from_value(&document()).unwrap());
        CrateEditor::open(store, "c").unwrap()
    }

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    #[test]
    fn open_sets_up_resolver_and_baseline() {
        let editor = editor();
        assert_eq!(editor.resolver().specification_version(), Some("v1.1.3"));
        assert_eq!(editor.entities().root_entity_id(), Some(id("./")));
        assert!(!editor.entities().has_unsaved_changes());
    }

    #[test]
    fn open_unknown_crate_fails() {
        let result = CrateEditor::open(MemoryStore::new(), "missing");
        assert!(matches!(result, Err(EditorError::Storage(StorageError::CrateNotFound(_)))));
    }

    #[test]
    fn save_entity_by_diff() {
        let mut editor = editor();
        editor
            .entities_mut()
            .set_property_value(&id("#x"), "name", EntryValue::text("New"), None);
        assert_eq!(editor.save_entity(&id("#x")).unwrap(), Diff::Modified);
        assert_eq!(editor.entities().entity_diff(&id("#x")), Diff::None);
        assert_eq!(editor.save_entity(&id("#x")).unwrap(), Diff::None);

        let created = editor.create_entity(["Person"], Properties::new());
        assert!(created.as_str().starts_with('#'));
        assert_eq!(editor.save_entity(&created).unwrap(), Diff::New);

        editor.entities_mut().remove_entity(&created);
        assert_eq!(editor.save_entity(&created).unwrap(), Diff::Deleted);
        assert!(matches!(editor.save_entity(&created), Err(EditorError::EntityNotFound(_))));

        let stored = editor.store().get_crate("c").unwrap();
        assert_eq!(
            stored.get(&id("#x")).unwrap().get("name"),
            Some(&PropertyValue::Single(EntryValue::text("New")))
        );
        assert!(stored.get(&created).is_none());
    }

    #[test]
    fn store_refusal_is_reported() {
        let mut editor = editor();
        // Someone else deletes #x behind our back
        let x = editor.entities().get(&id("#x")).unwrap().clone();
        editor.store().delete_entity("c", &x).unwrap();

        editor
            .entities_mut()
            .set_property_value(&id("#x"), "name", EntryValue::text("New"), None);
        assert!(matches!(editor.save_entity(&id("#x")), Err(EditorError::Rejected { .. })));
        assert_eq!(editor.entities().entity_diff(&id("#x")), Diff::Modified);
    }

    #[test]
    fn save_all_swaps_baseline() {
        let mut editor = editor();
        editor.entities_mut().add_entity("#y", ["Thing"], Properties::new());
        editor
            .entities_mut()
            .set_property_value(&id("./"), "name", EntryValue::text("Renamed"), None);
        editor.save_all().unwrap();

        assert!(!editor.entities().has_unsaved_changes());
        assert_eq!(editor.store().get_crate("c").unwrap(), editor.to_graph());
    }

    #[test]
    fn save_entity_as_reverts_original() {
        let mut editor = editor();
        editor
            .entities_mut()
            .set_property_value(&id("#x"), "name", EntryValue::text("Copy"), None);
        let copy = editor.save_entity_as(&id("#x"), "#x-copy").unwrap();

        assert_eq!(editor.entities().entity_diff(&id("#x")), Diff::None);
        assert_eq!(editor.entities().entity_diff(&copy), Diff::None);
        assert_eq!(
            editor.entities().get(&copy).unwrap().get("name"),
            Some(&PropertyValue::Single(EntryValue::text("Copy")))
        );
        assert!(matches!(
            editor.save_entity_as(&id("#x"), "./"),
            Err(EditorError::DuplicateId(_))
        ));
    }

    #[test]
    fn set_context_only_rebuilds_on_change() {
        let mut editor = editor();
        assert!(!editor.set_context(ContextValue::from("https://w3id.org/ro/crate/1.1/context")));
        assert!(editor.set_context(ContextValue::from("https://w3id.org/ro/crate/1.2/context")));
        assert_eq!(editor.resolver().specification_version(), Some("v1.2.0"));
    }

    #[test]
    fn reload_discards_local_edits() {
        let mut editor = editor();
        editor.entities_mut().remove_entity(&id("#x"));
        editor.reload().unwrap();
        assert!(editor.entities().contains(&id("#x")));
        assert!(!editor.entities().has_unsaved_changes());
    }

    #[test]
    fn server_merge_keeps_local_edits() {
        let mut editor = editor();
        editor
            .entities_mut()
            .set_property_value(&id("#x"), "name", EntryValue::text("Local Edit"), None);

        let mut fresh = document();
        fresh["@graph"][2]["description"] = json!("Added by someone else");
        let diffs = editor.apply_server_differences(&fresh).unwrap();
        assert!(!diffs.is_empty());

        let x = editor.entities().get(&id("#x")).unwrap();
        assert_eq!(x.get("name"), Some(&PropertyValue::Single(EntryValue::text("Local Edit"))));
        assert_eq!(
            x.get("description"),
            Some(&PropertyValue::Single(EntryValue::text("Added by someone else")))
        );
        assert_eq!(editor.entities().property_diff(&id("#x"), "description"), Diff::None);
        assert_eq!(editor.entities().property_diff(&id("#x"), "name"), Diff::Modified);
    }

    #[test]
    fn malformed_server_document_leaves_session_untouched() {
        let mut editor = editor();
        let before = editor.to_graph();
        let err = editor.apply_server_differences(&json!({"@context": {}})).unwrap_err();
        assert!(matches!(err, EditorError::Graph(GraphError::MissingGraph)));
        assert_eq!(editor.to_graph(), before);
    }

    #[test]
    fn refresh_picks_up_store_changes() {
        let mut editor = editor();
        editor
            .store()
            .create_entity("c", &Entity::new("#remote", ["Person"]))
            .unwrap();
        let diffs = editor.refresh().unwrap();
        assert_eq!(diffs.force_entities.len(), 1);
        assert_eq!(editor.entities().entity_diff(&id("#remote")), Diff::None);
        assert_eq!(editor.entities().ids_in_order().last(), Some(&id("#remote")));
    }
}
