//! Crate fixtures
//!
//! Builds small but realistic RO-Crate documents: a metadata descriptor,
//! a root dataset, and whatever parts and people a test adds.

use crategraph::{ContextValue, CrateGraph, Entity, EntityId, EntryValue, MemoryStore, PropertyValue};

/// Builder for crate documents with a proper descriptor and root
#[derive(Debug, Clone)]
pub struct CrateBuilder {
    context: ContextValue,
    root: Entity,
    others: Vec<Entity>,
}

impl CrateBuilder {
    /// RO-Crate 1.1 crate whose root dataset is named `name`
    pub fn new(name: &str) -> Self {
        Self {
            context: ContextValue::from("https://w3id.org/ro/crate/1.1/context"),
            root: Entity::new("./", ["Dataset"]).with_text("name", name),
            others: Vec::new(),
        }
    }

    pub fn context(mut self, context: ContextValue) -> Self {
        self.context = context;
        self
    }

    /// Add a file and list it in the root's `hasPart`
    pub fn file(mut self, id: &str, encoding: &str) -> Self {
        self.link_root("hasPart", id);
        self.others
            .push(Entity::new(id, ["File"]).with_text("encodingFormat", encoding));
        self
    }

    /// Add a person and list them as an author of the root
    pub fn author(mut self, id: &str, name: &str) -> Self {
        self.link_root("author", id);
        self.others.push(person(id, name));
        self
    }

    /// Add an entity without linking it
    pub fn entity(mut self, entity: Entity) -> Self {
        self.others.push(entity);
        self
    }

    fn link_root(&mut self, property: &str, id: &str) {
        let mut entries = self
            .root
            .properties
            .remove(property)
            .map(PropertyValue::into_entries)
            .unwrap_or_default();
        entries.push(EntryValue::reference(id));
        self.root.properties.insert(property.to_string(), PropertyValue::List(entries));
    }

    pub fn build(self) -> CrateGraph {
        let descriptor = Entity::new("ro-crate-metadata.json", ["CreativeWork"])
            .with_reference("conformsTo", "https://w3id.org/ro/crate/1.1")
            .with_reference("about", "./");
        let mut graph = CrateGraph::new(self.context).with_entity(descriptor).with_entity(self.root);
        graph.entities.extend(self.others);
        graph
    }
}

pub fn person(id: &str, name: &str) -> Entity {
    Entity::new(id, ["Person"]).with_text("name", name)
}

/// Root dataset with one CSV file and one author
pub fn dataset_crate() -> CrateGraph {
    CrateBuilder::new("Survey results")
        .file("data.csv", "text/csv")
        .author("#max", "Max Mustermann")
        .build()
}

/// A memory store holding `graph` under `crate_id`
pub fn seeded_store(crate_id: &str, graph: CrateGraph) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_crate(crate_id, graph);
    store
}

pub fn id(s: &str) -> EntityId {
    EntityId::from(s)
}
