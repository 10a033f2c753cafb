//! crategraph: entity graph core for RO-Crate editing
//!
//! Holds an RO-Crate metadata document as a flat map of entities and keeps
//! track of what changed since it was last saved.
//!
//! # Core Concepts
//!
//! - **Context resolver**: maps short terms to IRIs and back for a crate's `@context`
//! - **Entity store**: the live entities plus the baseline they were saved as
//! - **Diffs**: per-entity and per-property change status against the baseline
//! - **Reconciliation**: merging a fresh server copy without losing local edits
//!
//! # Example
//!
//! ```
//! use crategraph::{CrateGraph, EntityId, EntityStore, EntryValue, Diff};
//!
//! let graph = CrateGraph::from_json_str(
//!     r#"{"@context": "https://w3id.org/ro/crate/1.1/context",
//!         "@graph": [{"@id": "./", "@type": "Dataset", "name": "Demo"}]}"#,
//! ).unwrap();
//! let mut store = EntityStore::from_graph(&graph);
//! let root = EntityId::from("./");
//! store.set_property_value(&root, "name", EntryValue::text("Renamed"), None);
//! assert_eq!(store.entity_diff(&root), Diff::Modified);
//! ```

pub mod config;
pub mod context;
pub mod diff;
pub mod editor;
mod graph;
pub mod reconcile;
pub mod storage;

pub use context::{ContextItem, ContextResolver, ContextValue, ResolverOptions, Specification};
pub use diff::Diff;
pub use editor::{CrateEditor, EditorError, EditorResult};
pub use graph::{
    find_metadata_descriptor, find_root_entity_id, is_metadata_descriptor, CrateGraph, Entity, EntityId, EntityMap,
    EntityStore, EntryValue, GraphError, GraphResult, Properties, PropertyValue, ReferenceSite,
    METADATA_DESCRIPTOR_ID, ROOT_ENTITY_ID,
};
pub use reconcile::{compute_server_differences, execute_forced_updates, PropertyForces, ServerDifferences};
pub use storage::{CrateStore, DirectoryStore, MemoryStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
