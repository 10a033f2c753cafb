//! Storage backends for crates
//!
//! Provides persistence for crate documents and entity-level writes.

mod directory;
mod memory;
mod sqlite;
mod traits;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CrateStore, OpenStore, StorageError, StorageResult};
