//! JSON-LD `@context` handling
//!
//! `ContextValue` is the raw `@context` of a document. `ContextResolver`
//! turns it into a term ↔ IRI mapping, using bundled RO-Crate context
//! tables (`specs`) instead of fetching context documents.

mod resolver;
pub mod specs;
mod value;

pub use resolver::{ContextResolver, ResolverOptions};
pub use specs::{Specification, RO_CRATE_1_1, RO_CRATE_1_2};
pub use value::{ContextItem, ContextValue};
