//! Common test utilities for crategraph integration tests
//!
//! Fixture documents and builders shared by the test binaries. Not every
//! binary uses every helper.
#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::{dataset_crate, id, person, seeded_store, CrateBuilder};
