//! Metadata service contract for the Featureline coordinator.
//!
//! The metadata service is a remote store of resource definitions and their
//! statuses; the coordinator reads definitions and writes statuses back.
//! Only the client contract lives here, plus an in-memory implementation
//! used by tests and the single-process deployment mode.

pub mod client;
pub mod memory;

pub use client::{MetadataClient, ResourceDef};
pub use memory::InMemoryMetadata;
