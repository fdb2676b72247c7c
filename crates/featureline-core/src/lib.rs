//! Core domain types and traits for the Featureline coordinator.
//!
//! This crate contains:
//! - Resource identifiers and job-key encoding
//! - The resource model shared with the metadata service
//! - Job records stored under job keys
//! - Runner and spawner traits
//! - The error taxonomy used across the platform

pub mod error;
pub mod ids;
pub mod jobs;
pub mod resource;
pub mod spawner;

pub use error::{Error, Result};
pub use ids::{NameVariant, ResourceId, ResourceKind};
