//! The Featureline coordinator.
//!
//! A stateless control-plane worker that drives declared resources from
//! *created* to *ready*: it watches the job prefix in the KV store, claims
//! unlocked jobs under a distributed lock, validates preconditions against
//! metadata, resolves SQL templates, dispatches runners through a spawner,
//! and reports status back. Multiple coordinators may run concurrently,
//! coordinated only through the store.

pub mod config;
pub mod coordinator;
pub mod handlers;
pub mod retry;
pub mod schedule;
pub mod template;

pub use config::CoordinatorConfig;
pub use coordinator::{enqueue_job, Coordinator};
pub use retry::retry_with_delay;
pub use schedule::enqueue_schedule_job;
