//! Runner backends for the Featureline coordinator.
//!
//! Provides spawner implementations for executing materialization jobs:
//! - In-process (tests, single-process deployments)
//! - Kubernetes (production)
//!
//! plus the built-in runner implementations for each runner kind and the
//! registry the in-process spawner selects them from.

pub mod completion;
pub mod in_process;
pub mod kubernetes;
pub mod registry;
pub mod runners;

pub use featureline_core::spawner::{Completion, JobSpawner, Runner, RunnerKind};

pub use in_process::InProcessSpawner;
pub use kubernetes::KubernetesSpawner;
pub use registry::{built_in_registry, RunnerFactory, RunnerRegistry};
