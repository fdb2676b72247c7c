//! Runner and spawner traits.
//!
//! A spawner turns a runner kind plus a serialized config into a live
//! [`Runner`]; running it yields a [`Completion`] that resolves when the
//! work finishes. Whether the runner executes in-process or as a container
//! is hidden behind these traits.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::ids::ResourceId;
use crate::{Error, Result};

/// The runner kinds the platform ships. Spawners are keyed by the string
/// form so external configuration can name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum RunnerKind {
    #[display("CREATE_TRAINING_SET")]
    CreateTrainingSet,
    #[display("MATERIALIZE")]
    Materialize,
    #[display("COPY_TO_ONLINE")]
    CopyToOnline,
    #[display("CREATE_TRANSFORMATION")]
    CreateTransformation,
    #[display("REGISTER_SOURCE")]
    RegisterSource,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::CreateTrainingSet => "CREATE_TRAINING_SET",
            RunnerKind::Materialize => "MATERIALIZE",
            RunnerKind::CopyToOnline => "COPY_TO_ONLINE",
            RunnerKind::CreateTransformation => "CREATE_TRANSFORMATION",
            RunnerKind::RegisterSource => "REGISTER_SOURCE",
        }
    }
}

impl std::str::FromStr for RunnerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE_TRAINING_SET" => Ok(RunnerKind::CreateTrainingSet),
            "MATERIALIZE" => Ok(RunnerKind::Materialize),
            "COPY_TO_ONLINE" => Ok(RunnerKind::CopyToOnline),
            "CREATE_TRANSFORMATION" => Ok(RunnerKind::CreateTransformation),
            "REGISTER_SOURCE" => Ok(RunnerKind::RegisterSource),
            other => Err(Error::UnknownRunner(other.to_string())),
        }
    }
}

/// Handle to a running or finished job.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Wait for the job to reach a terminal state. `Ok(())` means success;
    /// any error means the runner did not complete its work.
    async fn wait(&self) -> Result<()>;

    /// Signal the underlying job to stop. Waiters observe a failure.
    async fn cancel(&self) -> Result<()> {
        Ok(())
    }
}

/// A one-shot worker bound to a specific resource.
#[async_trait]
pub trait Runner: Send + Sync {
    /// The resource this runner is materializing.
    fn resource(&self) -> &ResourceId;

    /// Start the work and return a completion handle.
    async fn run(&self) -> Result<Box<dyn Completion>>;
}

/// Factory for runners, selected by kind string.
#[async_trait]
pub trait JobSpawner: Send + Sync {
    /// Produce a runner for `kind` with the given serialized config.
    /// Unrecognized kinds fail with [`Error::UnknownRunner`].
    async fn get_runner(
        &self,
        kind: &str,
        config: &[u8],
        resource: ResourceId,
    ) -> Result<Box<dyn Runner>>;
}
