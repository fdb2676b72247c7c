//! In-process job spawner.

use std::sync::Arc;

use async_trait::async_trait;

use featureline_core::spawner::{JobSpawner, Runner};
use featureline_core::{ResourceId, Result};

use crate::registry::RunnerRegistry;

/// Spawner that runs jobs inside the coordinator process, selecting runner
/// factories from a scoped registry. Completions resolve as soon as the
/// spawned task finishes.
pub struct InProcessSpawner {
    registry: Arc<RunnerRegistry>,
}

impl InProcessSpawner {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl JobSpawner for InProcessSpawner {
    async fn get_runner(
        &self,
        kind: &str,
        config: &[u8],
        resource: ResourceId,
    ) -> Result<Box<dyn Runner>> {
        self.registry.create(kind, config, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::built_in_registry;
    use featureline_core::{Error, ResourceKind};

    #[tokio::test]
    async fn test_unknown_kind_fails() {
        let spawner = InProcessSpawner::new(Arc::new(built_in_registry().unwrap()));
        let resource = ResourceId::new("r", "", ResourceKind::Source);
        let err = spawner
            .get_runner("ghost_job", b"{}", resource)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownRunner(_)));
    }
}
