//! `CREATE_TRAINING_SET`: join a label with its ordered features and
//! persist the result in the offline store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use featureline_core::spawner::{Completion, Runner};
use featureline_core::{ResourceId, Result};
use featureline_providers::{ProviderConfig, TrainingSetSpec};

use crate::completion::TaskCompletion;
use crate::registry::RunnerFactory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSetConfig {
    pub offline: ProviderConfig,
    pub resource: ResourceId,
    pub label: ResourceId,
    /// Feature order is preserved into the produced rows.
    pub features: Vec<ResourceId>,
}

pub struct TrainingSetRunner {
    config: TrainingSetConfig,
    resource: ResourceId,
}

#[async_trait]
impl Runner for TrainingSetRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let config = self.config.clone();
        Ok(Box::new(TaskCompletion::spawn(async move {
            let offline = config.offline.resolve_offline()?;
            info!(resource = %config.resource, features = config.features.len(),
                "Creating training set");
            offline
                .create_training_set(&TrainingSetSpec {
                    resource: config.resource.clone(),
                    label: config.label.clone(),
                    features: config.features.clone(),
                })
                .await
        })))
    }
}

pub fn factory() -> RunnerFactory {
    Arc::new(|config: &[u8], resource: ResourceId| -> Result<Box<dyn Runner>> {
        let config: TrainingSetConfig = serde_json::from_slice(config)?;
        Ok(Box::new(TrainingSetRunner { config, resource }))
    })
}
