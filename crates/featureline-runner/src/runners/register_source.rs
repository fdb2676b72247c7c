//! `REGISTER_SOURCE`: register an external table as a source's primary
//! backing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use featureline_core::spawner::{Completion, Runner};
use featureline_core::{ResourceId, Result};
use featureline_providers::ProviderConfig;

use crate::completion::TaskCompletion;
use crate::registry::RunnerFactory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSourceConfig {
    pub offline: ProviderConfig,
    pub resource: ResourceId,
    /// External table to register. Presence is verified by the provider.
    pub table: String,
}

pub struct RegisterSourceRunner {
    config: RegisterSourceConfig,
    resource: ResourceId,
}

#[async_trait]
impl Runner for RegisterSourceRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let config = self.config.clone();
        Ok(Box::new(TaskCompletion::spawn(async move {
            let offline = config.offline.resolve_offline()?;
            offline
                .register_primary_table(&config.resource, &config.table)
                .await
        })))
    }
}

pub fn factory() -> RunnerFactory {
    Arc::new(|config: &[u8], resource: ResourceId| -> Result<Box<dyn Runner>> {
        let config: RegisterSourceConfig = serde_json::from_slice(config)?;
        Ok(Box::new(RegisterSourceRunner { config, resource }))
    })
}
