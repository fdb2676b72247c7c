//! `COPY_TO_ONLINE`: copy one chunk of an existing materialization to the
//! online store. Lets a fleet of workers share a large copy.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use featureline_core::spawner::{Completion, Runner};
use featureline_core::{ResourceId, Result};
use featureline_providers::ProviderConfig;

use crate::completion::TaskCompletion;
use crate::registry::RunnerFactory;
use crate::runners::copy_records;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyToOnlineConfig {
    pub offline: ProviderConfig,
    pub online: ProviderConfig,
    /// Feature whose materialization is being copied.
    pub resource: ResourceId,
    pub chunk_index: usize,
    pub chunk_size: usize,
}

pub struct CopyToOnlineRunner {
    config: CopyToOnlineConfig,
    resource: ResourceId,
}

#[async_trait]
impl Runner for CopyToOnlineRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let config = self.config.clone();
        Ok(Box::new(TaskCompletion::spawn(async move {
            let offline = config.offline.resolve_offline()?;
            let online = config.online.resolve_online()?;
            let records = offline.get_materialization(&config.resource).await?;

            let chunk_size = config.chunk_size.max(1);
            let start = config.chunk_index.saturating_mul(chunk_size);
            if start >= records.len() {
                // past the end; an empty chunk is a successful no-op
                return Ok(());
            }
            let end = (start + chunk_size).min(records.len());

            online
                .ensure_table(&config.resource.name, &config.resource.variant)
                .await?;
            copy_records(
                &online,
                &config.resource.name,
                &config.resource.variant,
                &records[start..end],
            )
            .await
        })))
    }
}

pub fn factory() -> RunnerFactory {
    Arc::new(|config: &[u8], resource: ResourceId| -> Result<Box<dyn Runner>> {
        let config: CopyToOnlineConfig = serde_json::from_slice(config)?;
        Ok(Box::new(CopyToOnlineRunner { config, resource }))
    })
}
