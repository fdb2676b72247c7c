//! `MATERIALIZE`: snapshot a feature's offline resource table and copy it
//! into the online store in chunks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use featureline_core::spawner::{Completion, Runner};
use featureline_core::{ResourceId, Result};
use featureline_providers::ProviderConfig;

use crate::completion::TaskCompletion;
use crate::registry::RunnerFactory;
use crate::runners::copy_records;

/// Records copied per chunk unless the config overrides it.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    pub offline: ProviderConfig,
    pub online: ProviderConfig,
    /// The feature being materialized; also names the online table.
    pub resource: ResourceId,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

pub struct MaterializeRunner {
    config: MaterializeConfig,
    resource: ResourceId,
}

#[async_trait]
impl Runner for MaterializeRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let config = self.config.clone();
        Ok(Box::new(TaskCompletion::spawn(async move {
            let offline = config.offline.resolve_offline()?;
            let online = config.online.resolve_online()?;
            let rows = offline.create_materialization(&config.resource).await?;
            info!(resource = %config.resource, rows, "Materialization snapshot taken");

            let records = offline.get_materialization(&config.resource).await?;
            online
                .ensure_table(&config.resource.name, &config.resource.variant)
                .await?;
            let chunk_size = config.chunk_size.max(1);
            for chunk in records.chunks(chunk_size) {
                copy_records(
                    &online,
                    &config.resource.name,
                    &config.resource.variant,
                    chunk,
                )
                .await?;
            }
            Ok(())
        })))
    }
}

pub fn factory() -> RunnerFactory {
    Arc::new(|config: &[u8], resource: ResourceId| -> Result<Box<dyn Runner>> {
        let config: MaterializeConfig = serde_json::from_slice(config)?;
        Ok(Box::new(MaterializeRunner { config, resource }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use featureline_core::resource::ResourceColumns;
    use featureline_core::ResourceKind;
    use featureline_providers::memory::{offline_instance, online_instance, TableQuoting};
    use featureline_providers::{OfflineStore, OnlineStore, ResourceRecord};
    use serde_json::json;

    #[tokio::test]
    async fn test_copies_feature_rows_online() {
        let offline =
            offline_instance("MEMORY_OFFLINE:materialize-run", TableQuoting::DoubleQuote);
        let online = online_instance("MEMORY_ONLINE:materialize-run", true);

        let rows: Vec<ResourceRecord> = ["a", "b", "c", "d", "e"]
            .iter()
            .enumerate()
            .map(|(i, entity)| ResourceRecord {
                entity: entity.to_string(),
                value: json!(i as i64 + 1),
                ts: Utc::now(),
            })
            .collect();
        offline.create_table("src", rows.clone());

        let feature = ResourceId::new("clicks", "v1", ResourceKind::Feature);
        offline
            .register_resource_table(
                &feature,
                "src",
                &ResourceColumns {
                    entity: "entity".to_string(),
                    value: "value".to_string(),
                    ts: "ts".to_string(),
                },
            )
            .await
            .unwrap();

        let config = MaterializeConfig {
            offline: ProviderConfig {
                name: "warehouse".to_string(),
                provider_type: "MEMORY_OFFLINE".to_string(),
                config: br#"{"instance":"materialize-run"}"#.to_vec(),
            },
            online: ProviderConfig {
                name: "cache".to_string(),
                provider_type: "MEMORY_ONLINE".to_string(),
                config: br#"{"instance":"materialize-run"}"#.to_vec(),
            },
            resource: feature.clone(),
            chunk_size: 2,
        };
        let runner = factory()(&serde_json::to_vec(&config).unwrap(), feature).unwrap();
        runner.run().await.unwrap().wait().await.unwrap();

        for record in &rows {
            let value = online
                .get("clicks", "v1", &record.entity)
                .await
                .unwrap();
            assert_eq!(value, record.value);
        }
    }
}
