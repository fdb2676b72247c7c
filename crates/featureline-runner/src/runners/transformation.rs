//! `CREATE_TRANSFORMATION`: run a resolved SQL transformation and register
//! its output table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use featureline_core::spawner::{Completion, Runner};
use featureline_core::{ResourceId, Result};
use featureline_providers::{ProviderConfig, SourceMapping};

use crate::completion::TaskCompletion;
use crate::registry::RunnerFactory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationConfig {
    pub offline: ProviderConfig,
    pub resource: ResourceId,
    /// Fully resolved query; placeholders are already provider-quoted
    /// table references.
    pub query: String,
    /// Sources in declared order, addressed positionally downstream.
    pub source_mappings: Vec<SourceMapping>,
}

pub struct TransformationRunner {
    config: TransformationConfig,
    resource: ResourceId,
}

#[async_trait]
impl Runner for TransformationRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let config = self.config.clone();
        Ok(Box::new(TaskCompletion::spawn(async move {
            let offline = config.offline.resolve_offline()?;
            info!(resource = %config.resource, sources = config.source_mappings.len(),
                "Running transformation");
            offline
                .create_transformation(&config.resource, &config.query, &config.source_mappings)
                .await
        })))
    }
}

pub fn factory() -> RunnerFactory {
    Arc::new(|config: &[u8], resource: ResourceId| -> Result<Box<dyn Runner>> {
        let config: TransformationConfig = serde_json::from_slice(config)?;
        Ok(Box::new(TransformationRunner { config, resource }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use featureline_core::ResourceKind;
    use featureline_providers::memory::{offline_instance, TableQuoting};
    use featureline_providers::{transformation_table_name, ResourceRecord};
    use serde_json::json;

    #[tokio::test]
    async fn test_records_query_and_output_table() {
        let store = offline_instance("MEMORY_OFFLINE:transform-run", TableQuoting::DoubleQuote);
        store.create_table(
            "base",
            vec![ResourceRecord {
                entity: "a".to_string(),
                value: json!(1),
                ts: Utc::now(),
            }],
        );

        let resource = ResourceId::new("t", "", ResourceKind::Source);
        let config = TransformationConfig {
            offline: ProviderConfig {
                name: "warehouse".to_string(),
                provider_type: "MEMORY_OFFLINE".to_string(),
                config: br#"{"instance":"transform-run"}"#.to_vec(),
            },
            resource: resource.clone(),
            query: "SELECT * FROM \"base\"".to_string(),
            source_mappings: vec![SourceMapping {
                template: "\"base\"".to_string(),
                source: "base".to_string(),
            }],
        };
        let runner = factory()(&serde_json::to_vec(&config).unwrap(), resource.clone()).unwrap();
        runner.run().await.unwrap().wait().await.unwrap();

        assert_eq!(
            store.transformation_query(&resource).as_deref(),
            Some("SELECT * FROM \"base\"")
        );
        let output = store
            .table_rows(&transformation_table_name(&resource))
            .unwrap();
        assert_eq!(output.len(), 1);
    }
}
