//! Per-resource-kind workflows.
//!
//! Every handler has the same shape: fetch the resource, validate
//! preconditions, resolve dependencies, spawn a runner, wait, and let the
//! caller write the final status. Preconditions and dependency rules
//! differ per kind.

use std::collections::HashMap;
use std::time::Duration;

use tracing::info;

use featureline_core::resource::{ProviderEntry, ResourceStatus, SourceDefinition, SourceVariant};
use featureline_core::spawner::RunnerKind;
use featureline_core::{Error, NameVariant, ResourceId, ResourceKind, Result};
use featureline_providers::{backing_table_name, get_provider, OfflineStore, ProviderConfig};
use featureline_runner::runners::materialize::{MaterializeConfig, DEFAULT_CHUNK_SIZE};
use featureline_runner::runners::register_source::RegisterSourceConfig;
use featureline_runner::runners::training_set::TrainingSetConfig;
use featureline_runner::runners::transformation::TransformationConfig;

use crate::coordinator::Coordinator;
use crate::template;

impl Coordinator {
    /// Dispatch a claimed job to the handler for its resource kind.
    pub(crate) async fn run_resource_job(
        &self,
        id: &ResourceId,
        deadline: Option<Duration>,
    ) -> Result<()> {
        match id.kind {
            ResourceKind::Source => self.run_source_job(id, deadline).await,
            ResourceKind::Feature => self.run_feature_materialize_job(id, deadline).await,
            ResourceKind::Label => self.run_label_register_job(id).await,
            ResourceKind::TrainingSet => self.run_training_set_job(id, deadline).await,
            other => Err(Error::InvalidResource(format!(
                "kind {other} is not schedulable"
            ))),
        }
    }

    /// Source jobs split on the definition tag: primary registration or
    /// SQL transformation.
    async fn run_source_job(&self, id: &ResourceId, deadline: Option<Duration>) -> Result<()> {
        let source = self.metadata.get_source_variant(&id.name_variant()).await?;
        let entry = self.metadata.get_provider(&source.provider).await?;
        let offline = get_provider(&entry.provider_type, &entry.config)?.as_offline(&entry.name)?;
        self.metadata
            .set_status(id, ResourceStatus::Pending, "")
            .await?;

        match source.definition.clone() {
            SourceDefinition::Primary { table } => {
                self.run_primary_table_job(id, &table, &entry, deadline).await
            }
            SourceDefinition::Transformation { query, sources } => {
                self.run_transformation_job(
                    id,
                    &source,
                    &query,
                    &sources,
                    offline.as_ref(),
                    &entry,
                    deadline,
                )
                .await
            }
        }
    }

    async fn run_primary_table_job(
        &self,
        id: &ResourceId,
        table: &str,
        entry: &ProviderEntry,
        deadline: Option<Duration>,
    ) -> Result<()> {
        if table.is_empty() {
            return Err(Error::InvalidResource(format!(
                "source {id} has no primary table name"
            )));
        }
        info!(resource = %id, table, "Registering primary table");
        let config = RegisterSourceConfig {
            offline: ProviderConfig::from_entry(entry),
            resource: id.clone(),
            table: table.to_string(),
        };
        self.spawn_and_wait(
            RunnerKind::RegisterSource,
            &serde_json::to_vec(&config)?,
            id,
            deadline,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_transformation_job(
        &self,
        id: &ResourceId,
        source: &SourceVariant,
        query: &str,
        sources: &[NameVariant],
        offline: &dyn OfflineStore,
        entry: &ProviderEntry,
        deadline: Option<Duration>,
    ) -> Result<()> {
        self.check_dependency_depth(&id.name_variant()).await?;
        let replacements = self
            .map_name_variants_to_tables(sources, Some(&source.provider))
            .await?;
        let resolved = template::template_replace(query, &replacements, offline)?;
        let mappings = template::get_ordered_source_mappings(sources, &replacements)?;
        info!(resource = %id, sources = mappings.len(), "Running SQL transformation");

        let config = TransformationConfig {
            offline: ProviderConfig::from_entry(entry),
            resource: id.clone(),
            query: resolved,
            source_mappings: mappings,
        };
        self.spawn_and_wait(
            RunnerKind::CreateTransformation,
            &serde_json::to_vec(&config)?,
            id,
            deadline,
        )
        .await
    }

    async fn run_feature_materialize_job(
        &self,
        id: &ResourceId,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let feature = self.metadata.get_feature_variant(&id.name_variant()).await?;
        if feature.status == ResourceStatus::Ready {
            return Err(Error::AlreadyMaterialized(id.clone()));
        }
        let source = self.metadata.get_source_variant(&feature.source).await?;
        if source.status != ResourceStatus::Ready {
            return Err(Error::UpstreamNotReady(feature.source.clone()));
        }

        let offline_entry = self.metadata.get_provider(&source.provider).await?;
        let offline = get_provider(&offline_entry.provider_type, &offline_entry.config)?
            .as_offline(&offline_entry.name)?;
        let online_entry = self.metadata.get_provider(&feature.provider).await?;
        let online = get_provider(&online_entry.provider_type, &online_entry.config)?
            .as_online(&online_entry.name)?;
        if !online.supports_feature_tables() {
            return Err(Error::ProviderKindMismatch {
                name: online_entry.name.clone(),
                expected: "online store with feature tables".to_string(),
                actual: "online store without feature tables".to_string(),
            });
        }

        self.metadata
            .set_status(id, ResourceStatus::Pending, "")
            .await?;
        offline
            .register_resource_table(id, &backing_table_name(&source), &feature.columns)
            .await?;
        info!(resource = %id, source = %feature.source, "Materializing feature");

        let config = MaterializeConfig {
            offline: ProviderConfig::from_entry(&offline_entry),
            online: ProviderConfig::from_entry(&online_entry),
            resource: id.clone(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        self.spawn_and_wait(
            RunnerKind::Materialize,
            &serde_json::to_vec(&config)?,
            id,
            deadline,
        )
        .await
    }

    /// Labels register on the offline side only; no runner is spawned.
    async fn run_label_register_job(&self, id: &ResourceId) -> Result<()> {
        let label = self.metadata.get_label_variant(&id.name_variant()).await?;
        if label.status == ResourceStatus::Ready {
            return Err(Error::AlreadyMaterialized(id.clone()));
        }
        let source = self.metadata.get_source_variant(&label.source).await?;
        if source.status != ResourceStatus::Ready {
            return Err(Error::UpstreamNotReady(label.source.clone()));
        }
        let entry = self.metadata.get_provider(&label.provider).await?;
        let offline = get_provider(&entry.provider_type, &entry.config)?.as_offline(&entry.name)?;

        self.metadata
            .set_status(id, ResourceStatus::Pending, "")
            .await?;
        info!(resource = %id, source = %label.source, "Registering label");
        offline
            .register_resource_table(id, &backing_table_name(&source), &label.columns)
            .await
    }

    async fn run_training_set_job(
        &self,
        id: &ResourceId,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let ts = self
            .metadata
            .get_training_set_variant(&id.name_variant())
            .await?;
        let entry = self.metadata.get_provider(&ts.provider).await?;
        let offline = get_provider(&entry.provider_type, &entry.config)?.as_offline(&entry.name)?;
        if offline.training_set_exists(id).await? {
            return Err(Error::AlreadyMaterialized(id.clone()));
        }

        let label = self.metadata.get_label_variant(&ts.label).await?;
        if label.status != ResourceStatus::Ready {
            return Err(Error::UpstreamNotReady(ts.label.clone()));
        }
        if label.provider != ts.provider {
            return Err(Error::InvalidResource(format!(
                "label {} lives on provider {}, training set {id} requires {}",
                ts.label, label.provider, ts.provider
            )));
        }
        let mut features = Vec::with_capacity(ts.features.len());
        for feature_nv in &ts.features {
            let feature = self.metadata.get_feature_variant(feature_nv).await?;
            if feature.status != ResourceStatus::Ready {
                return Err(Error::UpstreamNotReady(feature_nv.clone()));
            }
            features.push(feature.resource_id());
        }

        self.metadata
            .set_status(id, ResourceStatus::Pending, "")
            .await?;
        info!(resource = %id, features = features.len(), "Creating training set");

        let config = TrainingSetConfig {
            offline: ProviderConfig::from_entry(&entry),
            resource: id.clone(),
            label: label.resource_id(),
            features,
        };
        self.spawn_and_wait(
            RunnerKind::CreateTrainingSet,
            &serde_json::to_vec(&config)?,
            id,
            deadline,
        )
        .await
    }

    /// Resolve declared upstreams to their backing tables, failing if any
    /// is missing, not ready, or on the wrong provider.
    pub(crate) async fn map_name_variants_to_tables(
        &self,
        sources: &[NameVariant],
        expected_provider: Option<&str>,
    ) -> Result<HashMap<String, String>> {
        let mut tables = HashMap::with_capacity(sources.len());
        for nv in sources {
            let source = self.metadata.get_source_variant(nv).await?;
            if source.status != ResourceStatus::Ready {
                return Err(Error::UpstreamNotReady(nv.clone()));
            }
            if let Some(expected) = expected_provider {
                if source.provider != expected {
                    return Err(Error::InvalidResource(format!(
                        "upstream {nv} lives on provider {}, transformation requires {expected}",
                        source.provider
                    )));
                }
            }
            tables.insert(nv.key(), backing_table_name(&source));
        }
        Ok(tables)
    }

    /// Walk the transformation dependency graph. The metadata service
    /// guarantees acyclicity; the depth and visit caps are a safety net
    /// against a violated invariant.
    async fn check_dependency_depth(&self, root: &NameVariant) -> Result<()> {
        const MAX_VISITS: usize = 4096;
        let mut stack = vec![(root.clone(), 0u32)];
        let mut visits = 0usize;
        while let Some((nv, depth)) = stack.pop() {
            if depth > self.config.max_depth {
                return Err(Error::InvalidResource(format!(
                    "dependency depth of {nv} exceeds {}",
                    self.config.max_depth
                )));
            }
            visits += 1;
            if visits > MAX_VISITS {
                return Err(Error::InvalidResource(format!(
                    "dependency graph of {root} exceeds {MAX_VISITS} nodes"
                )));
            }
            let source = self.metadata.get_source_variant(&nv).await?;
            if let SourceDefinition::Transformation { sources, .. } = &source.definition {
                for upstream in sources {
                    stack.push((upstream.clone(), depth + 1));
                }
            }
        }
        Ok(())
    }

    /// Spawn a runner, then wait for its completion, bounded by the job's
    /// deadline when one is set. Deadline expiry cancels the runner and
    /// fails transiently so the attempt counter advances.
    async fn spawn_and_wait(
        &self,
        kind: RunnerKind,
        config: &[u8],
        id: &ResourceId,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let runner = self
            .spawner
            .get_runner(kind.as_str(), config, id.clone())
            .await?;
        let completion = runner.run().await?;
        match deadline {
            Some(limit) => match tokio::time::timeout(limit, completion.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = completion.cancel().await;
                    Err(Error::RunnerFailure(format!(
                        "deadline of {}s exceeded",
                        limit.as_secs()
                    ))
                    .transient())
                }
            },
            None => completion.wait().await,
        }
    }
}
