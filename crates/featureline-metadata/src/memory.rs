//! In-memory metadata service double.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use featureline_core::resource::{
    FeatureVariant, LabelVariant, ProviderEntry, ResourceStatus, SourceVariant,
    TrainingSetVariant,
};
use featureline_core::{Error, NameVariant, ResourceId, ResourceKind, Result};

use crate::client::{MetadataClient, ResourceDef};

#[derive(Default)]
struct State {
    sources: HashMap<String, SourceVariant>,
    features: HashMap<String, FeatureVariant>,
    labels: HashMap<String, LabelVariant>,
    training_sets: HashMap<String, TrainingSetVariant>,
    providers: HashMap<String, ProviderEntry>,
    statuses: HashMap<ResourceId, (ResourceStatus, String)>,
    closed: bool,
}

/// Metadata store holding everything in process memory.
///
/// Definitions land with status `Created`; `set_status` overlays the
/// lifecycle state the coordinator reports back.
#[derive(Default)]
pub struct InMemoryMetadata {
    state: RwLock<State>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a batch of definitions, the way the platform's registration
    /// API would.
    pub async fn create_all(&self, defs: Vec<ResourceDef>) -> Result<()> {
        let mut state = self.write_state()?;
        for def in defs {
            match def {
                ResourceDef::Source(source) => {
                    state.sources.insert(
                        NameVariant::new(source.name.clone(), source.variant.clone()).key(),
                        source,
                    );
                }
                ResourceDef::Feature(feature) => {
                    state.features.insert(
                        NameVariant::new(feature.name.clone(), feature.variant.clone()).key(),
                        feature,
                    );
                }
                ResourceDef::Label(label) => {
                    state.labels.insert(
                        NameVariant::new(label.name.clone(), label.variant.clone()).key(),
                        label,
                    );
                }
                ResourceDef::TrainingSet(ts) => {
                    state.training_sets.insert(
                        NameVariant::new(ts.name.clone(), ts.variant.clone()).key(),
                        ts,
                    );
                }
                ResourceDef::Provider(provider) => {
                    state.providers.insert(provider.name.clone(), provider);
                }
            }
        }
        Ok(())
    }

    /// The status and reason last written for a resource, if any.
    pub fn status(&self, id: &ResourceId) -> Option<(ResourceStatus, String)> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.statuses.get(id).cloned())
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Metadata("metadata state poisoned".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Metadata("metadata state poisoned".to_string()))
    }

    fn effective_status(
        state: &State,
        id: &ResourceId,
        defined: ResourceStatus,
    ) -> ResourceStatus {
        state
            .statuses
            .get(id)
            .map(|(status, _)| *status)
            .unwrap_or(defined)
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadata {
    async fn get_source_variant(&self, id: &NameVariant) -> Result<SourceVariant> {
        let state = self.read_state()?;
        let mut source = state.sources.get(&id.key()).cloned().ok_or_else(|| {
            Error::UnknownResource(ResourceId::new(
                id.name.clone(),
                id.variant.clone(),
                ResourceKind::Source,
            ))
        })?;
        source.status = Self::effective_status(&state, &source.resource_id(), source.status);
        Ok(source)
    }

    async fn get_feature_variant(&self, id: &NameVariant) -> Result<FeatureVariant> {
        let state = self.read_state()?;
        let mut feature = state.features.get(&id.key()).cloned().ok_or_else(|| {
            Error::UnknownResource(ResourceId::new(
                id.name.clone(),
                id.variant.clone(),
                ResourceKind::Feature,
            ))
        })?;
        feature.status = Self::effective_status(&state, &feature.resource_id(), feature.status);
        Ok(feature)
    }

    async fn get_label_variant(&self, id: &NameVariant) -> Result<LabelVariant> {
        let state = self.read_state()?;
        let mut label = state.labels.get(&id.key()).cloned().ok_or_else(|| {
            Error::UnknownResource(ResourceId::new(
                id.name.clone(),
                id.variant.clone(),
                ResourceKind::Label,
            ))
        })?;
        label.status = Self::effective_status(&state, &label.resource_id(), label.status);
        Ok(label)
    }

    async fn get_training_set_variant(&self, id: &NameVariant) -> Result<TrainingSetVariant> {
        let state = self.read_state()?;
        let mut ts = state.training_sets.get(&id.key()).cloned().ok_or_else(|| {
            Error::UnknownResource(ResourceId::new(
                id.name.clone(),
                id.variant.clone(),
                ResourceKind::TrainingSet,
            ))
        })?;
        ts.status = Self::effective_status(&state, &ts.resource_id(), ts.status);
        Ok(ts)
    }

    async fn get_provider(&self, name: &str) -> Result<ProviderEntry> {
        let state = self.read_state()?;
        state.providers.get(name).cloned().ok_or_else(|| {
            Error::UnknownResource(ResourceId::new(name, "", ResourceKind::Provider))
        })
    }

    async fn set_status(
        &self,
        id: &ResourceId,
        status: ResourceStatus,
        reason: &str,
    ) -> Result<()> {
        let mut state = self.write_state()?;
        if state.closed {
            return Err(Error::Metadata("client is closed".to_string()));
        }
        state
            .statuses
            .insert(id.clone(), (status, reason.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.write_state()?.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureline_core::resource::SourceDefinition;

    fn source(name: &str) -> SourceVariant {
        SourceVariant {
            name: name.to_string(),
            variant: "".to_string(),
            provider: "warehouse".to_string(),
            definition: SourceDefinition::Primary {
                table: "orders".to_string(),
            },
            schedule: None,
            status: ResourceStatus::Created,
        }
    }

    #[tokio::test]
    async fn test_created_then_status_overlay() {
        let metadata = InMemoryMetadata::new();
        metadata
            .create_all(vec![ResourceDef::Source(source("s"))])
            .await
            .unwrap();

        let nv = NameVariant::new("s", "");
        let fetched = metadata.get_source_variant(&nv).await.unwrap();
        assert_eq!(fetched.status, ResourceStatus::Created);

        let id = fetched.resource_id();
        metadata
            .set_status(&id, ResourceStatus::Ready, "")
            .await
            .unwrap();
        let fetched = metadata.get_source_variant(&nv).await.unwrap();
        assert_eq!(fetched.status, ResourceStatus::Ready);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let metadata = InMemoryMetadata::new();
        let err = metadata
            .get_source_variant(&NameVariant::new("ghost", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));

        let err = metadata.get_provider("ghost").await.unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_empty_variant_addresses_empty_variant_only() {
        let metadata = InMemoryMetadata::new();
        let mut versioned = source("s");
        versioned.variant = "v1".to_string();
        metadata
            .create_all(vec![ResourceDef::Source(versioned)])
            .await
            .unwrap();

        // an empty variant never falls back to "latest"
        let err = metadata
            .get_source_variant(&NameVariant::new("s", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_writes() {
        let metadata = InMemoryMetadata::new();
        metadata.close().await.unwrap();
        let id = ResourceId::new("s", "", ResourceKind::Source);
        let err = metadata
            .set_status(&id, ResourceStatus::Pending, "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
    }
}
