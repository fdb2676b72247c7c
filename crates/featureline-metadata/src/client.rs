//! The metadata client trait.

use async_trait::async_trait;

use featureline_core::resource::{
    FeatureVariant, LabelVariant, ProviderEntry, ResourceStatus, SourceVariant,
    TrainingSetVariant,
};
use featureline_core::{NameVariant, ResourceId, Result};

/// A resource definition as submitted to the metadata service.
#[derive(Debug, Clone)]
pub enum ResourceDef {
    Source(SourceVariant),
    Feature(FeatureVariant),
    Label(LabelVariant),
    TrainingSet(TrainingSetVariant),
    Provider(ProviderEntry),
}

/// Client handle to the metadata service.
///
/// The client is long-lived and shared across all handler tasks; every
/// method is safe to call concurrently. `close` is an explicit lifecycle
/// event driven by the coordinator's shutdown.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn get_source_variant(&self, id: &NameVariant) -> Result<SourceVariant>;

    async fn get_feature_variant(&self, id: &NameVariant) -> Result<FeatureVariant>;

    async fn get_label_variant(&self, id: &NameVariant) -> Result<LabelVariant>;

    async fn get_training_set_variant(&self, id: &NameVariant) -> Result<TrainingSetVariant>;

    async fn get_provider(&self, name: &str) -> Result<ProviderEntry>;

    /// Write a lifecycle status back onto a resource, with an optional
    /// free-text reason (used for failures).
    async fn set_status(&self, id: &ResourceId, status: ResourceStatus, reason: &str)
        -> Result<()>;

    async fn close(&self) -> Result<()>;
}
