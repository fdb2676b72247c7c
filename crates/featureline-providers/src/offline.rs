//! Offline store capability trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use featureline_core::resource::ResourceColumns;
use featureline_core::{ResourceId, Result};

use crate::SourceMapping;

/// One row of a resource table: an entity key, a value, and an event time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub entity: String,
    pub value: Value,
    pub ts: DateTime<Utc>,
}

/// One row of a training set: the ordered feature values joined with the
/// label value for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSetRow {
    pub entity: String,
    pub features: Vec<Value>,
    pub label: Value,
}

/// What a training-set runner asks the provider to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSetSpec {
    pub resource: ResourceId,
    pub label: ResourceId,
    /// Positional feature order, preserved into each [`TrainingSetRow`].
    pub features: Vec<ResourceId>,
}

/// An offline warehouse, as seen by the coordinator and its runners.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Quote a table name the way this provider's SQL dialect requires,
    /// fully qualifying it where the provider needs that.
    fn qualified_table(&self, table: &str) -> String;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Register an external table as the primary backing of a source.
    /// Fails with `UpstreamMissing` when the table does not exist.
    async fn register_primary_table(&self, id: &ResourceId, source_table: &str) -> Result<()>;

    /// Create the resource table for a feature or label from its source
    /// backing table, applying the entity/value/ts column mapping.
    async fn register_resource_table(
        &self,
        id: &ResourceId,
        source_table: &str,
        columns: &ResourceColumns,
    ) -> Result<()>;

    async fn resource_table(&self, id: &ResourceId) -> Result<Vec<ResourceRecord>>;

    /// Run a resolved transformation query and register its output table.
    async fn create_transformation(
        &self,
        id: &ResourceId,
        query: &str,
        sources: &[SourceMapping],
    ) -> Result<()>;

    /// Snapshot a feature's resource table into a materialization. Returns
    /// the number of rows captured.
    async fn create_materialization(&self, id: &ResourceId) -> Result<u64>;

    async fn get_materialization(&self, id: &ResourceId) -> Result<Vec<ResourceRecord>>;

    async fn training_set_exists(&self, id: &ResourceId) -> Result<bool>;

    /// Join the label with the ordered features and persist the result.
    async fn create_training_set(&self, spec: &TrainingSetSpec) -> Result<()>;

    async fn get_training_set(&self, id: &ResourceId) -> Result<Vec<TrainingSetRow>>;
}
