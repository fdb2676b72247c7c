//! Memory-backed providers.
//!
//! These satisfy the full offline/online contract without an external
//! engine. Instances are process-shared and keyed by name so that a runner
//! resolving the same serialized config as the coordinator lands on the same
//! store, the way separate connections land on the same warehouse.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

use featureline_core::resource::ResourceColumns;
use featureline_core::{Error, ResourceId, Result};

use crate::offline::{OfflineStore, ResourceRecord, TrainingSetRow, TrainingSetSpec};
use crate::online::OnlineStore;
use crate::{
    primary_table_name, quote_ident, resource_table_name, transformation_table_name, SourceMapping,
};

/// How an offline store quotes table references in resolved SQL.
#[derive(Debug, Clone)]
pub enum TableQuoting {
    /// Generic warehouse: `"table"`.
    DoubleQuote,
    /// BigQuery-style: a backtick-quoted fully-qualified path,
    /// `` `project.dataset.table` ``.
    BigQuery { project: String, dataset: String },
}

#[derive(Default)]
struct OfflineState {
    /// Warehouse tables by name: seeded externals, registered primaries,
    /// and transformation outputs.
    tables: HashMap<String, Vec<ResourceRecord>>,
    /// Feature/label resource tables.
    resources: HashMap<ResourceId, Vec<ResourceRecord>>,
    /// Resolved query of each transformation run.
    transformations: HashMap<ResourceId, String>,
    materializations: HashMap<ResourceId, Vec<ResourceRecord>>,
    training_sets: HashMap<ResourceId, Vec<TrainingSetRow>>,
}

/// In-memory offline warehouse.
pub struct MemoryOfflineStore {
    quoting: TableQuoting,
    state: Mutex<OfflineState>,
}

impl MemoryOfflineStore {
    pub fn new(quoting: TableQuoting) -> Self {
        Self {
            quoting,
            state: Mutex::new(OfflineState::default()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, OfflineState> {
        // a poisoned mutex means a panicked test thread; propagating the
        // panic is the right call
        self.state.lock().expect("offline store state poisoned")
    }

    /// Seed an external warehouse table. Test and bootstrap entry point.
    pub fn create_table(&self, name: &str, rows: Vec<ResourceRecord>) {
        self.lock_state().tables.insert(name.to_string(), rows);
    }

    /// The resolved query recorded by the last transformation run for `id`.
    pub fn transformation_query(&self, id: &ResourceId) -> Option<String> {
        self.lock_state().transformations.get(id).cloned()
    }

    pub fn table_rows(&self, name: &str) -> Option<Vec<ResourceRecord>> {
        self.lock_state().tables.get(name).cloned()
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    fn qualified_table(&self, table: &str) -> String {
        match &self.quoting {
            TableQuoting::DoubleQuote => quote_ident(table),
            TableQuoting::BigQuery { project, dataset } => {
                format!("`{project}.{dataset}.{table}`")
            }
        }
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.lock_state().tables.contains_key(table))
    }

    async fn register_primary_table(&self, id: &ResourceId, source_table: &str) -> Result<()> {
        let mut state = self.lock_state();
        let rows = state
            .tables
            .get(source_table)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(source_table.to_string()))?;
        state.tables.insert(primary_table_name(id), rows);
        Ok(())
    }

    async fn register_resource_table(
        &self,
        id: &ResourceId,
        source_table: &str,
        _columns: &ResourceColumns,
    ) -> Result<()> {
        // rows here are already (entity, value, ts) shaped; the column
        // mapping matters for SQL-backed stores only
        let mut state = self.lock_state();
        let rows = state
            .tables
            .get(source_table)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(source_table.to_string()))?;
        state.resources.insert(id.clone(), rows);
        Ok(())
    }

    async fn resource_table(&self, id: &ResourceId) -> Result<Vec<ResourceRecord>> {
        self.lock_state()
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(resource_table_name(id)))
    }

    async fn create_transformation(
        &self,
        id: &ResourceId,
        query: &str,
        sources: &[SourceMapping],
    ) -> Result<()> {
        let mut state = self.lock_state();
        let rows = match sources.first() {
            Some(mapping) => state
                .tables
                .get(&mapping.source)
                .cloned()
                .ok_or_else(|| Error::UpstreamMissing(mapping.source.clone()))?,
            None => Vec::new(),
        };
        state.transformations.insert(id.clone(), query.to_string());
        state.tables.insert(transformation_table_name(id), rows);
        Ok(())
    }

    async fn create_materialization(&self, id: &ResourceId) -> Result<u64> {
        let mut state = self.lock_state();
        let rows = state
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(resource_table_name(id)))?;
        let count = rows.len() as u64;
        state.materializations.insert(id.clone(), rows);
        Ok(count)
    }

    async fn get_materialization(&self, id: &ResourceId) -> Result<Vec<ResourceRecord>> {
        self.lock_state()
            .materializations
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(format!("materialization of {id}")))
    }

    async fn training_set_exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.lock_state().training_sets.contains_key(id))
    }

    async fn create_training_set(&self, spec: &TrainingSetSpec) -> Result<()> {
        let mut state = self.lock_state();
        if state.training_sets.contains_key(&spec.resource) {
            return Err(Error::AlreadyMaterialized(spec.resource.clone()));
        }
        let label_rows = state
            .resources
            .get(&spec.label)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(resource_table_name(&spec.label)))?;
        let mut feature_rows = Vec::with_capacity(spec.features.len());
        for feature in &spec.features {
            let rows = state
                .resources
                .get(feature)
                .cloned()
                .ok_or_else(|| Error::UpstreamMissing(resource_table_name(feature)))?;
            feature_rows.push(rows);
        }
        let joined = label_rows
            .iter()
            .map(|label_row| TrainingSetRow {
                entity: label_row.entity.clone(),
                features: feature_rows
                    .iter()
                    .map(|rows| {
                        rows.iter()
                            .find(|r| r.entity == label_row.entity)
                            .map(|r| r.value.clone())
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
                label: label_row.value.clone(),
            })
            .collect();
        state.training_sets.insert(spec.resource.clone(), joined);
        Ok(())
    }

    async fn get_training_set(&self, id: &ResourceId) -> Result<Vec<TrainingSetRow>> {
        self.lock_state()
            .training_sets
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(format!("training set {id}")))
    }
}

/// In-memory online key-value store.
pub struct MemoryOnlineStore {
    supports_feature_tables: bool,
    tables: Mutex<HashMap<(String, String), HashMap<String, Value>>>,
}

impl MemoryOnlineStore {
    pub fn new(supports_feature_tables: bool) -> Self {
        Self {
            supports_feature_tables,
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn lock_tables(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, String), HashMap<String, Value>>> {
        self.tables.lock().expect("online store state poisoned")
    }

    pub fn has_table(&self, name: &str, variant: &str) -> bool {
        self.lock_tables()
            .contains_key(&(name.to_string(), variant.to_string()))
    }
}

#[async_trait]
impl OnlineStore for MemoryOnlineStore {
    fn supports_feature_tables(&self) -> bool {
        self.supports_feature_tables
    }

    async fn ensure_table(&self, name: &str, variant: &str) -> Result<()> {
        self.lock_tables()
            .entry((name.to_string(), variant.to_string()))
            .or_default();
        Ok(())
    }

    async fn set(&self, name: &str, variant: &str, entity: &str, value: Value) -> Result<()> {
        let mut tables = self.lock_tables();
        let table = tables
            .get_mut(&(name.to_string(), variant.to_string()))
            .ok_or_else(|| Error::UpstreamMissing(format!("online table {name}.{variant}")))?;
        table.insert(entity.to_string(), value);
        Ok(())
    }

    async fn get(&self, name: &str, variant: &str, entity: &str) -> Result<Value> {
        let tables = self.lock_tables();
        let table = tables
            .get(&(name.to_string(), variant.to_string()))
            .ok_or_else(|| Error::UpstreamMissing(format!("online table {name}.{variant}")))?;
        table
            .get(entity)
            .cloned()
            .ok_or_else(|| Error::UpstreamMissing(format!("entity {entity} in {name}.{variant}")))
    }
}

type OfflineInstances = Mutex<HashMap<String, Arc<MemoryOfflineStore>>>;
type OnlineInstances = Mutex<HashMap<String, Arc<MemoryOnlineStore>>>;

static OFFLINE_INSTANCES: OnceLock<OfflineInstances> = OnceLock::new();
static ONLINE_INSTANCES: OnceLock<OnlineInstances> = OnceLock::new();

/// The process-shared offline instance for `key`, created with `quoting` on
/// first reference.
pub fn offline_instance(key: &str, quoting: TableQuoting) -> Arc<MemoryOfflineStore> {
    let instances = OFFLINE_INSTANCES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = instances.lock().expect("offline instance registry poisoned");
    Arc::clone(
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(MemoryOfflineStore::new(quoting))),
    )
}

/// The process-shared online instance for `key`.
pub fn online_instance(key: &str, supports_feature_tables: bool) -> Arc<MemoryOnlineStore> {
    let instances = ONLINE_INSTANCES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = instances.lock().expect("online instance registry poisoned");
    Arc::clone(
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(MemoryOnlineStore::new(supports_feature_tables))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use featureline_core::ResourceKind;
    use serde_json::json;

    fn records() -> Vec<ResourceRecord> {
        ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, entity)| ResourceRecord {
                entity: entity.to_string(),
                value: json!(i as i64 + 1),
                ts: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_register_primary_table_requires_source() {
        let store = MemoryOfflineStore::new(TableQuoting::DoubleQuote);
        let id = ResourceId::new("s", "", ResourceKind::Source);
        let err = store.register_primary_table(&id, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamMissing(_)));

        store.create_table("orders", records());
        store.register_primary_table(&id, "orders").await.unwrap();
        assert!(store
            .table_exists(&primary_table_name(&id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_training_set_joins_on_entity() {
        let store = MemoryOfflineStore::new(TableQuoting::DoubleQuote);
        let feature = ResourceId::new("f", "", ResourceKind::Feature);
        let label = ResourceId::new("l", "", ResourceKind::Label);
        let ts = ResourceId::new("t", "", ResourceKind::TrainingSet);
        store.create_table("src", records());
        let columns = ResourceColumns {
            entity: "entity".into(),
            value: "value".into(),
            ts: "ts".into(),
        };
        store
            .register_resource_table(&feature, "src", &columns)
            .await
            .unwrap();
        store
            .register_resource_table(&label, "src", &columns)
            .await
            .unwrap();
        let spec = TrainingSetSpec {
            resource: ts.clone(),
            label,
            features: vec![feature],
        };
        store.create_training_set(&spec).await.unwrap();
        let rows = store.get_training_set(&ts).await.unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.features.len(), 1);
            assert_eq!(row.features[0], row.label);
        }

        let err = store.create_training_set(&spec).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyMaterialized(_)));
    }

    #[tokio::test]
    async fn test_quoting_styles() {
        let generic = MemoryOfflineStore::new(TableQuoting::DoubleQuote);
        assert_eq!(generic.qualified_table("t"), "\"t\"");

        let bq = MemoryOfflineStore::new(TableQuoting::BigQuery {
            project: "p".into(),
            dataset: "d".into(),
        });
        assert_eq!(bq.qualified_table("t"), "`p.d.t`");
    }

    #[tokio::test]
    async fn test_online_store_round_trip() {
        let store = MemoryOnlineStore::new(true);
        store.ensure_table("f", "v").await.unwrap();
        store.set("f", "v", "a", json!(10)).await.unwrap();
        assert_eq!(store.get("f", "v", "a").await.unwrap(), json!(10));
        let err = store.get("f", "v", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamMissing(_)));
    }
}
