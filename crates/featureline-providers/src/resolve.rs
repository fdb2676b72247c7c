//! Resolution from a provider entry's `(type, serialized config)` to a
//! capability object.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use featureline_core::resource::ProviderEntry;
use featureline_core::{Error, Result};

use crate::memory::{offline_instance, online_instance, TableQuoting};
use crate::offline::OfflineStore;
use crate::online::OnlineStore;

/// Provider type tag for the generic memory-backed offline warehouse.
pub const MEMORY_OFFLINE: &str = "MEMORY_OFFLINE";
/// Provider type tag for the memory-backed BigQuery-flavored warehouse.
pub const BIGQUERY_OFFLINE: &str = "BIGQUERY_OFFLINE";
/// Provider type tag for the memory-backed online store.
pub const MEMORY_ONLINE: &str = "MEMORY_ONLINE";

/// A resolved provider, exactly one capability.
pub enum Provider {
    Offline(Arc<dyn OfflineStore>),
    Online(Arc<dyn OnlineStore>),
}

impl Provider {
    /// This provider as an offline store, or `ProviderKindMismatch`.
    pub fn as_offline(&self, name: &str) -> Result<Arc<dyn OfflineStore>> {
        match self {
            Provider::Offline(store) => Ok(Arc::clone(store)),
            Provider::Online(_) => Err(Error::ProviderKindMismatch {
                name: name.to_string(),
                expected: "offline store".to_string(),
                actual: "online store".to_string(),
            }),
        }
    }

    /// This provider as an online store, or `ProviderKindMismatch`.
    pub fn as_online(&self, name: &str) -> Result<Arc<dyn OnlineStore>> {
        match self {
            Provider::Online(store) => Ok(Arc::clone(store)),
            Provider::Offline(_) => Err(Error::ProviderKindMismatch {
                name: name.to_string(),
                expected: "online store".to_string(),
                actual: "offline store".to_string(),
            }),
        }
    }
}

/// A provider reference a runner can carry across a process boundary:
/// the entry's name, driver type tag, and opaque serialized config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub provider_type: String,
    pub config: Vec<u8>,
}

impl ProviderConfig {
    pub fn from_entry(entry: &ProviderEntry) -> Self {
        Self {
            name: entry.name.clone(),
            provider_type: entry.provider_type.clone(),
            config: entry.config.clone(),
        }
    }

    pub fn resolve(&self) -> Result<Provider> {
        get_provider(&self.provider_type, &self.config)
    }

    pub fn resolve_offline(&self) -> Result<Arc<dyn OfflineStore>> {
        self.resolve()?.as_offline(&self.name)
    }

    pub fn resolve_online(&self) -> Result<Arc<dyn OnlineStore>> {
        self.resolve()?.as_online(&self.name)
    }
}

#[derive(Deserialize)]
struct MemoryOfflineConfig {
    instance: String,
}

#[derive(Deserialize)]
struct BigQueryConfig {
    instance: String,
    project: String,
    dataset: String,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct MemoryOnlineConfig {
    instance: String,
    #[serde(default = "default_true")]
    supports_feature_tables: bool,
}

/// Resolve a provider entry into a capability object.
///
/// Real warehouse and cache drivers register additional type tags out of
/// tree; an unrecognized tag fails with `UnsupportedProvider`.
pub fn get_provider(provider_type: &str, config: &[u8]) -> Result<Provider> {
    match provider_type {
        MEMORY_OFFLINE => {
            let config: MemoryOfflineConfig = serde_json::from_slice(config)?;
            Ok(Provider::Offline(offline_instance(
                &format!("{MEMORY_OFFLINE}:{}", config.instance),
                TableQuoting::DoubleQuote,
            )))
        }
        BIGQUERY_OFFLINE => {
            let config: BigQueryConfig = serde_json::from_slice(config)?;
            Ok(Provider::Offline(offline_instance(
                &format!("{BIGQUERY_OFFLINE}:{}", config.instance),
                TableQuoting::BigQuery {
                    project: config.project,
                    dataset: config.dataset,
                },
            )))
        }
        MEMORY_ONLINE => {
            let config: MemoryOnlineConfig = serde_json::from_slice(config)?;
            Ok(Provider::Online(online_instance(
                &format!("{MEMORY_ONLINE}:{}", config.instance),
                config.supports_feature_tables,
            )))
        }
        other => Err(Error::UnsupportedProvider(other.to_string())),
    }
}
