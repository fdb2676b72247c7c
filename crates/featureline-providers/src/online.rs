//! Online store capability trait.

use async_trait::async_trait;
use serde_json::Value;

use featureline_core::Result;

/// An online key-value store holding per-entity feature values.
#[async_trait]
pub trait OnlineStore: Send + Sync {
    /// Whether this store can hold per-feature tables at all. Feature
    /// materialization requires it.
    fn supports_feature_tables(&self) -> bool;

    /// Ensure the table for a feature variant exists.
    async fn ensure_table(&self, name: &str, variant: &str) -> Result<()>;

    async fn set(&self, name: &str, variant: &str, entity: &str, value: Value) -> Result<()>;

    async fn get(&self, name: &str, variant: &str, entity: &str) -> Result<Value>;
}
