//! Job-store adapters for the Featureline coordinator.
//!
//! The coordinator keeps its queue in a strongly-consistent watched KV
//! store. [`JobStore`] is the adapter contract; [`EtcdStore`] is the
//! production implementation and [`MemoryStore`] backs tests and the
//! single-process mode. Locking is session-scoped: a [`LockSession`] holds a
//! lease that expires on process death, releasing the lock without cleanup.

pub mod etcd;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// Errors from the job store. `AlreadyExists`, `NotFound`, and `Busy` are
/// distinct so callers can treat them as benign control flow; everything
/// else is a transport fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("lock busy: {0}")]
    Busy(String),

    #[error("store backend: {0}")]
    Backend(String),
}

impl From<StoreError> for featureline_core::Error {
    fn from(err: StoreError) -> Self {
        featureline_core::Error::Store(err.to_string())
    }
}

/// A change observed on a watched prefix.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key } => key,
        }
    }
}

/// A held distributed lock. Dropping the session releases it (immediately
/// for the memory store, via lease expiry for etcd); `release` does so
/// eagerly and is idempotent.
#[async_trait]
pub trait LockSession: Send + Sync {
    async fn release(&self) -> Result<(), StoreError>;
}

/// Namespaced key operations on the watched KV store. All writes are
/// linearizable.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a key only if it does not exist; `AlreadyExists` otherwise.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Delete a key, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    async fn watch_prefix(&self, prefix: &str)
        -> Result<BoxStream<'static, WatchEvent>, StoreError>;

    /// Acquire the session-scoped lock for `key`; `Busy` when another
    /// session holds it.
    async fn lock(&self, key: &str) -> Result<Box<dyn LockSession>, StoreError>;
}
