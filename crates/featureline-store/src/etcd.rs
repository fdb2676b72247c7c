//! etcd-backed job store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, Event, EventType, GetOptions, PutOptions, Txn, TxnOp,
    WatchOptions,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{JobStore, LockSession, StoreError, WatchEvent};

/// Seconds a lock lease lives without a keep-alive.
const LOCK_LEASE_TTL: i64 = 10;

fn backend(err: etcd_client::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn convert_event(event: &Event) -> Option<WatchEvent> {
    let kv = event.kv()?;
    let key = String::from_utf8_lossy(kv.key()).into_owned();
    match event.event_type() {
        EventType::Put => Some(WatchEvent::Put {
            key,
            value: kv.value().to_vec(),
        }),
        EventType::Delete => Some(WatchEvent::Delete { key }),
    }
}

/// A [`JobStore`] backed by an etcd cluster.
///
/// Writes go through transactions for linearizable compare-and-put; locks
/// are sentinels bound to a lease kept alive from a background task, so a
/// dead coordinator's locks vanish when its leases expire.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect(endpoints: Vec<String>) -> Result<Self, StoreError> {
        let client = Client::connect(endpoints, None).await.map_err(backend)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobStore for EtcdStore {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let txn = Txn::new()
            .when(vec![Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, value, None)]);
        let resp = client.txn(txn).await.map_err(backend)?;
        if resp.succeeded() {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(key.to_string()))
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.put(key, value, None).await.map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await.map_err(backend)?;
        match resp.kvs().first() {
            Some(kv) => Ok(kv.value().to_vec()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut client = self.client.clone();
        let resp = client.delete(key, None).await.map_err(backend)?;
        Ok(resp.deleted() > 0)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(backend)?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, StoreError> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(backend)?;
        // the watcher handle must outlive the stream or etcd cancels it
        let events = futures::stream::unfold((watcher, stream), |(watcher, mut stream)| async {
            match stream.message().await {
                Ok(Some(resp)) => {
                    let batch: Vec<WatchEvent> =
                        resp.events().iter().filter_map(convert_event).collect();
                    Some((futures::stream::iter(batch), (watcher, stream)))
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(error = %err, "Watch stream failed");
                    None
                }
            }
        })
        .flatten();
        Ok(events.boxed())
    }

    async fn lock(&self, key: &str) -> Result<Box<dyn LockSession>, StoreError> {
        let mut client = self.client.clone();
        let lease = client
            .lease_grant(LOCK_LEASE_TTL, None)
            .await
            .map_err(backend)?;
        let lease_id = lease.id();
        let session = Uuid::new_v4();

        let txn = Txn::new()
            .when(vec![Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(
                key,
                session.to_string(),
                Some(PutOptions::new().with_lease(lease_id)),
            )]);
        let resp = client.txn(txn).await.map_err(backend)?;
        if !resp.succeeded() {
            let _ = client.lease_revoke(lease_id).await;
            return Err(StoreError::Busy(key.to_string()));
        }

        let (mut keeper, mut responses) =
            client.lease_keep_alive(lease_id).await.map_err(backend)?;
        let keepalive = tokio::spawn(async move {
            let interval = Duration::from_secs((LOCK_LEASE_TTL as u64 / 3).max(1));
            loop {
                tokio::time::sleep(interval).await;
                if keeper.keep_alive().await.is_err() {
                    break;
                }
                match responses.message().await {
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
            debug!(lease = lease_id, "Lock keep-alive stopped");
        });

        Ok(Box::new(EtcdLockSession {
            client: self.client.clone(),
            key: key.to_string(),
            lease_id,
            keepalive,
            released: AtomicBool::new(false),
        }))
    }
}

struct EtcdLockSession {
    client: Client,
    key: String,
    lease_id: i64,
    keepalive: JoinHandle<()>,
    released: AtomicBool,
}

#[async_trait]
impl LockSession for EtcdLockSession {
    async fn release(&self) -> Result<(), StoreError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.keepalive.abort();
        let mut client = self.client.clone();
        client.delete(self.key.as_str(), None).await.map_err(backend)?;
        client.lease_revoke(self.lease_id).await.map_err(backend)?;
        Ok(())
    }
}

impl Drop for EtcdLockSession {
    fn drop(&mut self) {
        // without an explicit release the lease simply expires
        self.keepalive.abort();
    }
}
