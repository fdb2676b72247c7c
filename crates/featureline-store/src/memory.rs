//! In-memory job store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{JobStore, LockSession, StoreError, WatchEvent};

struct Inner {
    kv: Mutex<BTreeMap<String, Vec<u8>>>,
    sessions: Mutex<HashMap<String, Uuid>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Inner {
    fn publish(&self, event: WatchEvent) {
        // no receivers is fine; watchers come and go
        let _ = self.events.send(event);
    }
}

/// A [`JobStore`] held entirely in process memory. Multiple coordinators in
/// one process sharing a clone observe the same keys, watches, and locks.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                kv: Mutex::new(BTreeMap::new()),
                sessions: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    fn kv(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.inner.kv.lock().expect("kv state poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        {
            let mut kv = self.kv();
            if kv.contains_key(key) {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            kv.insert(key.to_string(), value.to_vec());
        }
        self.inner.publish(WatchEvent::Put {
            key: key.to_string(),
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.kv().insert(key.to_string(), value.to_vec());
        self.inner.publish(WatchEvent::Put {
            key: key.to_string(),
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.kv()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.kv().remove(key).is_some();
        if existed {
            self.inner.publish(WatchEvent::Delete {
                key: key.to_string(),
            });
        }
        Ok(existed)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .kv()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, StoreError> {
        let rx = self.inner.events.subscribe();
        let prefix = prefix.to_string();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let prefix = prefix.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.key().starts_with(&prefix) => {
                            return Some((event, rx));
                        }
                        Ok(_) => continue,
                        // a lagged watcher just misses events; the
                        // coordinator's rescan covers the gap
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn lock(&self, key: &str) -> Result<Box<dyn LockSession>, StoreError> {
        let session = Uuid::new_v4();
        {
            let mut sessions = self.inner.sessions.lock().expect("lock state poisoned");
            if sessions.contains_key(key) {
                return Err(StoreError::Busy(key.to_string()));
            }
            sessions.insert(key.to_string(), session);
        }
        self.kv()
            .insert(key.to_string(), session.to_string().into_bytes());
        self.inner.publish(WatchEvent::Put {
            key: key.to_string(),
            value: session.to_string().into_bytes(),
        });
        Ok(Box::new(MemoryLockSession {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            session,
            released: AtomicBool::new(false),
        }))
    }
}

struct MemoryLockSession {
    inner: Arc<Inner>,
    key: String,
    session: Uuid,
    released: AtomicBool,
}

impl MemoryLockSession {
    fn release_now(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sessions = self.inner.sessions.lock().expect("lock state poisoned");
        if sessions.get(&self.key) == Some(&self.session) {
            sessions.remove(&self.key);
            self.inner.kv.lock().expect("kv state poisoned").remove(&self.key);
            self.inner.publish(WatchEvent::Delete {
                key: self.key.clone(),
            });
        }
    }
}

#[async_trait]
impl LockSession for MemoryLockSession {
    async fn release(&self) -> Result<(), StoreError> {
        self.release_now();
        Ok(())
    }
}

impl Drop for MemoryLockSession {
    fn drop(&mut self) {
        // session loss releases the lock, like a lease expiring
        self.release_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_is_distinct() {
        let store = MemoryStore::new();
        store.put_if_absent("JOB__a", b"1").await.unwrap();
        let err = store.put_if_absent("JOB__a", b"2").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get("JOB__a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.delete("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped() {
        let store = MemoryStore::new();
        store.put_if_absent("JOB__a", b"1").await.unwrap();
        store.put_if_absent("JOB__b", b"2").await.unwrap();
        store.put_if_absent("LOCK__JOB__a", b"x").await.unwrap();
        let jobs = store.list("JOB__").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|(key, _)| key.starts_with("JOB__")));
    }

    #[tokio::test]
    async fn test_watch_sees_put_and_delete() {
        let store = MemoryStore::new();
        let mut watch = store.watch_prefix("JOB__").await.unwrap();
        store.put_if_absent("JOB__a", b"1").await.unwrap();
        store.put_if_absent("OTHER__b", b"2").await.unwrap();
        store.delete("JOB__a").await.unwrap();

        match watch.next().await.unwrap() {
            WatchEvent::Put { key, value } => {
                assert_eq!(key, "JOB__a");
                assert_eq!(value, b"1");
            }
            other => panic!("expected put, got {other:?}"),
        }
        // the OTHER__ put is filtered out
        match watch.next().await.unwrap() {
            WatchEvent::Delete { key } => assert_eq!(key, "JOB__a"),
            other => panic!("expected delete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lock_mutual_exclusion() {
        let store = MemoryStore::new();
        let held = store.lock("LOCK__JOB__a").await.unwrap();
        let err = store.lock("LOCK__JOB__a").await.err().unwrap();
        assert!(matches!(err, StoreError::Busy(_)));

        held.release().await.unwrap();
        // released twice is fine
        held.release().await.unwrap();
        let reacquired = store.lock("LOCK__JOB__a").await.unwrap();
        reacquired.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_session_releases() {
        let store = MemoryStore::new();
        {
            let _held = store.lock("LOCK__JOB__a").await.unwrap();
            assert!(matches!(
                store.lock("LOCK__JOB__a").await.err().unwrap(),
                StoreError::Busy(_)
            ));
        }
        let reacquired = store.lock("LOCK__JOB__a").await.unwrap();
        reacquired.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_release_does_not_unlock_new_owner() {
        let store = MemoryStore::new();
        let first = store.lock("LOCK__JOB__a").await.unwrap();
        first.release().await.unwrap();
        let second = store.lock("LOCK__JOB__a").await.unwrap();
        // releasing the stale session again must not free the new one
        first.release().await.unwrap();
        assert!(matches!(
            store.lock("LOCK__JOB__a").await.err().unwrap(),
            StoreError::Busy(_)
        ));
        second.release().await.unwrap();
    }
}
