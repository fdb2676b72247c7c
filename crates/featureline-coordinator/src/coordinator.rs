//! The coordinator loop: discovery, claiming, dispatch, and the failure
//! policy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use featureline_core::ids::{lock_key, JOB_PREFIX, SCHEDULE_JOB_PREFIX};
use featureline_core::jobs::JobRecord;
use featureline_core::resource::ResourceStatus;
use featureline_core::spawner::JobSpawner;
use featureline_core::{Error, ResourceId, Result};
use featureline_metadata::MetadataClient;
use featureline_store::{JobStore, LockSession, StoreError, WatchEvent};

use crate::config::CoordinatorConfig;
use crate::retry::retry_with_delay;

/// How the scheduler treats a handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureClass {
    /// Mark failed, delete the job.
    Permanent,
    /// Leave the job; retried indefinitely until the upstream is ready.
    Upstream,
    /// Leave the job; escalates to permanent once attempts are exhausted.
    Runner,
}

pub(crate) fn classify(err: &Error) -> FailureClass {
    match err {
        Error::UpstreamNotReady(_) => FailureClass::Upstream,
        Error::Transient(inner) => match classify(inner) {
            FailureClass::Permanent => FailureClass::Runner,
            class => class,
        },
        Error::RunnerFailure(_) | Error::Store(_) | Error::Metadata(_) => FailureClass::Runner,
        _ => FailureClass::Permanent,
    }
}

/// Enqueue a one-shot job for a resource. A job key already present is
/// benign: at most one job per resource exists at a time.
pub async fn enqueue_job(store: &dyn JobStore, id: &ResourceId) -> Result<()> {
    let record = JobRecord::new();
    match store
        .put_if_absent(&id.job_key(), &serde_json::to_vec(&record)?)
        .await
    {
        Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// A stateless coordinator worker. Cheap to clone; clones share the same
/// collaborators and job channel.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) metadata: Arc<dyn MetadataClient>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) spawner: Arc<dyn JobSpawner>,
    pub(crate) config: CoordinatorConfig,
    jobs_tx: mpsc::UnboundedSender<String>,
    jobs_rx: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    active_schedules: Arc<Mutex<HashSet<String>>>,
}

impl Coordinator {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        store: Arc<dyn JobStore>,
        spawner: Arc<dyn JobSpawner>,
        config: CoordinatorConfig,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        Self {
            metadata,
            store,
            spawner,
            config,
            jobs_tx,
            jobs_rx: Arc::new(tokio::sync::Mutex::new(Some(jobs_rx))),
            active_schedules: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a one-shot job key currently exists for a resource.
    pub async fn has_job(&self, id: &ResourceId) -> Result<bool> {
        match self.store.get(&id.job_key()).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Run the discovery loop until a watch stream ends. Level-triggered:
    /// a startup scan plus a periodic rescan back up the watch streams, so
    /// no single event may be load-bearing.
    pub async fn run(&self) -> Result<()> {
        let mut jobs_rx = self
            .jobs_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Internal("coordinator is already running".to_string()))?;

        info!("Starting coordinator");
        let mut job_watch = self.store.watch_prefix(JOB_PREFIX).await?;
        let mut schedule_watch = self.store.watch_prefix(SCHEDULE_JOB_PREFIX).await?;
        // scan after the watches are up so nothing slips between them
        self.scan_existing().await?;

        let mut rescan = tokio::time::interval(self.config.rescan_interval);
        rescan.tick().await;

        loop {
            tokio::select! {
                Some(key) = jobs_rx.recv() => self.spawn_job_task(key),
                event = job_watch.next() => match event {
                    Some(WatchEvent::Put { key, .. }) => self.spawn_job_task(key),
                    Some(WatchEvent::Delete { .. }) => {}
                    None => {
                        warn!("Job watch stream ended, stopping");
                        return Ok(());
                    }
                },
                event = schedule_watch.next() => match event {
                    Some(WatchEvent::Put { key, .. }) => self.spawn_schedule_task(key),
                    Some(WatchEvent::Delete { .. }) => {}
                    None => {
                        warn!("Schedule watch stream ended, stopping");
                        return Ok(());
                    }
                },
                _ = rescan.tick() => {
                    if let Err(err) = self.scan_existing().await {
                        warn!(error = %err, "Rescan failed");
                    }
                }
            }
        }
    }

    async fn scan_existing(&self) -> Result<()> {
        for (key, _) in self.store.list(JOB_PREFIX).await? {
            self.spawn_job_task(key);
        }
        for (key, _) in self.store.list(SCHEDULE_JOB_PREFIX).await? {
            self.spawn_schedule_task(key);
        }
        Ok(())
    }

    fn spawn_job_task(&self, key: String) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Err(err) = coordinator.execute_job(&key).await {
                warn!(job = %key, error = %err, "Job execution failed");
            }
        });
    }

    fn spawn_schedule_task(&self, key: String) {
        {
            let mut active = self
                .active_schedules
                .lock()
                .expect("schedule set poisoned");
            if !active.insert(key.clone()) {
                return;
            }
        }
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_schedule_loop(&key).await;
            coordinator
                .active_schedules
                .lock()
                .expect("schedule set poisoned")
                .remove(&key);
        });
    }

    /// Claim and execute one job key to completion. Safe to call for a key
    /// another coordinator owns or already finished: both cases are
    /// detected and skipped.
    pub async fn execute_job(&self, job_key: &str) -> Result<()> {
        let Some(id) = ResourceId::from_job_key(job_key) else {
            return Err(Error::InvalidResource(format!(
                "malformed job key: {job_key}"
            )));
        };
        if !id.kind.is_schedulable() {
            warn!(job = job_key, "Dropping job for unschedulable kind");
            self.store.delete(job_key).await.map_err(Error::from)?;
            return Ok(());
        }

        let lock_key = lock_key(job_key);
        let session = match retry_with_delay(
            "acquire job lock",
            self.config.lock_attempts,
            self.config.lock_retry_delay,
            || self.store.lock(&lock_key),
        )
        .await
        {
            Ok(session) => session,
            Err(StoreError::Busy(_)) => {
                debug!(job = job_key, "Job claimed by another coordinator");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        // the previous holder may have completed and deleted the job
        let record: JobRecord = match self.store.get(job_key).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    let _ = session.release().await;
                    return Err(err.into());
                }
            },
            Err(StoreError::NotFound(_)) => {
                debug!(job = job_key, "Job already completed");
                let _ = session.release().await;
                return Ok(());
            }
            Err(err) => {
                let _ = session.release().await;
                return Err(err.into());
            }
        };

        // attempt-scaled backoff on the same key prevents event-cycle spin
        if let Some(not_before) = record.not_before {
            let now = Utc::now();
            if now < not_before {
                let _ = session.release().await;
                let wait = (not_before - now).to_std().unwrap_or_default();
                self.requeue_later(job_key.to_string(), wait);
                return Ok(());
            }
        }

        let deadline = record.deadline_secs.map(Duration::from_secs);
        info!(job = job_key, resource = %id, attempt = record.attempt, "Executing job");
        match self.run_resource_job(&id, deadline).await {
            Ok(()) => {
                self.metadata
                    .set_status(&id, ResourceStatus::Ready, "")
                    .await?;
                self.store.delete(job_key).await.map_err(Error::from)?;
                session.release().await.map_err(Error::from)?;
                info!(job = job_key, resource = %id, "Job complete");
                Ok(())
            }
            Err(err) => self.handle_job_failure(job_key, &id, record, err, session).await,
        }
    }

    async fn handle_job_failure(
        &self,
        job_key: &str,
        id: &ResourceId,
        mut record: JobRecord,
        err: Error,
        session: Box<dyn LockSession>,
    ) -> Result<()> {
        // the artifact already exists, so the job is moot; the resource
        // keeps whatever status it has (a ready resource stays ready)
        if let Error::AlreadyMaterialized(_) = &err {
            warn!(job = job_key, resource = %id, "Destination already materialized, dropping job");
            self.store.delete(job_key).await.map_err(Error::from)?;
            session.release().await.map_err(Error::from)?;
            return Err(err);
        }

        let class = classify(&err);
        let escalated = class == FailureClass::Runner
            && record.attempt + 1 >= self.config.max_job_attempts;

        if class == FailureClass::Permanent || escalated {
            error!(job = job_key, resource = %id, error = %err, "Job failed permanently");
            self.metadata
                .set_status(id, ResourceStatus::Failed, &err.to_string())
                .await?;
            self.store.delete(job_key).await.map_err(Error::from)?;
            session.release().await.map_err(Error::from)?;
            return Err(err);
        }

        record.attempt += 1;
        let delay = self.backoff(record.attempt);
        record.not_before = Some(
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        warn!(job = job_key, resource = %id, attempt = record.attempt, error = %err,
            "Job failed, leaving in place for retry");
        self.store
            .put(job_key, &serde_json::to_vec(&record)?)
            .await
            .map_err(Error::from)?;
        session.release().await.map_err(Error::from)?;
        self.requeue_later(job_key.to_string(), delay);
        Err(err)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .backoff_base
            .saturating_mul(attempt)
            .min(self.config.backoff_cap)
    }

    fn requeue_later(&self, key: String, delay: Duration) {
        let tx = self.jobs_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // nobody listening means the loop is not running; the rescan
            // path picks the job up instead
            let _ = tx.send(key);
        });
    }
}
