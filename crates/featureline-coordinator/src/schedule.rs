//! Recurring jobs.
//!
//! `SCHEDULEJOB__` keys carry a cron expression; the coordinator re-runs
//! the resource workflow on every fire time instead of once. A tick that
//! finds the previous run still holding the job's lock is skipped
//! entirely (skip-if-running); schedule keys are never deleted on success.

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tracing::{debug, error, info, warn};

use featureline_core::ids::lock_key;
use featureline_core::jobs::ScheduleRecord;
use featureline_core::resource::ResourceStatus;
use featureline_core::{Error, ResourceId, Result};
use featureline_store::{JobStore, StoreError};

use crate::coordinator::{classify, Coordinator, FailureClass};

/// Enqueue a recurring job for a resource. The cron expression is
/// validated up front; an existing schedule key is benign.
pub async fn enqueue_schedule_job(
    store: &dyn JobStore,
    id: &ResourceId,
    schedule: &str,
) -> Result<()> {
    Schedule::from_str(schedule)
        .map_err(|err| Error::InvalidResource(format!("invalid schedule {schedule:?}: {err}")))?;
    let record = ScheduleRecord::new(schedule);
    match store
        .put_if_absent(&id.schedule_job_key(), &serde_json::to_vec(&record)?)
        .await
    {
        Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl Coordinator {
    /// Drive one schedule key until it is removed, its cron expression is
    /// rejected, or a run fails permanently.
    pub(crate) async fn run_schedule_loop(&self, key: &str) {
        let id = match ResourceId::from_job_key(key) {
            Some(id) if id.kind.is_schedulable() => id,
            _ => {
                warn!(job = key, "Dropping malformed schedule key");
                let _ = self.store.delete(key).await;
                return;
            }
        };
        let record: ScheduleRecord = match self.store.get(key).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    warn!(job = key, error = %err, "Dropping schedule with malformed record");
                    let _ = self.store.delete(key).await;
                    return;
                }
            },
            Err(_) => return,
        };
        let schedule = match Schedule::from_str(&record.schedule) {
            Ok(schedule) => schedule,
            Err(err) => {
                error!(job = key, schedule = %record.schedule, error = %err,
                    "Invalid cron expression");
                let _ = self
                    .metadata
                    .set_status(
                        &id,
                        ResourceStatus::Failed,
                        &format!("invalid schedule: {err}"),
                    )
                    .await;
                let _ = self.store.delete(key).await;
                return;
            }
        };

        info!(job = key, schedule = %record.schedule, "Starting schedule loop");
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                info!(job = key, "Schedule has no further fire times");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // unscheduled while we slept
            if self.store.get(key).await.is_err() {
                info!(job = key, "Schedule removed");
                return;
            }
            let session = match self.store.lock(&lock_key(key)).await {
                Ok(session) => session,
                Err(StoreError::Busy(_)) => {
                    debug!(job = key, "Previous run still in flight, skipping tick");
                    continue;
                }
                Err(err) => {
                    warn!(job = key, error = %err, "Could not lock schedule job");
                    continue;
                }
            };

            match self.run_resource_job(&id, None).await {
                Ok(()) => {
                    let _ = self
                        .metadata
                        .set_status(&id, ResourceStatus::Ready, "")
                        .await;
                    info!(job = key, resource = %id, "Scheduled run complete");
                }
                // the artifact from the previous run still being there is
                // the steady state for a recurring job
                Err(Error::AlreadyMaterialized(_)) => {
                    debug!(job = key, "Nothing to refresh this tick");
                }
                Err(err) if classify(&err) == FailureClass::Permanent => {
                    error!(job = key, resource = %id, error = %err,
                        "Scheduled run failed permanently, unscheduling");
                    let _ = self
                        .metadata
                        .set_status(&id, ResourceStatus::Failed, &err.to_string())
                        .await;
                    let _ = self.store.delete(key).await;
                    let _ = session.release().await;
                    return;
                }
                Err(err) => {
                    warn!(job = key, resource = %id, error = %err,
                        "Scheduled run failed, waiting for next tick");
                }
            }
            let _ = session.release().await;
        }
    }
}
