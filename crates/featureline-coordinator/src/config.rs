//! Coordinator tuning knobs.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Runner-class failures escalate to permanent at this attempt count.
    pub max_job_attempts: u32,
    /// Attempts to acquire a job lock before conceding it to another
    /// coordinator.
    pub lock_attempts: u32,
    /// Fixed delay between lock acquisition attempts.
    pub lock_retry_delay: Duration,
    /// Requeue delay after a transient failure scales linearly with the
    /// attempt counter, from this base up to `backoff_cap`.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Interval of the level-triggered full rescan of the job prefixes.
    pub rescan_interval: Duration,
    /// Safety net over the metadata service's acyclic guarantee.
    pub max_depth: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_job_attempts: 5,
            lock_attempts: 3,
            lock_retry_delay: Duration::from_millis(250),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            rescan_interval: Duration::from_secs(30),
            max_depth: 24,
        }
    }
}
