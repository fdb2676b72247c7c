//! Job records stored as the values of job keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value of a one-shot `JOB__` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// How many times a coordinator has attempted this job.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Optional per-run deadline for the spawned runner, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    /// Earliest next execution, set on transient failure to back off the
    /// same key between attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            enqueued_at: Utc::now(),
            deadline_secs: None,
            not_before: None,
        }
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Value of a recurring `SCHEDULEJOB__` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Cron expression governing re-runs.
    pub schedule: String,
    pub attempt: u32,
}

impl ScheduleRecord {
    pub fn new(schedule: impl Into<String>) -> Self {
        Self {
            schedule: schedule.into(),
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_record_wire_shape() {
        let record = JobRecord::new();
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.get("attempt").unwrap(), 0);
        assert!(object.contains_key("enqueued_at"));
        // optional fields are absent from the wire when unset
        assert!(!object.contains_key("deadline_secs"));
        assert!(!object.contains_key("not_before"));
    }

    #[test]
    fn test_job_record_round_trip_with_deadline() {
        let mut record = JobRecord::new();
        record.deadline_secs = Some(120);
        record.attempt = 3;
        let bytes = serde_json::to_vec(&record).unwrap();
        let parsed: JobRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.attempt, 3);
        assert_eq!(parsed.deadline_secs, Some(120));
    }

    #[test]
    fn test_schedule_record_round_trip() {
        let record = ScheduleRecord::new("0 0 * * * *");
        let bytes = serde_json::to_vec(&record).unwrap();
        let parsed: ScheduleRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.schedule, "0 0 * * * *");
        assert_eq!(parsed.attempt, 0);
    }
}
