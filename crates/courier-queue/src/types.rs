use courier_core::types::JobPayload;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Eligible for leasing once `available_at` has passed.
    Pending,
    /// Claimed by exactly one worker until `lease_expires_at`.
    Leased,
    /// Finished successfully (kept as an archive row).
    Succeeded,
    /// Terminal failure: attempts exhausted or a permanent error.
    Failed,
}

impl JobStatus {
    /// True for states that never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Leased => "leased",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "leased" => Ok(JobStatus::Leased),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// UUID string — primary key, assigned at enqueue time.
    pub id: String,
    /// Tag identifying which executor handles this job.
    pub kind: String,
    /// Opaque key/value payload, immutable once enqueued.
    pub payload: JobPayload,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Execution attempts so far. Never decreases.
    pub attempts: u32,
    /// ISO-8601 instant before which the record may not be leased.
    pub available_at: String,
    /// ISO-8601 enqueue timestamp.
    pub created_at: String,
    /// ISO-8601 timestamp of the last state transition.
    pub updated_at: String,
    /// Set while leased; expiry makes the record reclaimable.
    pub lease_expires_at: Option<String>,
    /// Worker holding the active lease, if any.
    pub leased_by: Option<String>,
    /// Reason recorded by the most recent `fail`, if any.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Leased,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().expect("parse failed");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Leased.is_terminal());
    }
}
