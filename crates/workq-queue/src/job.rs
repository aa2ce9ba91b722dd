//! Job definitions

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Job Identifier
pub type JobId = Uuid;

/// Lifecycle state of a persisted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Persisted, waiting for a worker
    Pending,
    /// Handed to a worker
    Running,
    /// Last attempt failed, another attempt is scheduled
    Retry,
    /// Finished successfully
    Completed,
    /// Permanently failed (fatal error or retries exhausted)
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Retry,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Retry => "RETRY",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Completed and Failed jobs never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Running -> Running` is allowed because a job that was running when the
    /// process died is picked up again by recovery.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Retry)
                | (Running, Failed)
                | (Retry, Running)
                | (Retry, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown job status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "RETRY" => Ok(Self::Retry),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A job as a producer describes it, before the store assigns an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewJob {
    pub worker_type: String,
    pub payload: Vec<u8>,
    pub metadata: Vec<u8>,
    pub parent_id: Option<JobId>,
}

impl NewJob {
    pub fn new(worker_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            worker_type: worker_type.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Build a job whose payload is the JSON encoding of `value`
    pub fn with_json_payload<T: Serialize>(
        worker_type: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(worker_type, serde_json::to_vec(value)?))
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn with_parent(mut self, parent_id: JobId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// A persisted job row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub worker_type: String,
    pub status: JobStatus,
    pub payload: Vec<u8>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: Vec<u8>,
    pub parent_id: Option<JobId>,
    /// Error message of the most recent failed attempt
    pub last_error: Option<String>,
}

impl Job {
    /// Materialize a freshly created row for `new`
    pub fn from_new(id: JobId, new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            worker_type: new.worker_type,
            status: JobStatus::Pending,
            payload: new.payload,
            retry_count: 0,
            created_at,
            started_at: None,
            ended_at: None,
            metadata: new.metadata,
            parent_id: new.parent_id,
            last_error: None,
        }
    }

    /// Decode the payload as JSON
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
