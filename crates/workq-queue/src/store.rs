//! Job store contract

use crate::job::{Job, JobId, JobStatus, NewJob};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable persistence for job rows.
///
/// Implementations must be safe to share between dispatch loops. Every
/// status setter validates the move with [`JobStatus::can_transition_to`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `Pending` state and return its id
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    async fn get_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Mark the job as handed to a worker, stamping `started_at`
    async fn set_running(&self, id: JobId) -> Result<(), StoreError>;

    /// Record a failed attempt that will be retried; increments `retry_count`
    async fn set_retry(&self, id: JobId, error: Option<String>) -> Result<(), StoreError>;

    async fn set_completed(&self, id: JobId) -> Result<(), StoreError>;

    async fn set_failed(&self, id: JobId, error: Option<String>) -> Result<(), StoreError>;

    /// Jobs that are not in a terminal state, used by recovery
    async fn list_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect())
    }
}
