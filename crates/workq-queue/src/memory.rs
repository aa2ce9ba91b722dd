//! In-memory job store

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::job::{Job, JobId, JobStatus, NewJob};
use crate::store::{JobStore, StoreError};

/// Process-local [`JobStore`]. Nothing survives a restart, so it is meant
/// for tests and for embedding where durability is handled elsewhere.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing the lifecycle checks.
    /// Used to seed a store with the leftovers of a previous run.
    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    async fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut Job) + Send,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !job.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        job.status = to;
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        let id = Uuid::new_v4();
        let row = Job::from_new(id, job, Utc::now());
        self.jobs.write().await.insert(id, row);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_all(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn set_running(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Running, |job| {
            job.started_at = Some(Utc::now());
        })
        .await
    }

    async fn set_retry(&self, id: JobId, error: Option<String>) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Retry, |job| {
            job.retry_count += 1;
            job.last_error = error;
        })
        .await
    }

    async fn set_completed(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.ended_at = Some(Utc::now());
        })
        .await
    }

    async fn set_failed(&self, id: JobId, error: Option<String>) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Failed, |job| {
            job.ended_at = Some(Utc::now());
            if error.is_some() {
                job.last_error = error;
            }
        })
        .await
    }
}
