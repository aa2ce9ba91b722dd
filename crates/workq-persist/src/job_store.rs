//! SQLite-backed job store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;
use workq_queue::{Job, JobId, JobStatus, JobStore, NewJob, StoreError};

use crate::sqlite::{SqliteConfig, SqliteDatabase};

const COLUMNS: &str = "id, worker_type, status, payload, retry_count, created_at, \
                       start_time, end_time, metadata, parent_id, last_error";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// `IN (...)` list of the statuses allowed to move to `to`
fn sources_of(to: JobStatus) -> String {
    JobStatus::ALL
        .iter()
        .filter(|from| from.can_transition_to(to))
        .map(|from| format!("'{}'", from.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_job(row: &SqliteRow) -> Result<Job, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let status: String = row.try_get("status").map_err(backend)?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let retry_count: i64 = row.try_get("retry_count").map_err(backend)?;
    let retry_count = u32::try_from(retry_count)
        .map_err(|_| StoreError::Serialization(format!("invalid retry_count {retry_count}")))?;
    let parent_id: Option<String> = row.try_get("parent_id").map_err(backend)?;
    let parent_id = parent_id
        .map(|p| Uuid::parse_str(&p))
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Job {
        id,
        worker_type: row.try_get("worker_type").map_err(backend)?,
        status,
        payload: row.try_get("payload").map_err(backend)?,
        retry_count,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(backend)?,
        started_at: row.try_get("start_time").map_err(backend)?,
        ended_at: row.try_get("end_time").map_err(backend)?,
        metadata: row.try_get("metadata").map_err(backend)?,
        parent_id,
        last_error: row.try_get("last_error").map_err(backend)?,
    })
}

/// Durable job store on SQLite
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect, run migrations and wrap the pool
    pub async fn connect(config: &SqliteConfig) -> Result<Self, StoreError> {
        let db = SqliteDatabase::connect(config).await?;
        Ok(Self::new(db.pool().clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn current_status(&self, id: JobId) -> Result<JobStatus, StoreError> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        let status: String = row.try_get("status").map_err(backend)?;
        status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Status updates are guarded by `AND status IN (...)`; zero affected
    /// rows means the job is missing or may not move to `to`.
    async fn check_transition(
        &self,
        id: JobId,
        to: JobStatus,
        rows_affected: u64,
    ) -> Result<(), StoreError> {
        if rows_affected > 0 {
            return Ok(());
        }
        let from = self.current_status(id).await?;
        Err(StoreError::InvalidTransition { id, from, to })
    }

    /// Move to a terminal or running state, stamping `time_column`
    async fn stamp(
        &self,
        id: JobId,
        to: JobStatus,
        time_column: &str,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE jobs SET status = ?, {time_column} = ?, last_error = COALESCE(?, last_error) \
             WHERE id = ? AND status IN ({})",
            sources_of(to)
        );
        let result = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(Utc::now())
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        self.check_transition(id, to, result.rows_affected()).await
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO jobs (id, worker_type, status, payload, retry_count, created_at, metadata, parent_id) \
             VALUES (?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(job.worker_type)
        .bind(JobStatus::Pending.as_str())
        .bind(job.payload)
        .bind(Utc::now())
        .bind(job.metadata)
        .bind(job.parent_id.map(|p| p.to_string()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        row_to_job(&row)
    }

    async fn get_all(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_job).collect()
    }

    async fn set_running(&self, id: JobId) -> Result<(), StoreError> {
        self.stamp(id, JobStatus::Running, "start_time", None).await
    }

    async fn set_retry(&self, id: JobId, error: Option<String>) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE jobs SET status = ?, retry_count = retry_count + 1, last_error = ? \
             WHERE id = ? AND status IN ({})",
            sources_of(JobStatus::Retry)
        );
        let result = sqlx::query(&sql)
            .bind(JobStatus::Retry.as_str())
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        self.check_transition(id, JobStatus::Retry, result.rows_affected())
            .await
    }

    async fn set_completed(&self, id: JobId) -> Result<(), StoreError> {
        self.stamp(id, JobStatus::Completed, "end_time", None).await
    }

    async fn set_failed(&self, id: JobId, error: Option<String>) -> Result<(), StoreError> {
        self.stamp(id, JobStatus::Failed, "end_time", error).await
    }

    async fn list_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE status IN ('PENDING', 'RUNNING', 'RETRY') \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_job).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_of() {
        assert_eq!(sources_of(JobStatus::Completed), "'RUNNING'");
        assert_eq!(sources_of(JobStatus::Retry), "'RUNNING'");
        assert_eq!(
            sources_of(JobStatus::Failed),
            "'PENDING', 'RUNNING', 'RETRY'"
        );
    }
}
