//! Demo worker used by `workq run`

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use workq_queue::{Job, WorkError, Worker};

/// Payload understood by [`EchoWorker`]. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EchoPayload {
    pub message: Option<String>,
    /// Simulated work time
    pub sleep_ms: u64,
    /// Fail this many attempts before succeeding
    pub fail_attempts: u32,
    /// Fail permanently
    pub fatal: bool,
}

/// Logs the payload, optionally sleeping or failing on request
pub struct EchoWorker {
    worker_type: String,
}

impl EchoWorker {
    pub fn new(worker_type: impl Into<String>) -> Self {
        Self {
            worker_type: worker_type.into(),
        }
    }
}

#[async_trait]
impl Worker for EchoWorker {
    fn id(&self) -> &str {
        &self.worker_type
    }

    async fn do_work(&self, ctx: CancellationToken, job: &Job) -> Result<(), WorkError> {
        let payload: EchoPayload = if job.payload.is_empty() {
            EchoPayload::default()
        } else {
            job.payload_json()?
        };

        if payload.fatal {
            return Err(WorkError::fatal("payload requested a fatal failure"));
        }
        if job.retry_count < payload.fail_attempts {
            return Err(WorkError::retryable(format!(
                "simulated failure {} of {}",
                job.retry_count + 1,
                payload.fail_attempts
            )));
        }
        if payload.sleep_ms > 0 {
            tokio::select! {
                _ = ctx.cancelled() => return Err(WorkError::retryable("cancelled")),
                _ = tokio::time::sleep(Duration::from_millis(payload.sleep_ms)) => {}
            }
        }

        info!(
            job_id = %job.id,
            retry_count = job.retry_count,
            message = payload.message.as_deref().unwrap_or(""),
            "echo"
        );
        Ok(())
    }
}
