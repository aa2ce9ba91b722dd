//! Worker SPI

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::job::Job;

/// Outcome of a failed `do_work` call
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// Transient failure, the job is attempted again until retries run out
    #[error("Retryable: {0}")]
    Retryable(String),
    /// Permanent failure, the job goes straight to `Failed`
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl WorkError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        Self::Retryable(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for WorkError {
    fn from(err: serde_json::Error) -> Self {
        // A payload that does not decode will not decode next time either
        Self::Fatal(format!("Invalid payload: {err}"))
    }
}

/// An executor for one worker type.
///
/// Jobs can be delivered more than once (a crash between `Running` and
/// completion re-runs the job on recovery), so implementations must be
/// idempotent.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker type this instance serves
    fn id(&self) -> &str;

    /// Execute the job. `ctx` is the token passed to `register_worker`;
    /// long-running work should stop early once it is cancelled.
    async fn do_work(&self, ctx: CancellationToken, job: &Job) -> Result<(), WorkError>;
}
