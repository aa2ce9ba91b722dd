//! Push command - persist a job for a worker type
//!
//! The job is written in PENDING state; the next `workq run` serving that
//! worker type picks it up through recovery.
//!
//! Usage:
//! ```bash
//! workq push echo '{"message": "hello", "fail_attempts": 1}'
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use uuid::Uuid;
use workq_queue::{JobStore, NewJob};

use super::open_store;

/// Arguments for the push command
#[derive(Args)]
pub struct PushArgs {
    /// Worker type that should handle the job
    worker_type: String,

    /// JSON payload
    #[arg(default_value = "{}")]
    payload: String,

    /// Opaque metadata propagated with the job
    #[arg(long)]
    metadata: Option<String>,

    /// Id of the job that spawned this one
    #[arg(long)]
    parent: Option<Uuid>,
}

/// Run the push command
pub async fn run(database_url: &str, args: PushArgs) -> Result<()> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .with_context(|| format!("Invalid JSON: {}", args.payload))?;

    let mut job = NewJob::with_json_payload(&args.worker_type, &payload)?;
    if let Some(metadata) = args.metadata {
        job = job.with_metadata(metadata.into_bytes());
    }
    if let Some(parent) = args.parent {
        job = job.with_parent(parent);
    }

    let store = open_store(database_url).await?;
    let id = store.create(job).await.context("Unable to persist job")?;

    crate::print_success(&format!(
        "Job {} queued for {}",
        id.to_string().green(),
        args.worker_type.cyan()
    ));
    Ok(())
}
