//! Run command - dispatch jobs to echo workers until Ctrl-C
//!
//! Usage:
//! ```bash
//! workq run --worker-type echo --workers 4
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use workq_queue::{Dispatcher, QueueConfig, QueueError};

use super::open_store;
use crate::workers::EchoWorker;

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Worker type served by the echo workers
    #[arg(long, default_value = "echo")]
    worker_type: String,

    /// Number of worker instances (one dispatch loop each)
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Dispatcher name used in logs
    #[arg(long, default_value = "workq")]
    queue_id: String,

    /// How long to wait for in-flight jobs on shutdown
    #[arg(long, default_value_t = 30)]
    shutdown_timeout_secs: u64,
}

/// Run the dispatcher
pub async fn run(database_url: &str, args: RunArgs) -> Result<()> {
    let store = Arc::new(open_store(database_url).await?);
    let config = QueueConfig::from_env();
    let dispatcher = Dispatcher::new(&args.queue_id, store, config);

    let ctx = CancellationToken::new();
    for _ in 0..args.workers.max(1) {
        dispatcher
            .register_worker(ctx.clone(), Arc::new(EchoWorker::new(&args.worker_type)))
            .await;
    }

    let resumed = dispatcher
        .resume_pending_jobs()
        .await
        .context("Unable to resume pending jobs")?;
    crate::print_info(&format!(
        "Dispatcher {} running {} {} worker(s), {} job(s) resumed. Press Ctrl-C to stop.",
        args.queue_id.green(),
        args.workers.max(1),
        args.worker_type.cyan(),
        resumed
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Unable to listen for Ctrl-C")?;
    info!("Interrupt received, shutting down");
    ctx.cancel();

    let deadline = CancellationToken::new();
    let timer = deadline.clone();
    let timeout = Duration::from_secs(args.shutdown_timeout_secs);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        timer.cancel();
    });

    match dispatcher.close(deadline).await {
        Ok(()) => {
            crate::print_success("All in-flight jobs finished");
            Ok(())
        }
        Err(QueueError::ShutdownInterrupted) => {
            warn!(?timeout, "Shutdown timed out");
            crate::print_warning("Shutdown timed out; unfinished jobs will resume on next run");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
