//! List command - show persisted jobs
//!
//! Usage:
//! ```bash
//! workq list
//! workq list --status retry
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use workq_queue::{JobStatus, JobStore};

use super::open_store;

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Only show jobs in this status
    #[arg(long)]
    status: Option<JobStatus>,

    /// Only show jobs for this worker type
    #[arg(long)]
    worker_type: Option<String>,
}

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Pending => Color::Blue,
        JobStatus::Running => Color::Cyan,
        JobStatus::Retry => Color::Yellow,
        JobStatus::Completed => Color::Green,
        JobStatus::Failed => Color::Red,
    }
}

/// Run the list command
pub async fn run(database_url: &str, args: ListArgs) -> Result<()> {
    let store = open_store(database_url).await?;
    let jobs: Vec<_> = store
        .get_all()
        .await?
        .into_iter()
        .filter(|job| args.status.map_or(true, |s| job.status == s))
        .filter(|job| {
            args.worker_type
                .as_deref()
                .map_or(true, |t| job.worker_type == t)
        })
        .collect();

    if jobs.is_empty() {
        crate::print_info("No jobs found");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Id").fg(Color::Cyan),
            Cell::new("Worker type").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Retries").fg(Color::Cyan),
            Cell::new("Created").fg(Color::Cyan),
            Cell::new("Last error").fg(Color::Cyan),
        ]);

    for job in &jobs {
        table.add_row(vec![
            Cell::new(job.id),
            Cell::new(&job.worker_type).fg(Color::Green),
            Cell::new(job.status).fg(status_color(job.status)),
            Cell::new(job.retry_count),
            Cell::new(job.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(job.last_error.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    println!("{} {}", "Total:".dimmed(), jobs.len());
    Ok(())
}
