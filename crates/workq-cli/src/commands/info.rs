//! Info command - Show version and queue configuration
//!
//! Usage:
//! ```bash
//! workq info
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use workq_queue::QueueConfig;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs;

/// Run the info command
pub fn run(_args: InfoArgs) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let config = QueueConfig::from_env();

    println!("{}", "workq - persistent job dispatcher".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    println!("{}", "Version Information:".bold());
    println!("  {} {}", "CLI Version:".dimmed(), version.green());
    println!();

    println!("{}", "Queue Configuration:".bold());
    println!("  {} {}", "Capacity:".dimmed(), config.capacity);
    println!("  {} {:?}", "Poll interval:".dimmed(), config.poll_interval);
    println!("  {} {}", "Max retries:".dimmed(), config.max_retries);
    println!("  {} {:?}", "Base delay:".dimmed(), config.base_delay);
    println!("  {} {:?}", "Backoff:".dimmed(), config.backoff);
    println!("  {} {}", "Multi-level queue:".dimmed(), config.multi_queue);
    println!("  {} {}", "Strict routing:".dimmed(), config.strict_routing);
    println!();

    println!("{}", "Configuration:".bold());
    println!(
        "  {} Set WORKQ_QUEUE_CAPACITY, WORKQ_POLL_INTERVAL_MS, WORKQ_MAX_RETRIES,",
        "ℹ".blue()
    );
    println!("    WORKQ_BASE_DELAY_MS, WORKQ_BACKOFF, WORKQ_MULTI_QUEUE, WORKQ_STRICT_ROUTING");
    println!();

    Ok(())
}
