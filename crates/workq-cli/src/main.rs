//! workq CLI - run and inspect a persistent job dispatcher
//!
//! # Usage
//!
//! ```bash
//! # Queue a job for the echo workers
//! workq push echo '{"message": "hello"}'
//!
//! # Run four echo workers until Ctrl-C, resuming unfinished jobs first
//! workq run --workers 4
//!
//! # Show the jobs table
//! workq list --status failed
//!
//! # Show version and effective queue configuration
//! workq info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod workers;

use commands::{info, list, push, run};

/// workq - persistent job dispatcher
#[derive(Parser)]
#[command(
    name = "workq",
    version,
    about = "workq - persistent job dispatcher and worker pool",
    long_about = "Jobs are persisted before they are dispatched, retried with backoff\n\
                  and resumed after a restart. Queue settings are read from WORKQ_*\n\
                  environment variables."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database holding the jobs table
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:workq.db?mode=rwc",
        global = true
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dispatcher with echo workers until interrupted
    #[command(name = "run")]
    Run(run::RunArgs),

    /// Persist a job for a worker type
    #[command(name = "push")]
    Push(push::PushArgs),

    /// List persisted jobs
    #[command(name = "list")]
    List(list::ListArgs),

    /// Show version and queue configuration
    #[command(name = "info")]
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run::run(&cli.database_url, args).await,
        Commands::Push(args) => push::run(&cli.database_url, args).await,
        Commands::List(args) => list::run(&cli.database_url, args).await,
        Commands::Info(args) => info::run(args),
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
