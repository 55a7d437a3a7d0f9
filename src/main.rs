mod commands;
mod config;
mod docs;
mod monitor;
mod state;

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error, Level};

use commands::{Command, RunOptions};
use config::MonitorConfig;
use monitor::ExitStatus;

/// Monitors Microsoft Learn pages cited by the governance docs and flags
/// upstream changes that may require doc updates.
#[derive(Parser, Debug)]
#[command(name = "learn-monitor", version)]
#[command(after_help = "Exit codes:\n  \
    0   no meaningful changes (including the baseline run)\n  \
    1   meaningful changes or fetch errors detected\n  \
    2   execution error\n  \
    130 interrupted")]
struct Cli {
    /// Don't save state or write the report
    #[arg(long)]
    dry_run: bool,

    /// Only check the first N watchlist URLs
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (very verbose)
    #[arg(short, long)]
    debug: bool,

    /// Check a single URL and print each pipeline step
    #[arg(long)]
    url: Option<String>,

    /// Project root holding docs/, data/ and reports/
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let debug_mode = cli.debug || config::debug_forced();
    let level = if debug_mode {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = MonitorConfig::from_env(cli.root.clone());

    println!("Microsoft Learn Documentation Monitor");
    println!("{}", "=".repeat(50));
    debug!(?cli, "arguments");
    debug!(root = %config.project_root.display(), "project root");
    debug!(watchlist = %config.watchlist_path.display(), "watchlist path");
    debug!(state = %config.state_path.display(), "state path");

    let command = match cli.url {
        Some(url) => Command::CheckUrl(url),
        None => Command::Run(RunOptions {
            dry_run: cli.dry_run,
            limit: cli.limit,
        }),
    };

    let status = tokio::select! {
        result = commands::dispatch(&config, command) => match result {
            Ok(status) => status,
            Err(e) => {
                error!("Unexpected error: {e}");
                debug!("{e:?}");
                eprintln!("\nERROR: {e:#}");
                eprintln!("\nFor debugging, run with --debug flag:");
                eprintln!("  learn-monitor --debug");
                ExitStatus::Failed
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!("\n\nInterrupted by user");
            ExitStatus::Interrupted
        }
    };

    std::process::exit(status.code());
}
