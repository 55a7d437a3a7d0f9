use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::docs::DocumentCorpus;
use crate::monitor::fetch::{HttpFetcher, PageFetcher};
use crate::monitor::report::{self, report_file_name};
use crate::monitor::watchlist::Watchlist;
use crate::monitor::{ExitStatus, Monitor, RunOutcome};
use crate::state::StateStore;

pub struct RunOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
}

/// Full monitoring pass: watchlist → fetch all → persist state → report.
pub async fn run(config: &MonitorConfig, opts: &RunOptions) -> Result<ExitStatus> {
    let fetcher = HttpFetcher::new(config.fetch.clone())?;
    run_with(config, opts, fetcher).await
}

async fn run_with<F: PageFetcher>(
    config: &MonitorConfig,
    opts: &RunOptions,
    fetcher: F,
) -> Result<ExitStatus> {
    let mut watchlist = Watchlist::load(&config.watchlist_path, &config.watchlist)?;
    println!("Found {} Learn URLs in watchlist", watchlist.len());
    debug!(
        sections = watchlist.sections.len(),
        excluded = watchlist.excluded_rows,
        duplicates = watchlist.duplicate_rows,
        "watchlist parsed"
    );
    if watchlist.is_empty() {
        warn!(path = %config.watchlist_path.display(), "watchlist has no monitorable URLs");
    }

    if let Some(limit) = opts.limit {
        watchlist.truncate(limit);
        println!("Limited to {limit} URLs for testing");
    }

    let store = StateStore::new(&config.state_path);
    let state = store.load();
    if state.is_baseline() {
        println!("First run - establishing baseline (no report will be generated)");
    }

    let mut monitor = Monitor::new(fetcher, DocumentCorpus::new(&config.docs_dir));
    let outcome = monitor.run(&watchlist.entries, state, Utc::now()).await;

    if opts.dry_run {
        info!("dry run: state not saved");
    } else {
        store.save(&outcome.state)?;
        println!("\nState saved to {}", store.path().display());
    }

    print_summary(&outcome);

    if outcome.was_baseline {
        println!("\nBaseline established. No report generated on first run.");
        return Ok(ExitStatus::Clean);
    }

    if outcome.requires_action() {
        let rendered = report::render(&outcome.report_input());
        if opts.dry_run {
            println!("\n{rendered}");
        } else {
            let path = config.reports_dir.join(report_file_name(outcome.run_time));
            std::fs::create_dir_all(&config.reports_dir).with_context(|| {
                format!("Failed to create {}", config.reports_dir.display())
            })?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            println!("Report saved to {}", path.display());
        }
        println!(
            "\n{} meaningful changes detected - exit code 1",
            outcome.meaningful_count()
        );
    } else {
        println!("\nNo meaningful changes detected");
    }

    Ok(outcome.exit_status())
}

fn print_summary(outcome: &RunOutcome) {
    println!("\n{}", "=".repeat(50));
    println!("Meaningful changes: {}", outcome.meaningful_count());
    println!("Minor changes: {}", outcome.minor_count());
    println!("Redirects: {}", outcome.redirects.len());
    println!("Errors: {}", outcome.errors.len());
}
