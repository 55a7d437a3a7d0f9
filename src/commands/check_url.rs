use anyhow::Result;

use crate::config::MonitorConfig;
use crate::docs::DocumentCorpus;
use crate::monitor::classify::classify_change;
use crate::monitor::fetch::{HttpFetcher, PageFetcher};
use crate::monitor::normalize::{content_hash, normalize_html};
use crate::monitor::ExitStatus;
use crate::state::StateStore;

const PREVIEW_CHARS: usize = 500;

/// Walk one URL through the pipeline and print every intermediate result.
/// Never writes state.
pub async fn check_url(config: &MonitorConfig, url: &str) -> Result<ExitStatus> {
    println!("\nDebug mode: checking single URL");
    println!("URL: {url}");
    println!("{}", "=".repeat(60));

    let mut fetcher = HttpFetcher::new(config.fetch.clone())?;

    println!("\n1. Fetching page...");
    let fetched = fetcher.fetch(url).await;
    println!("   Status: {}", fetched.status_code);
    println!("   Final URL: {}", fetched.final_url);
    println!("   Redirected: {}", fetched.was_redirected);
    if let Some(err) = &fetched.error {
        println!("   Error: {err}");
        return Ok(ExitStatus::Clean);
    }
    println!("   Content length: {} bytes", fetched.content.len());

    println!("\n2. Extracting content...");
    let normalized = normalize_html(&fetched.content);
    println!("   Normalized length: {} chars", normalized.chars().count());
    println!("   First {PREVIEW_CHARS} chars:\n   ---");
    let preview: String = normalized.chars().take(PREVIEW_CHARS).collect();
    println!("   {}", preview.replace('\n', "\n   "));
    println!("   ---");

    println!("\n3. Computing hash...");
    let hash = content_hash(&normalized);
    println!("   Hash: {hash}");

    println!("\n4. Finding affected files...");
    let impact = DocumentCorpus::new(&config.docs_dir).find_affected(url);
    println!("   Controls: {}", impact.documents.len());
    for d in &impact.documents {
        println!("     - {}: {}", d.control_id, d.file_path);
    }
    println!("   Playbooks: {}", impact.guides.len());
    for g in &impact.guides {
        println!("     - {}/{} ({})", g.control_id, g.guide_type, g.priority);
    }

    println!("\n5. State check...");
    let state = StateStore::new(&config.state_path).load();
    match state.urls.get(url) {
        Some(previous) => {
            println!("   Found in state file");
            println!("   Last checked: {}", previous.last_checked.to_rfc3339());
            println!("   Last changed: {}", previous.last_changed.to_rfc3339());
            if previous.content_hash() == hash {
                println!("   Content: UNCHANGED");
            } else {
                println!("   Content: CHANGED");
                let verdict = classify_change(previous.normalized_content(), &normalized);
                println!("   Classification: {} ({})", verdict.classification, verdict.reason);
            }
        }
        None => println!("   Not found in state file (new URL)"),
    }

    println!("\nDebug complete.");
    Ok(ExitStatus::Clean)
}
