pub mod classify;
pub mod fetch;
pub mod normalize;
pub mod report;
#[cfg(test)]
pub mod scripted;
pub mod types;
pub mod watchlist;

use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::docs::DocumentCorpus;
use crate::state::{MonitorState, RunStatistics, UrlState};

use classify::classify_change;
use fetch::PageFetcher;
use normalize::{content_hash, normalize_html};
use report::ReportInput;
use types::{ChangeRecord, Classification, FetchFailure, Redirect, WatchlistEntry};

/// Process exit status of a monitor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Nothing needs attention (including the baseline run).
    Clean,
    /// Meaningful changes or fetch errors; downstream automation should act.
    ActionRequired,
    Failed,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::ActionRequired => 1,
            ExitStatus::Failed => 2,
            ExitStatus::Interrupted => 130,
        }
    }
}

/// Everything one pass over the watchlist produced, including the updated state.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: MonitorState,
    pub run_time: DateTime<Utc>,
    pub total_urls: usize,
    /// True when the state had no previous run; nothing is reported then.
    pub was_baseline: bool,
    pub changes: Vec<ChangeRecord>,
    pub redirects: Vec<Redirect>,
    pub errors: Vec<FetchFailure>,
    pub noise_changes: usize,
    pub new_baselines: usize,
}

impl RunOutcome {
    pub fn meaningful_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.classification == Classification::Meaningful)
            .count()
    }

    pub fn minor_count(&self) -> usize {
        self.changes.len() - self.meaningful_count()
    }

    /// A report is due when this was not the baseline run and something needs a human.
    pub fn requires_action(&self) -> bool {
        !self.was_baseline && (self.meaningful_count() > 0 || !self.errors.is_empty())
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.requires_action() {
            ExitStatus::ActionRequired
        } else {
            ExitStatus::Clean
        }
    }

    pub fn report_input(&self) -> ReportInput<'_> {
        ReportInput {
            run_time: self.run_time,
            total_urls: self.total_urls,
            changes: &self.changes,
            redirects: &self.redirects,
            errors: &self.errors,
        }
    }
}

/// Sequential fetch → normalize → diff → classify → impact pipeline.
pub struct Monitor<F> {
    fetcher: F,
    corpus: DocumentCorpus,
}

impl<F: PageFetcher> Monitor<F> {
    pub fn new(fetcher: F, corpus: DocumentCorpus) -> Self {
        Self { fetcher, corpus }
    }

    /// Check every entry in order. The state goes in, the updated state comes
    /// back in the outcome; nothing is persisted here.
    pub async fn run(
        &mut self,
        entries: &[WatchlistEntry],
        mut state: MonitorState,
        now: DateTime<Utc>,
    ) -> RunOutcome {
        let was_baseline = state.is_baseline();
        let mut outcome = RunOutcome {
            state: MonitorState::default(),
            run_time: now,
            total_urls: entries.len(),
            was_baseline,
            changes: Vec::new(),
            redirects: Vec::new(),
            errors: Vec::new(),
            noise_changes: 0,
            new_baselines: 0,
        };

        for (i, entry) in entries.iter().enumerate() {
            println!("{}", progress_line(i + 1, entries.len(), &entry.topic));
            self.check(entry, &mut state, &mut outcome, now).await;
        }

        let meaningful = outcome.meaningful_count();
        state.last_run = Some(now);
        state.statistics = RunStatistics {
            total_urls: entries.len(),
            last_run_checked: entries.len(),
            last_run_meaningful_changes: meaningful,
            last_run_minor_changes: outcome.changes.len() - meaningful,
            last_run_noise_changes: outcome.noise_changes,
            last_run_new_baselines: outcome.new_baselines,
            last_run_redirects: outcome.redirects.len(),
            last_run_errors: outcome.errors.len(),
        };
        outcome.state = state;
        outcome
    }

    async fn check(
        &mut self,
        entry: &WatchlistEntry,
        state: &mut MonitorState,
        outcome: &mut RunOutcome,
        now: DateTime<Utc>,
    ) {
        let fetched = self.fetcher.fetch(&entry.url).await;

        if !fetched.is_ok() {
            match &fetched.error {
                Some(err) => println!("  ERROR: {} ({err})", entry.url),
                None => println!("  ERROR: {} (HTTP {})", entry.url, fetched.status_code),
            }
            outcome.errors.push(FetchFailure {
                url: entry.url.clone(),
                topic: entry.topic.clone(),
                status: fetched.status_code,
                error: fetched.error.clone(),
            });
            if let Some(previous) = state.urls.get_mut(&entry.url) {
                previous.touch(fetched.status_code, now);
            }
            return;
        }

        if fetched.was_redirected {
            println!("  Redirected: {} -> {}", entry.url, fetched.final_url);
            outcome.redirects.push(Redirect {
                original: entry.url.clone(),
                final_url: fetched.final_url.clone(),
                topic: entry.topic.clone(),
            });
        }

        let normalized = normalize_html(&fetched.content);
        let new_hash = content_hash(&normalized);

        let previous = match state.urls.entry(entry.url.clone()) {
            Entry::Vacant(slot) => {
                debug!(url = %entry.url, hash = %new_hash, "new baseline");
                slot.insert(UrlState::baseline(entry, normalized, &fetched.final_url, now));
                outcome.new_baselines += 1;
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if previous.content_hash() == new_hash {
            debug!(url = %entry.url, "unchanged");
            previous.touch(fetched.status_code, now);
            previous.final_url = Some(fetched.final_url.clone());
            return;
        }

        let verdict = classify_change(previous.normalized_content(), &normalized);
        previous.record_change(entry, normalized, &fetched.final_url, now);

        if verdict.classification == Classification::Noise {
            debug!(url = %entry.url, reason = %verdict.reason, "noise-only change");
            outcome.noise_changes += 1;
            return;
        }

        println!(
            "  CHANGED: {} - {} ({})",
            short_topic(&entry.topic),
            verdict.classification,
            verdict.reason
        );

        let impact = self.corpus.find_affected(&entry.url);
        if impact.is_empty() {
            warn!(url = %entry.url, "changed page is not referenced by any local document");
        }
        let mut change = ChangeRecord {
            url: entry.url.clone(),
            topic: entry.topic.clone(),
            section: entry.section.clone(),
            classification: verdict.classification,
            reason: verdict.reason,
            diff_text: verdict.diff_text,
            affected_documents: impact.documents,
            affected_guides: impact.guides,
            priority: types::Priority::Low,
        };
        change.priority = change.determine_priority();
        outcome.changes.push(change);
    }
}

fn progress_line(position: usize, total: usize, topic: &str) -> String {
    format!("[{position}/{total}] {}", short_topic(topic))
}

fn short_topic(topic: &str) -> String {
    const MAX: usize = 50;
    if topic.chars().count() > MAX {
        format!("{}...", topic.chars().take(MAX).collect::<String>())
    } else {
        topic.to_string()
    }
}
