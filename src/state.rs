use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::monitor::normalize::content_hash;
use crate::monitor::types::WatchlistEntry;

pub const SCHEMA_VERSION: u32 = 2;

/// Persisted snapshot of one watched URL.
///
/// `content_hash` is always the digest of `normalized_content`; both are only
/// ever written together through [`UrlState::baseline`] and [`UrlState::record_change`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlState {
    content_hash: String,
    normalized_content: String,
    pub last_checked: DateTime<Utc>,
    pub last_status: u16,
    pub last_changed: DateTime<Utc>,
    pub topic: String,
    pub section: String,
    /// Where the last successful fetch actually landed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl UrlState {
    pub fn baseline(
        entry: &WatchlistEntry,
        normalized: String,
        final_url: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            content_hash: content_hash(&normalized),
            normalized_content: normalized,
            last_checked: now,
            last_status: 200,
            last_changed: now,
            topic: entry.topic.clone(),
            section: entry.section.clone(),
            final_url: Some(final_url.to_string()),
        }
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn normalized_content(&self) -> &str {
        &self.normalized_content
    }

    /// Replace the snapshot after a detected change.
    pub fn record_change(
        &mut self,
        entry: &WatchlistEntry,
        normalized: String,
        final_url: &str,
        now: DateTime<Utc>,
    ) {
        *self = Self::baseline(entry, normalized, final_url, now);
    }

    /// Note a check that did not change content (or failed).
    pub fn touch(&mut self, status: u16, now: DateTime<Utc>) {
        self.last_checked = now;
        self.last_status = status;
    }

    fn is_consistent(&self) -> bool {
        content_hash(&self.normalized_content) == self.content_hash
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStatistics {
    pub total_urls: usize,
    pub last_run_checked: usize,
    pub last_run_meaningful_changes: usize,
    pub last_run_minor_changes: usize,
    pub last_run_noise_changes: usize,
    pub last_run_new_baselines: usize,
    pub last_run_redirects: usize,
    pub last_run_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub schema_version: u32,
    /// `None` until the first run completes; that run only records baselines.
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urls: BTreeMap<String, UrlState>,
    #[serde(default)]
    pub statistics: RunStatistics,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_run: None,
            urls: BTreeMap::new(),
            statistics: RunStatistics::default(),
        }
    }
}

impl MonitorState {
    pub fn is_baseline(&self) -> bool {
        self.last_run.is_none()
    }
}

/// JSON file holding the single [`MonitorState`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable file means starting from a fresh baseline.
    pub fn load(&self) -> MonitorState {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return MonitorState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
                return MonitorState::default();
            }
        };

        let mut state: MonitorState = match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting fresh");
                return MonitorState::default();
            }
        };

        let before = state.urls.len();
        state.urls.retain(|url, entry| {
            let ok = entry.is_consistent();
            if !ok {
                warn!(url = %url, "stored hash does not match snapshot, re-baselining");
            }
            ok
        });
        if state.urls.len() != before {
            debug!(dropped = before - state.urls.len(), "inconsistent entries dropped");
        }
        state.schema_version = SCHEMA_VERSION;
        state
    }

    /// Write the whole state via a temp file and rename, so readers never see a partial file.
    pub fn save(&self, state: &MonitorState) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let json = serde_json::to_string_pretty(state).context("serialize monitor state")?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .context("Failed to create temporary state file")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write state")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), urls = state.urls.len(), "state saved");
        Ok(())
    }
}
