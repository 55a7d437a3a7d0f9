use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::types::WatchlistEntry;
use crate::config::WatchlistConfig;

static SECTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^##\s+(.+)$").expect("valid section regex"));

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watchlist not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read watchlist {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid monitored host pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Parsed watchlist. An empty `entries` is a valid result; callers decide how loud to be.
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    pub entries: Vec<WatchlistEntry>,
    pub sections: Vec<String>,
    /// Rows dropped because of an excluded section.
    pub excluded_rows: usize,
    /// Rows dropped because their URL was already listed.
    pub duplicate_rows: usize,
}

impl Watchlist {
    pub fn load(path: &Path, config: &WatchlistConfig) -> Result<Self, WatchlistError> {
        if !path.exists() {
            return Err(WatchlistError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| WatchlistError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, config)
    }

    pub fn parse(text: &str, config: &WatchlistConfig) -> Result<Self, WatchlistError> {
        let row_pattern = Regex::new(&format!(
            r"\|\s*\*?\*?([^|]+?)\*?\*?\s*\|\s*(https://{}[^\s|]+)\s*\|",
            regex::escape(&config.monitored_host)
        ))?;

        let sections: Vec<(usize, String)> = SECTION_HEADER
            .captures_iter(text)
            .filter_map(|c| {
                let m = c.get(0)?;
                Some((m.start(), c[1].trim().to_string()))
            })
            .collect();

        let mut watchlist = Watchlist {
            sections: sections.iter().map(|(_, name)| name.clone()).collect(),
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for caps in row_pattern.captures_iter(text) {
            let pos = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let topic = caps[1].trim().replace("**", "");
            let url = caps[2].trim().to_string();

            let section = sections
                .iter()
                .rev()
                .find(|(start, _)| pos > *start)
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| "Unknown".to_string());

            if config
                .excluded_sections
                .iter()
                .any(|skip| section.contains(skip.as_str()))
            {
                watchlist.excluded_rows += 1;
                continue;
            }

            if !seen.insert(url.clone()) {
                debug!(url = %url, "duplicate watchlist URL ignored");
                watchlist.duplicate_rows += 1;
                continue;
            }

            watchlist.entries.push(WatchlistEntry {
                url,
                topic,
                section,
            });
        }

        Ok(watchlist)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the first `limit` entries.
    pub fn truncate(&mut self, limit: usize) {
        self.entries.truncate(limit);
    }
}
