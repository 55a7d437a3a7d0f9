use std::fmt;

use serde::{Deserialize, Serialize};

use crate::docs::types::{AffectedDocument, AffectedGuide};

/// One monitored URL from the watchlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub url: String,
    pub topic: String,
    pub section: String,
}

/// Result of fetching one URL. `status_code == 0` means no HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub url: String,
    pub status_code: u16,
    /// Response body; only populated for 200 responses.
    pub content: String,
    pub final_url: String,
    pub was_redirected: bool,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn failed(url: &str, status_code: u16, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status_code,
            content: String::new(),
            final_url: url.to_string(),
            was_redirected: false,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200 && self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Meaningful,
    Minor,
    Noise,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Meaningful => "meaningful",
            Classification::Minor => "minor",
            Classification::Noise => "noise",
        };
        f.write_str(s)
    }
}

impl Classification {
    /// Capitalized form used in report headings.
    pub fn title(&self) -> &'static str {
        match self {
            Classification::Meaningful => "Meaningful",
            Classification::Minor => "Minor",
            Classification::Noise => "Noise",
        }
    }
}

/// Ordered from least to most urgent, so `max()` picks the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A content change worth reporting.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub url: String,
    pub topic: String,
    pub section: String,
    pub classification: Classification,
    pub reason: String,
    pub diff_text: String,
    pub affected_documents: Vec<AffectedDocument>,
    pub affected_guides: Vec<AffectedGuide>,
    pub priority: Priority,
}

impl ChangeRecord {
    /// Broken runnable procedures outrank meaningful wording, which outranks
    /// merely touching referenced material.
    pub fn determine_priority(&self) -> Priority {
        if self
            .affected_guides
            .iter()
            .any(|g| g.priority == Priority::Critical)
        {
            Priority::Critical
        } else if !self.affected_guides.is_empty()
            || self.classification == Classification::Meaningful
        {
            Priority::High
        } else if !self.affected_documents.is_empty() {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub original: String,
    pub final_url: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub topic: String,
    pub status: u16,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(classification: Classification) -> ChangeRecord {
        ChangeRecord {
            url: "https://learn.microsoft.com/x".into(),
            topic: "X".into(),
            section: "S".into(),
            classification,
            reason: String::new(),
            diff_text: String::new(),
            affected_documents: vec![],
            affected_guides: vec![],
            priority: Priority::Low,
        }
    }

    fn guide(guide_type: &str) -> AffectedGuide {
        AffectedGuide {
            control_id: "1.1".into(),
            guide_type: guide_type.into(),
            file_path: format!("playbooks/control-implementations/1.1/{guide_type}.md"),
            priority: AffectedGuide::priority_for(guide_type),
        }
    }

    #[test]
    fn portal_walkthrough_guide_is_critical() {
        let mut c = record(Classification::Minor);
        c.affected_guides = vec![guide("verification-testing"), guide("portal-walkthrough")];
        assert_eq!(c.determine_priority(), Priority::Critical);
    }

    #[test]
    fn meaningful_or_any_guide_is_high() {
        assert_eq!(record(Classification::Meaningful).determine_priority(), Priority::High);

        let mut c = record(Classification::Minor);
        c.affected_guides = vec![guide("powershell-setup")];
        assert_eq!(c.determine_priority(), Priority::High);
    }

    #[test]
    fn documents_only_is_medium_and_nothing_is_low() {
        let mut c = record(Classification::Minor);
        assert_eq!(c.determine_priority(), Priority::Low);

        c.affected_documents = vec![AffectedDocument {
            control_id: "2.3".into(),
            title: "Retention".into(),
            file_path: "controls/pillar-2/2.3-retention.md".into(),
        }];
        assert_eq!(c.determine_priority(), Priority::Medium);
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"CRITICAL\"");
    }
}
