use serde::{Deserialize, Serialize};

use crate::monitor::types::Priority;

/// Guide type whose steps walk through portal UI; upstream UI changes break it.
pub const PORTAL_WALKTHROUGH: &str = "portal-walkthrough";

/// A control document that cites a watched URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedDocument {
    /// Leading segment of the file stem, e.g. "1.2" for "1.2-audit-logging.md"
    pub control_id: String,
    pub title: String,
    /// Relative to the docs root.
    pub file_path: String,
}

/// An implementation guide (playbook) that cites a watched URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedGuide {
    /// Name of the control directory the guide lives in.
    pub control_id: String,
    /// File stem, e.g. "portal-walkthrough" or "powershell-setup"
    pub guide_type: String,
    pub file_path: String,
    pub priority: Priority,
}

impl AffectedGuide {
    pub fn priority_for(guide_type: &str) -> Priority {
        if guide_type == PORTAL_WALKTHROUGH {
            Priority::Critical
        } else {
            Priority::High
        }
    }
}

/// Everything in the local corpus that references one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Impact {
    pub documents: Vec<AffectedDocument>,
    pub guides: Vec<AffectedGuide>,
}

impl Impact {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.guides.is_empty()
    }
}
