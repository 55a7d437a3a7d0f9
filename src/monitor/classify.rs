use once_cell::sync::Lazy;
use regex::Regex;
use similar::{ChangeTag, TextDiff};

use super::types::Classification;

/// Maximum number of diff lines kept for reports.
pub const DIFF_LINE_LIMIT: usize = 100;
const CONTEXT_LINES: usize = 3;

pub const REASON_NO_CHANGES: &str = "No text changes detected";
pub const REASON_NOISE: &str = "Metadata or formatting only";
pub const REASON_MINOR: &str = "General content update";

/// A labelled pattern; the first rule in a list that fires decides the outcome.
pub struct Rule {
    pub label: &'static str,
    pub pattern: Regex,
}

impl Rule {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            pattern: Regex::new(pattern).expect("valid classification pattern"),
        }
    }
}

/// Ordered by operational impact. Navigation comes first: a moved button breaks
/// every step-by-step guide that names it. Terms anchor at the start of a word
/// so inflected forms still match; short tokens are closed on both sides.
pub static MEANINGFUL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            "UI navigation steps",
            r"(?i)\d+\.\s+(click|select|go to|navigate)",
        ),
        Rule::new(
            "Portal references",
            r"(?i)\b(admin center|portal|power platform|purview)",
        ),
        Rule::new(
            "UI element names",
            r"(?i)\b(button|menu|tabs?\b|panel|dialog|blade)",
        ),
        Rule::new(
            "Policy callout blocks",
            r"(?i)\b(important|warning|note|caution):",
        ),
        Rule::new(
            "Policy language",
            r"(?i)\b(required|must|should not|prohibited)",
        ),
        Rule::new(
            "Compliance features",
            r"(?i)\b(compliance|audit|retention|dlp\b)",
        ),
        Rule::new(
            "Deprecation notice",
            r"(?i)\b(deprecated|removed|no longer|retired)",
        ),
        Rule::new(
            "Feature availability",
            r"(?i)\b(preview|ga\b|generally available)",
        ),
        Rule::new("Breaking changes", r"(?i)\b(breaking change|migration)"),
        Rule::new(
            "Configuration instructions",
            r"(?i)\b(enable|disable|configure|set to)",
        ),
        Rule::new(
            "Automation references",
            r"(?i)\b(powershell|cmdlet|graph api)",
        ),
        Rule::new("Licensing requirements", r"(?i)\b(licens(e|es|ed|ing)|sku\b|e5\b|e3\b)"),
    ]
});

/// Lines that only ever carry page metadata or feedback boilerplate.
pub static NOISE_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("Document metadata", r"(?i)ms\.(date|author|reviewer|topic)"),
        Rule::new("Page boilerplate", r"(?i)(article|contributor|feedback)"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub reason: String,
    pub diff_text: String,
}

/// Diff two normalized snapshots and decide how much the change matters.
pub fn classify_change(old_text: &str, new_text: &str) -> Verdict {
    let old = terminated_lines(old_text);
    let new = terminated_lines(new_text);
    let diff = TextDiff::from_lines(old.as_str(), new.as_str());

    let changed: Vec<String> = diff
        .iter_all_changes()
        .filter(|c| c.tag() != ChangeTag::Equal)
        .map(|c| c.to_string_lossy().trim_end_matches(['\r', '\n']).to_string())
        .collect();

    if changed.is_empty() {
        return Verdict {
            classification: Classification::Noise,
            reason: REASON_NO_CHANGES.to_string(),
            diff_text: String::new(),
        };
    }

    let diff_text = unified_diff(&diff, DIFF_LINE_LIMIT);

    if let Some(rule) = first_matching_rule(&MEANINGFUL_RULES, &changed) {
        return Verdict {
            classification: Classification::Meaningful,
            reason: rule.label.to_string(),
            diff_text,
        };
    }

    let noise_only = changed
        .iter()
        .all(|line| line.trim().is_empty() || NOISE_RULES.iter().any(|r| r.pattern.is_match(line)));

    let (classification, reason) = if noise_only {
        (Classification::Noise, REASON_NOISE)
    } else {
        (Classification::Minor, REASON_MINOR)
    };

    Verdict {
        classification,
        reason: reason.to_string(),
        diff_text,
    }
}

/// Rule-major scan: rule order, not line order, decides the winner.
fn first_matching_rule<'a>(rules: &'a [Rule], lines: &[String]) -> Option<&'a Rule> {
    rules
        .iter()
        .find(|rule| lines.iter().any(|line| rule.pattern.is_match(line)))
}

/// Every line newline-terminated, so a missing final newline never shows up as an edit.
fn terminated_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn unified_diff(diff: &TextDiff<'_, '_, '_, str>, limit: usize) -> String {
    let mut lines = vec!["--- previous".to_string(), "+++ current".to_string()];

    for group in diff.grouped_ops(CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;
        lines.push(format!(
            "@@ -{} +{} @@",
            hunk_range(old_start, old_len),
            hunk_range(new_start, new_len)
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                let value = change.to_string_lossy();
                lines.push(format!("{}{}", sign, value.trim_end_matches(['\r', '\n'])));
            }
        }
    }

    lines.truncate(limit);
    lines.join("\n")
}

/// One side of a hunk header, 1-based. A single line omits the length and an
/// empty range points at the line before it, as `diff -u` prints them.
fn hunk_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}
