use chrono::{DateTime, Utc};

use super::types::{ChangeRecord, Classification, FetchFailure, Priority, Redirect};

/// Characters of diff shown per change.
pub const REPORT_DIFF_CHAR_LIMIT: usize = 2000;

pub struct ReportInput<'a> {
    pub run_time: DateTime<Utc>,
    pub total_urls: usize,
    pub changes: &'a [ChangeRecord],
    pub redirects: &'a [Redirect],
    pub errors: &'a [FetchFailure],
}

pub fn report_file_name(run_time: DateTime<Utc>) -> String {
    format!("learn-changes-{}.md", run_time.format("%Y-%m-%d"))
}

/// Render the Markdown change report. Section order and the always-present
/// Errors section are stable so downstream tooling can grep for them.
pub fn render(input: &ReportInput<'_>) -> String {
    let changes = input.changes;
    let count_class = |c: Classification| changes.iter().filter(|r| r.classification == c).count();
    let count_priority = |p: Priority| changes.iter().filter(|r| r.priority == p).count();

    let date = input.run_time.format("%Y-%m-%d");
    let mut lines = vec![
        format!("# Microsoft Learn Documentation Changes - {date}"),
        String::new(),
        format!("**Run Time:** {}", input.run_time.to_rfc3339()),
        format!("**Total URLs Checked:** {}", input.total_urls),
        format!("**Meaningful Changes:** {}", count_class(Classification::Meaningful)),
        format!("**Minor Changes:** {}", count_class(Classification::Minor)),
        format!("**Redirects:** {}", input.redirects.len()),
        format!("**Errors:** {}", input.errors.len()),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    if !changes.is_empty() {
        lines.extend(
            [
                "## Summary of Required Actions",
                "",
                "| Priority | Count | Action Required |",
                "|----------|-------|-----------------|",
            ]
            .map(String::from),
        );
        let rows = [
            (Priority::Critical, "Playbook portal-walkthrough.md needs update"),
            (Priority::High, "Control/playbook may need review"),
            (Priority::Medium, "Referenced content changed - review optional"),
            (Priority::Low, "No local references - informational"),
        ];
        for (priority, action) in rows {
            let n = count_priority(priority);
            if n > 0 {
                lines.push(format!("| {priority} | {n} | {action} |"));
            }
        }
        push_rule(&mut lines);
    }

    let critical: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| c.priority == Priority::Critical)
        .collect();
    if !critical.is_empty() {
        lines.push("## CRITICAL: Playbook Updates Required".to_string());
        lines.push(String::new());
        lines.push(
            "These changes affect step-by-step procedures and must be addressed.".to_string(),
        );
        lines.push(String::new());
        for (i, c) in critical.iter().enumerate() {
            format_change(&mut lines, c, i + 1);
        }
        push_rule(&mut lines);
    }

    let high: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| c.priority == Priority::High)
        .collect();
    if !high.is_empty() {
        lines.push("## HIGH: Control Review Recommended".to_string());
        lines.push(String::new());
        for (i, c) in high.iter().enumerate() {
            format_change(&mut lines, c, i + 1);
        }
        push_rule(&mut lines);
    }

    let rest: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| c.priority < Priority::High)
        .collect();
    if !rest.is_empty() {
        lines.push("## MEDIUM: Minor Changes (Review Optional)".to_string());
        lines.push(String::new());
        for (i, c) in rest.iter().enumerate() {
            lines.push(format!("### {}. {}", i + 1, c.topic));
            lines.push(format!("**URL:** {}", c.url));
            lines.push(format!(
                "**Classification:** {} ({})",
                c.classification.title(),
                c.reason
            ));
            if !c.affected_documents.is_empty() {
                let refs: Vec<String> = c
                    .affected_documents
                    .iter()
                    .map(|d| format!("`{}`", d.file_path))
                    .collect();
                lines.push(format!("**Referenced By:** {}", refs.join(", ")));
            }
            push_rule(&mut lines);
        }
    }

    if !input.redirects.is_empty() {
        lines.extend(
            [
                "## URL Redirects Detected",
                "",
                "Consider updating microsoft-learn-urls.md:",
                "",
                "| Topic | Original URL | Redirects To |",
                "|-------|--------------|--------------|",
            ]
            .map(String::from),
        );
        for r in input.redirects {
            lines.push(format!("| {} | {} | {} |", r.topic, r.original, r.final_url));
        }
        push_rule(&mut lines);
    }

    lines.push("## Errors".to_string());
    lines.push(String::new());
    if input.errors.is_empty() {
        lines.push("No errors detected.".to_string());
    } else {
        for e in input.errors {
            lines.push(format!("- **{}** (HTTP {}): {}", e.topic, e.status, e.url));
            if let Some(err) = &e.error {
                lines.push(format!("  - Error: {err}"));
            }
        }
    }
    lines.push(String::new());

    lines.extend(["---", "", "*Generated by `learn-monitor`*"].map(String::from));
    lines.join("\n")
}

fn push_rule(lines: &mut Vec<String>) {
    lines.extend(["", "---", ""].map(String::from));
}

fn format_change(lines: &mut Vec<String>, c: &ChangeRecord, index: usize) {
    lines.push(format!("### {index}. {}", c.topic));
    lines.push(String::new());
    lines.push(format!("**URL:** {}", c.url));
    lines.push(format!("**Section:** {}", c.section));
    lines.push(format!(
        "**Classification:** {} ({})",
        c.classification.title(),
        c.reason
    ));
    lines.push(String::new());

    if !c.affected_guides.is_empty() {
        lines.push("**Affected Playbooks:**".to_string());
        for g in &c.affected_guides {
            let flag = if g.priority == Priority::Critical { " ⚠️" } else { "" };
            lines.push(format!("- `{}`{flag}", g.file_path));
        }
        lines.push(String::new());
    }

    if !c.affected_documents.is_empty() {
        lines.push("**Affected Controls:**".to_string());
        for d in &c.affected_documents {
            lines.push(format!(
                "- Control {}: {} (`{}`)",
                d.control_id, d.title, d.file_path
            ));
        }
        lines.push(String::new());
    }

    if !c.diff_text.is_empty() {
        lines.push("**What Changed:**".to_string());
        lines.push("```diff".to_string());
        lines.push(c.diff_text.chars().take(REPORT_DIFF_CHAR_LIMIT).collect());
        lines.push("```".to_string());
        lines.push(String::new());
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::docs::types::{AffectedDocument, AffectedGuide};

    fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 15, 0).unwrap()
    }

    fn change(topic: &str, classification: Classification, priority: Priority) -> ChangeRecord {
        ChangeRecord {
            url: format!("https://learn.microsoft.com/{}", topic.to_lowercase()),
            topic: topic.to_string(),
            section: "Copilot Studio".to_string(),
            classification,
            reason: "Portal references".to_string(),
            diff_text: "--- previous\n+++ current\n-old\n+new".to_string(),
            affected_documents: vec![],
            affected_guides: vec![],
            priority,
        }
    }

    #[test]
    fn file_name_uses_run_date() {
        assert_eq!(report_file_name(run_time()), "learn-changes-2025-06-03.md");
    }

    #[test]
    fn empty_run_still_has_errors_section() {
        let report = render(&ReportInput {
            run_time: run_time(),
            total_urls: 3,
            changes: &[],
            redirects: &[],
            errors: &[],
        });
        assert!(report.starts_with("# Microsoft Learn Documentation Changes - 2025-06-03"));
        assert!(report.contains("**Total URLs Checked:** 3"));
        assert!(report.contains("## Errors\n\nNo errors detected."));
        assert!(!report.contains("Summary of Required Actions"));
    }

    #[test]
    fn changes_grouped_by_tier() {
        let mut critical = change("Walkthrough", Classification::Meaningful, Priority::Critical);
        critical.affected_guides = vec![AffectedGuide {
            control_id: "1.11".into(),
            guide_type: "portal-walkthrough".into(),
            file_path: "playbooks/control-implementations/1.11/portal-walkthrough.md".into(),
            priority: Priority::Critical,
        }];
        critical.affected_documents = vec![AffectedDocument {
            control_id: "1.11".into(),
            title: "Conditional Access".into(),
            file_path: "controls/pillar-1/1.11-ca.md".into(),
        }];
        let high = change("Policy", Classification::Meaningful, Priority::High);
        let mut minor = change("Glossary", Classification::Minor, Priority::Low);
        minor.reason = "General content update".into();

        let changes = vec![minor, high, critical];
        let report = render(&ReportInput {
            run_time: run_time(),
            total_urls: 10,
            changes: &changes,
            redirects: &[],
            errors: &[],
        });

        assert!(report.contains("**Meaningful Changes:** 2"));
        assert!(report.contains("**Minor Changes:** 1"));
        assert!(report.contains("| CRITICAL | 1 |"));
        assert!(report.contains("| HIGH | 1 |"));
        assert!(report.contains("| LOW | 1 |"));

        let crit_at = report.find("## CRITICAL").unwrap();
        let high_at = report.find("## HIGH").unwrap();
        let med_at = report.find("## MEDIUM").unwrap();
        assert!(crit_at < high_at && high_at < med_at);

        assert!(report.contains("- `playbooks/control-implementations/1.11/portal-walkthrough.md` ⚠️"));
        assert!(report.contains("- Control 1.11: Conditional Access (`controls/pillar-1/1.11-ca.md`)"));
        assert!(report.contains("```diff\n--- previous\n+++ current\n-old\n+new\n```"));
        assert!(report.contains("**Classification:** Minor (General content update)"));
        assert_eq!(report.matches("### 1. ").count(), 3);
    }

    #[test]
    fn redirects_and_errors_listed() {
        let redirects = vec![Redirect {
            original: "https://learn.microsoft.com/old".into(),
            final_url: "https://learn.microsoft.com/new".into(),
            topic: "Moved".into(),
        }];
        let errors = vec![
            FetchFailure {
                url: "https://learn.microsoft.com/gone".into(),
                topic: "Gone".into(),
                status: 404,
                error: None,
            },
            FetchFailure {
                url: "https://learn.microsoft.com/down".into(),
                topic: "Down".into(),
                status: 0,
                error: Some("connection refused".into()),
            },
        ];
        let report = render(&ReportInput {
            run_time: run_time(),
            total_urls: 3,
            changes: &[],
            redirects: &redirects,
            errors: &errors,
        });

        assert!(report.contains(
            "| Moved | https://learn.microsoft.com/old | https://learn.microsoft.com/new |"
        ));
        assert!(report.contains("- **Gone** (HTTP 404): https://learn.microsoft.com/gone"));
        assert!(report.contains("- **Down** (HTTP 0): https://learn.microsoft.com/down\n  - Error: connection refused"));
        assert!(!report.contains("No errors detected."));
    }

    #[test]
    fn long_diffs_are_capped() {
        let mut c = change("Big", Classification::Meaningful, Priority::High);
        c.diff_text = "+x".repeat(5000);
        let report = render(&ReportInput {
            run_time: run_time(),
            total_urls: 1,
            changes: std::slice::from_ref(&c),
            redirects: &[],
            errors: &[],
        });
        let start = report.find("```diff\n").unwrap() + "```diff\n".len();
        let end = report[start..].find("\n```").unwrap();
        assert_eq!(end, REPORT_DIFF_CHAR_LIMIT);
    }
}
