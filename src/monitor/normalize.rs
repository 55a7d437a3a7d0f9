use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Structural elements and Learn page chrome that never count as content.
const IGNORED: &str = "script, style, nav, header, footer, aside, noscript, \
                       .feedback-section, .metadata, .contributors, .page-metadata";

/// Content roots, most specific first.
const CONTENT_ROOTS: &[&str] = &["main", "article", "div.content"];

pub const DATE_PLACEHOLDER: &str = "[DATE]";

static IGNORED_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(IGNORED).expect("valid ignore selector"));
static ROOT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_ROOTS
        .iter()
        .map(|s| Selector::parse(s).expect("valid root selector"))
        .collect()
});
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static DATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("valid regex"));

/// Reduce a page to the text that matters for change detection.
pub fn normalize_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let ignored: HashSet<_> = doc.select(&IGNORED_SELECTOR).map(|el| el.id()).collect();
    let is_ignored = |el: ElementRef<'_>| {
        ignored.contains(&el.id())
            || el
                .ancestors()
                .any(|a| ignored.contains(&a.id()))
    };

    let root = ROOT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).find(|el| !is_ignored(*el)))
        .unwrap_or_else(|| doc.root_element());

    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .any(|a| ignored.contains(&a.id()));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    normalize_text(&parts.join("\n"))
}

/// Whitespace and date normalization applied after text extraction.
pub fn normalize_text(text: &str) -> String {
    let text = BLANK_RUNS.replace_all(text, "\n\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = DATES.replace_all(&text, DATE_PLACEHOLDER);
    text.trim().to_string()
}

/// Content-addressed digest of normalized text.
pub fn content_hash(normalized: &str) -> String {
    format!("blake3:{}", blake3::hash(normalized.as_bytes()).to_hex())
}
