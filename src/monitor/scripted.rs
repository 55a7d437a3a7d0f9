//! In-memory [`PageFetcher`] for driving the run loop without a network.

use std::collections::{HashMap, VecDeque};

use super::fetch::PageFetcher;
use super::types::FetchOutcome;

/// Hands out queued outcomes per URL; the last one repeats.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, VecDeque<FetchOutcome>>,
}

impl ScriptedFetcher {
    pub fn page(self, url: &str, body: &str) -> Self {
        self.push(url, ok(url, url, body))
    }

    pub fn push(mut self, url: &str, outcome: FetchOutcome) -> Self {
        self.pages.entry(url.to_string()).or_default().push_back(outcome);
        self
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&mut self, url: &str) -> FetchOutcome {
        let queue = self.pages.get_mut(url).expect("scripted url");
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// A 200 response whose body sits inside `<main>` next to some page chrome.
pub fn ok(url: &str, final_url: &str, body: &str) -> FetchOutcome {
    FetchOutcome {
        url: url.to_string(),
        status_code: 200,
        content: format!("<html><body><nav>Menu</nav><main>{body}</main></body></html>"),
        final_url: final_url.to_string(),
        was_redirected: url != final_url,
        error: None,
    }
}
