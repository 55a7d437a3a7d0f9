use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a monitor run needs to know about paths and politeness.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub project_root: PathBuf,
    pub watchlist_path: PathBuf,
    pub state_path: PathBuf,
    pub reports_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub fetch: FetchConfig,
    pub watchlist: WatchlistConfig,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Minimum spacing between consecutive requests.
    pub request_delay: Duration,
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Wait used when a 429 carries no usable Retry-After.
    pub default_retry_after: Duration,
    pub max_rate_limit_waits: u32,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("learn-monitor/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            request_delay: Duration::from_secs(1),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(60),
            max_rate_limit_waits: 3,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchlistConfig {
    pub monitored_host: String,
    /// A section is skipped when its name contains any of these.
    pub excluded_sections: Vec<String>,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            monitored_host: "learn.microsoft.com".to_string(),
            excluded_sections: vec![
                "Admin Portals".to_string(),
                "Microsoft Open Source Tools".to_string(),
                "Regulatory References".to_string(),
            ],
        }
    }
}

impl MonitorConfig {
    /// Default layout relative to a project root.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let project_root = root.into();
        let docs_dir = project_root.join("docs");
        Self {
            watchlist_path: docs_dir.join("reference").join("microsoft-learn-urls.md"),
            state_path: project_root.join("data").join("learn-monitor-state.json"),
            reports_dir: project_root.join("reports").join("learn-changes"),
            docs_dir,
            project_root,
            fetch: FetchConfig::default(),
            watchlist: WatchlistConfig::default(),
        }
    }

    /// Resolve the root (explicit flag, then `LEARN_MONITOR_ROOT`, then the
    /// working directory) and apply any path or fetch overrides from the
    /// environment.
    pub fn from_env(root_override: Option<PathBuf>) -> Self {
        let root = root_override
            .or_else(|| dotenv::var("LEARN_MONITOR_ROOT").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::for_root(root);

        if let Some(p) = env_path("LEARN_MONITOR_WATCHLIST", &config.project_root) {
            config.watchlist_path = p;
        }
        if let Some(p) = env_path("LEARN_MONITOR_STATE", &config.project_root) {
            config.state_path = p;
        }
        if let Some(p) = env_path("LEARN_MONITOR_REPORTS", &config.project_root) {
            config.reports_dir = p;
        }
        if let Some(p) = env_path("LEARN_MONITOR_DOCS", &config.project_root) {
            config.docs_dir = p;
        }
        if let Ok(ua) = dotenv::var("LEARN_MONITOR_USER_AGENT") {
            if !ua.trim().is_empty() {
                config.fetch.user_agent = ua;
            }
        }
        if let Some(ms) = env_u64("LEARN_MONITOR_DELAY_MS") {
            config.fetch.request_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("LEARN_MONITOR_TIMEOUT_SECS") {
            config.fetch.request_timeout = Duration::from_secs(secs);
        }

        config
    }
}

/// `LEARN_MONITOR_DEBUG` forces debug logging regardless of flags.
pub fn debug_forced() -> bool {
    dotenv::var("LEARN_MONITOR_DEBUG")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn env_path(key: &str, root: &Path) -> Option<PathBuf> {
    let value = dotenv::var(key).ok().filter(|v| !v.trim().is_empty())?;
    let path = PathBuf::from(value);
    Some(if path.is_absolute() { path } else { root.join(path) })
}

fn env_u64(key: &str) -> Option<u64> {
    dotenv::var(key).ok().and_then(|v| v.trim().parse().ok())
}
