use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, redirect::Policy, StatusCode};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::types::FetchOutcome;
use crate::config::FetchConfig;

/// Source of page content for the run loop.
pub trait PageFetcher {
    /// Never fails: transport problems come back as an outcome with `error` set.
    async fn fetch(&mut self, url: &str) -> FetchOutcome;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    last_request: Option<Instant>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(Policy::limited(config.max_redirects))
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request: None,
        })
    }

    /// Keep consecutive requests at least `request_delay` apart.
    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.config.request_delay {
                tokio::time::sleep(self.config.request_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.backoff_base * 2u32.saturating_pow(attempt)
    }

    fn retry_after(&self, headers: &header::HeaderMap) -> Duration {
        headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_retry_after)
    }

    async fn send(&self, url: &str) -> Result<Response, reqwest::Error> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = if status == StatusCode::OK {
            resp.text().await?
        } else {
            String::new()
        };
        Ok(Response {
            status,
            final_url,
            headers,
            body,
        })
    }
}

struct Response {
    status: StatusCode,
    final_url: Url,
    headers: header::HeaderMap,
    body: String,
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&mut self, url: &str) -> FetchOutcome {
        self.throttle().await;

        let requested = Url::parse(url).ok();
        let mut attempt = 0;
        let mut rate_limit_waits = 0;

        loop {
            match self.send(url).await {
                Ok(resp) if resp.status == StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limit_waits >= self.config.max_rate_limit_waits {
                        return FetchOutcome::failed(
                            url,
                            resp.status.as_u16(),
                            "rate limited: retry budget exhausted",
                        );
                    }
                    rate_limit_waits += 1;
                    let wait = self.retry_after(&resp.headers);
                    println!("  Rate limited, waiting {}s...", wait.as_secs());
                    warn!(url, wait_secs = wait.as_secs(), "rate limited");
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) => {
                    let was_redirected = match &requested {
                        Some(req) => *req != resp.final_url,
                        None => resp.final_url.as_str() != url,
                    };
                    debug!(
                        url,
                        status = resp.status.as_u16(),
                        final_url = %resp.final_url,
                        bytes = resp.body.len(),
                        "fetched"
                    );
                    return FetchOutcome {
                        url: url.to_string(),
                        status_code: resp.status.as_u16(),
                        content: resp.body,
                        final_url: resp.final_url.to_string(),
                        was_redirected,
                        error: None,
                    };
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        warn!(url, attempts = attempt, error = %e, "giving up");
                        return FetchOutcome::failed(url, 0, e.to_string());
                    }
                    let wait = self.backoff(attempt - 1);
                    debug!(url, attempt, wait_ms = wait.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn fast_config() -> FetchConfig {
        FetchConfig {
            request_timeout: Duration::from_secs(5),
            request_delay: Duration::from_millis(0),
            backoff_base: Duration::from_millis(1),
            default_retry_after: Duration::from_millis(0),
            ..FetchConfig::default()
        }
    }

    /// Serve canned raw HTTP responses, one per connection, repeating the last.
    async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let response = responses[n.min(responses.len() - 1)].clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = Vec::new();
                    while !read.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(k) => read.extend_from_slice(&buf[..k]),
                        }
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (base, hits)
    }

    fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let (base, _) = serve(vec![response("200 OK", "", "<main>hi</main>")]).await;
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();
        let url = format!("{base}/page");

        let outcome = fetcher.fetch(&url).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.content, "<main>hi</main>");
        assert!(!outcome.was_redirected);
        assert_eq!(outcome.final_url, url);
    }

    #[tokio::test]
    async fn non_200_has_no_body_and_no_error() {
        let (base, _) = serve(vec![response("404 Not Found", "", "gone")]).await;
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();

        let outcome = fetcher.fetch(&format!("{base}/missing")).await;
        assert_eq!(outcome.status_code, 404);
        assert!(outcome.content.is_empty());
        assert!(outcome.error.is_none());
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn honors_retry_after_then_succeeds() {
        let (base, hits) = serve(vec![
            response("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            response("200 OK", "", "ok"),
        ])
        .await;
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();

        let outcome = fetcher.fetch(&format!("{base}/busy")).await;
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.content, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_budget_is_bounded() {
        let (base, hits) = serve(vec![response("429 Too Many Requests", "", "")]).await;
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();

        let outcome = fetcher.fetch(&format!("{base}/busy")).await;
        assert_eq!(outcome.status_code, 429);
        assert!(outcome.error.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn tracks_redirects() {
        let (base, _) = serve(vec![
            response("301 Moved Permanently", "Location: /moved\r\n", ""),
            response("200 OK", "", "moved content"),
        ])
        .await;
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();

        let outcome = fetcher.fetch(&format!("{base}/old")).await;
        assert_eq!(outcome.status_code, 200);
        assert!(outcome.was_redirected);
        assert_eq!(outcome.final_url, format!("{base}/moved"));
        assert_eq!(outcome.content, "moved content");
    }

    #[tokio::test]
    async fn transport_failure_exhausts_retries_without_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut fetcher = HttpFetcher::new(fast_config()).unwrap();

        let outcome = fetcher.fetch(&format!("http://{addr}/down")).await;
        assert_eq!(outcome.status_code, 0);
        assert!(outcome.error.is_some());
        assert!(outcome.content.is_empty());
        assert!(!outcome.was_redirected);
    }

    #[tokio::test]
    async fn consecutive_fetches_are_spaced() {
        let (base, _) = serve(vec![response("200 OK", "", "x")]).await;
        let mut fetcher = HttpFetcher::new(FetchConfig {
            request_delay: Duration::from_millis(200),
            ..fast_config()
        })
        .unwrap();

        let start = std::time::Instant::now();
        fetcher.fetch(&format!("{base}/a")).await;
        fetcher.fetch(&format!("{base}/b")).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
