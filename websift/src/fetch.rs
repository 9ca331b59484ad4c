//! Page fetching.
//!
//! A [`Fetcher`] turns a URL into a [`FetchOutcome`] and never fails: every
//! transport, status, size or content problem becomes a failed outcome with a
//! short reason.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::FetchLimits;
use crate::errors::Result;
use crate::extract::extract_text;
use crate::filters::FilterRegistry;
use crate::models::FetchOutcome;

/// Larger bodies are rejected, unread when declared up front.
pub const MAX_CONTENT_BYTES: u64 = 2_000_000;

/// Appended to content cut at the length limit.
pub const TRUNCATION_MARKER: &str = "\n\n[Truncated...]";

/// Idle keep-alive for pooled connections.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP/TLS connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml";

/// Desktop browser user agents.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Safari/605.1.15",
];

/// Picks one of [`USER_AGENTS`] at random.
#[must_use]
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Fetches a single page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and returns its extracted text or a failure reason.
    ///
    /// An empty `user_agent` selects a random one.
    async fn fetch(&self, url: &str, limits: &FetchLimits, user_agent: &str) -> FetchOutcome;
}

/// Fetcher over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    filters: FilterRegistry,
}

impl HttpFetcher {
    /// Builds a fetcher whose pool keeps up to `max_concurrent` idle
    /// connections per host.
    pub fn new(max_concurrent: usize, verify_tls: bool, filters: FilterRegistry) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_concurrent.max(1))
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(Self::with_client(client, filters))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client, filters: FilterRegistry) -> Self {
        Self { client, filters }
    }

    async fn fetch_inner(
        &self,
        url: &str,
        limits: &FetchLimits,
        user_agent: &str,
    ) -> std::result::Result<FetchOutcome, reqwest::Error> {
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, ACCEPT_HTML)
            .timeout(limits.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchOutcome::failure(url, format!("HTTP {}", status.as_u16())));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared.is_some_and(|len| len > MAX_CONTENT_BYTES) {
            return Ok(FetchOutcome::failure(url, "Content too large"));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let total = u64::try_from(bytes.len() + chunk.len()).unwrap_or(u64::MAX);
            if total > MAX_CONTENT_BYTES {
                return Ok(FetchOutcome::failure(url, "Content too large"));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);
        let filters = self.filters.snapshot();
        if filters.is_blocked_content(&body) {
            return Ok(FetchOutcome::failure(url, "CAPTCHA/blocked"));
        }

        let content = extract_text(&body, &filters);
        Ok(outcome_from_content(url, content, limits))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, limits: &FetchLimits, user_agent: &str) -> FetchOutcome {
        let user_agent = if user_agent.is_empty() {
            random_user_agent()
        } else {
            user_agent
        };

        match self.fetch_inner(url, limits, user_agent).await {
            Ok(outcome) => {
                tracing::debug!(
                    url = %url,
                    success = outcome.is_success(),
                    chars = outcome.content_chars(),
                    error = outcome.error().unwrap_or(""),
                    "Fetched page"
                );
                outcome
            }
            Err(e) if e.is_timeout() => {
                tracing::debug!(url = %url, "Fetch timed out");
                FetchOutcome::failure(url, "Timeout")
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Request error");
                FetchOutcome::failure(url, "Request error")
            }
        }
    }
}

/// Applies the length bounds to extracted text.
///
/// Empty content always fails, whatever `min_length` is.
#[must_use]
pub fn outcome_from_content(url: &str, content: String, limits: &FetchLimits) -> FetchOutcome {
    let chars = content.chars().count();
    if content.is_empty() || chars < limits.min_length {
        return FetchOutcome::failure(url, "Content too short or empty");
    }
    if chars > limits.max_length {
        let mut truncated: String = content.chars().take(limits.max_length).collect();
        truncated.push_str(TRUNCATION_MARKER);
        return FetchOutcome::success(url, truncated);
    }
    FetchOutcome::success(url, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{no_proxy_client, Route, TestServer};

    const ARTICLE: &str = "<html><head><title>Test Article</title></head><body>\
        <p>This is a long paragraph of article text that is comfortably above any small minimum.</p>\
        <p>And here is a second paragraph that adds a little more readable content to the page.</p>\
        </body></html>";

    fn limits(min: usize, max: usize) -> FetchLimits {
        FetchLimits::new(Duration::from_secs(5), min, max)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::with_client(no_proxy_client(), FilterRegistry::new())
    }

    #[test]
    fn test_random_user_agent_from_pool() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }

    #[test]
    fn test_outcome_truncates_by_chars() {
        let outcome = outcome_from_content("https://a.com", "é".repeat(50), &limits(10, 20));
        assert!(outcome.is_success());
        assert_eq!(outcome.content(), format!("{}{TRUNCATION_MARKER}", "é".repeat(20)));
    }

    #[test]
    fn test_outcome_too_short_or_empty() {
        let short = outcome_from_content("https://a.com", "tiny".to_string(), &limits(10, 20));
        assert_eq!(short.error(), Some("Content too short or empty"));

        let empty = outcome_from_content("https://a.com", String::new(), &limits(0, 20));
        assert_eq!(empty.error(), Some("Content too short or empty"));
    }

    #[tokio::test]
    async fn test_fetch_success_extracts_title() {
        let server = TestServer::start(vec![("/article", Route::html(ARTICLE))]).await;
        let outcome = fetcher()
            .fetch(&server.url("/article"), &limits(50, 5000), "")
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.title(), "Test Article");
        assert!(outcome.content().contains("second paragraph"));
    }

    #[tokio::test]
    async fn test_fetch_maps_status() {
        let server = TestServer::start(vec![("/missing", Route::status(404, "nope"))]).await;
        let outcome = fetcher()
            .fetch(&server.url("/missing"), &limits(0, 5000), "test-agent")
            .await;
        assert_eq!(outcome.error(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_declared_oversize() {
        let server = TestServer::start(vec![(
            "/huge",
            Route::html(ARTICLE).with_declared_length(MAX_CONTENT_BYTES + 1),
        )])
        .await;
        let outcome = fetcher()
            .fetch(&server.url("/huge"), &limits(0, 5000), "")
            .await;
        assert_eq!(outcome.error(), Some("Content too large"));
    }

    #[tokio::test]
    async fn test_fetch_caps_undeclared_body() {
        let oversized = format!(
            "<html><body><p>{}</p></body></html>",
            "a".repeat(usize::try_from(MAX_CONTENT_BYTES).unwrap())
        );
        let server = TestServer::start(vec![
            ("/stream", Route::html(&oversized).without_length()),
            ("/article", Route::html(ARTICLE).without_length()),
        ])
        .await;

        let outcome = fetcher()
            .fetch(&server.url("/stream"), &limits(0, 5000), "")
            .await;
        assert_eq!(outcome.error(), Some("Content too large"));

        let outcome = fetcher()
            .fetch(&server.url("/article"), &limits(50, 5000), "")
            .await;
        assert!(outcome.is_success(), "{:?}", outcome.error());
    }

    #[tokio::test]
    async fn test_fetch_sends_accept_and_user_agent() {
        let server = TestServer::start(vec![("/article", Route::html(ARTICLE))]).await;
        fetcher()
            .fetch(&server.url("/article"), &limits(0, 5000), "websift-test/1.0")
            .await;
        fetcher()
            .fetch(&server.url("/article"), &limits(0, 5000), "")
            .await;

        let heads: Vec<String> = server.requests().iter().map(|h| h.to_lowercase()).collect();
        assert_eq!(heads.len(), 2);
        assert!(heads[0].contains("\r\naccept: text/html,application/xhtml+xml\r\n"));
        assert!(heads[0].contains("\r\nuser-agent: websift-test/1.0\r\n"));

        assert!(USER_AGENTS
            .iter()
            .any(|agent| heads[1].contains(&format!("\r\nuser-agent: {}\r\n", agent.to_lowercase()))));
    }

    #[tokio::test]
    async fn test_fetch_detects_block_page() {
        let html = "<html><body><p>Please verify you are human before continuing to the site.</p></body></html>";
        let server = TestServer::start(vec![("/wall", Route::html(html))]).await;
        let outcome = fetcher()
            .fetch(&server.url("/wall"), &limits(0, 5000), "")
            .await;
        assert_eq!(outcome.error(), Some("CAPTCHA/blocked"));
    }

    #[tokio::test]
    async fn test_fetch_short_content() {
        let server = TestServer::start(vec![("/article", Route::html(ARTICLE))]).await;
        let outcome = fetcher()
            .fetch(&server.url("/article"), &limits(10_000, 20_000), "")
            .await;
        assert_eq!(outcome.error(), Some("Content too short or empty"));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = TestServer::start(vec![(
            "/slow",
            Route::html(ARTICLE).with_delay(Duration::from_secs(3)),
        )])
        .await;
        let quick = FetchLimits::new(Duration::from_millis(200), 0, 5000);
        let outcome = fetcher().fetch(&server.url("/slow"), &quick, "").await;
        assert_eq!(outcome.error(), Some("Timeout"));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = fetcher()
            .fetch(&format!("http://{addr}/gone"), &limits(0, 5000), "")
            .await;
        assert_eq!(outcome.error(), Some("Request error"));
    }
}
