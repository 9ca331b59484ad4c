//! DuckDuckGo search backend.
//!
//! Uses the JavaScript-free HTML endpoint. Result pages are fetched one at a
//! time as the returned iterator is consumed.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

use super::{RawHits, SearchBackend};
use crate::errors::SearchError;
use crate::extract::clean_text;
use crate::fetch::random_user_agent;
use crate::models::RawHit;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Per-page request timeout.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// DuckDuckGo HTML search backend. No API key required.
#[derive(Debug, Clone)]
pub struct DuckDuckGoBackend {
    endpoint: String,
    verify_tls: bool,
}

impl Default for DuckDuckGoBackend {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DuckDuckGoBackend {
    /// Creates a backend against the public endpoint.
    #[must_use]
    pub fn new(verify_tls: bool) -> Self {
        Self {
            endpoint: DDG_HTML_URL.to_string(),
            verify_tls,
        }
    }

    /// Points the backend at a different endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl SearchBackend for DuckDuckGoBackend {
    fn text(&self, query: &str, max_results: usize) -> Result<RawHits, SearchError> {
        // Built here so that it is created and dropped on the blocking thread.
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .user_agent(random_user_agent())
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Box::new(ResultPages {
            client,
            endpoint: self.endpoint.clone(),
            query: query.to_string(),
            max_results,
            offset: 0,
            yielded: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

struct ResultPages {
    client: Client,
    endpoint: String,
    query: String,
    max_results: usize,
    offset: usize,
    yielded: usize,
    buffer: VecDeque<RawHit>,
    exhausted: bool,
}

impl ResultPages {
    fn fetch_page(&self) -> Result<Vec<RawHit>, SearchError> {
        let offset = self.offset.to_string();
        let mut form = vec![("q", self.query.as_str())];
        if self.offset > 0 {
            form.push(("s", offset.as_str()));
            form.push(("dc", offset.as_str()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .map_err(|e| map_transport(&e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::ACCEPTED | StatusCode::TOO_MANY_REQUESTS => {
                return Err(SearchError::RateLimited)
            }
            status => {
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    message: "DuckDuckGo request failed".to_string(),
                })
            }
        }

        let html = response.text().map_err(|e| map_transport(&e))?;
        parse_results(&html)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn map_transport(e: &reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout {
            timeout_ms: SEARCH_TIMEOUT.as_millis() as u64,
        }
    } else {
        SearchError::Transport(e.to_string())
    }
}

impl Iterator for ResultPages {
    type Item = Result<RawHit, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= self.max_results {
            return None;
        }

        if self.buffer.is_empty() && !self.exhausted {
            match self.fetch_page() {
                Ok(page) if page.is_empty() => self.exhausted = true,
                Ok(page) => {
                    self.offset += page.len();
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let hit = self.buffer.pop_front()?;
        self.yielded += 1;
        Some(Ok(hit))
    }
}

/// Parses the result anchors of a DuckDuckGo HTML results page.
pub fn parse_results(html: &str) -> Result<Vec<RawHit>, SearchError> {
    let selector =
        Selector::parse("a.result__a").map_err(|e| SearchError::Parse(e.to_string()))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|anchor| RawHit {
            url: anchor.value().attr("href").and_then(resolve_result_url),
            title: clean_text(&anchor.text().collect::<String>()),
        })
        .collect())
}

/// Resolves a result link, unwrapping DuckDuckGo's `uddg=` redirect.
#[must_use]
pub fn resolve_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    if absolute.contains("uddg=") {
        let parsed = Url::parse(&absolute).ok()?;
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }

    absolute.starts_with("http").then_some(absolute)
}
