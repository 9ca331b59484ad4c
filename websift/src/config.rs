//! Configuration types for research runs and the service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::make_cache_key;
use crate::models::OutputFormat;

/// Upper bound on parallel fetches in one run.
pub const MAX_CONCURRENT_FETCHES: usize = 256;

/// Upper bound on URLs buffered between the search and the fetchers.
pub const MAX_URL_QUEUE: usize = 200;

/// Parameters of one research run.
///
/// Only `query`, `search_results`, `fetch_count` and `max_content_length`
/// influence the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    /// The search query.
    pub query: String,
    /// Number of search results to request.
    #[serde(default = "default_search_results")]
    pub search_results: usize,
    /// Maximum pages to fetch; 0 fetches every result.
    #[serde(default)]
    pub fetch_count: usize,
    /// Maximum characters kept per page.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Minimum characters for a page to count as fetched.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    /// Per-fetch timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Maximum parallel fetches.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Response format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_search_results() -> usize {
    50
}

fn default_max_content_length() -> usize {
    5000
}

fn default_min_content_length() -> usize {
    600
}

fn default_timeout() -> u64 {
    20
}

fn default_max_concurrent() -> usize {
    20
}

impl RunParameters {
    /// Creates parameters with defaults for a query.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_results: default_search_results(),
            fetch_count: 0,
            max_content_length: default_max_content_length(),
            min_content_length: default_min_content_length(),
            timeout: default_timeout(),
            max_concurrent: default_max_concurrent(),
            output_format: OutputFormat::default(),
        }
    }

    /// Sets the number of search results.
    #[must_use]
    pub fn with_search_results(mut self, count: usize) -> Self {
        self.search_results = count;
        self
    }

    /// Sets the fetch cap.
    #[must_use]
    pub fn with_fetch_count(mut self, count: usize) -> Self {
        self.fetch_count = count;
        self
    }

    /// Sets the per-page content bounds.
    #[must_use]
    pub fn with_content_length(mut self, min: usize, max: usize) -> Self {
        self.min_content_length = min;
        self.max_content_length = max;
        self
    }

    /// Sets the per-fetch timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// The per-fetch limits derived from these parameters.
    #[must_use]
    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(self.timeout),
            min_length: self.min_content_length,
            max_length: self.max_content_length,
        }
    }

    /// Effective concurrency, within `1..=MAX_CONCURRENT_FETCHES`.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.max_concurrent.clamp(1, MAX_CONCURRENT_FETCHES)
    }

    /// Capacity of the URL queue, within `1..=MAX_URL_QUEUE`.
    #[must_use]
    pub fn url_queue_capacity(&self) -> usize {
        self.search_results.clamp(1, MAX_URL_QUEUE)
    }

    /// Stable cache fingerprint over the result-shaping parameters.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        make_cache_key(
            &self.query,
            [
                ("search_results", serde_json::json!(self.search_results)),
                ("fetch_count", serde_json::json!(self.fetch_count)),
                ("max_content_length", serde_json::json!(self.max_content_length)),
            ],
        )
    }
}

/// Limits applied to a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLimits {
    /// Request timeout.
    pub timeout: Duration,
    /// Minimum extracted length in characters.
    pub min_length: usize,
    /// Maximum extracted length in characters before truncation.
    pub max_length: usize,
}

impl FetchLimits {
    /// Creates fetch limits.
    #[must_use]
    pub fn new(timeout: Duration, min_length: usize, max_length: usize) -> Self {
        Self {
            timeout,
            min_length,
            max_length,
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        RunParameters::new("").fetch_limits()
    }
}

/// Process-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Fast-tier entry time-to-live in seconds.
    #[serde(default = "default_memory_ttl")]
    pub cache_ttl_memory_seconds: u64,
    /// Fast-tier capacity.
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Durable-tier entry time-to-live in seconds.
    #[serde(default = "default_durable_ttl")]
    pub cache_ttl_durable_seconds: u64,
    /// Durable-tier URL; the durable tier is disabled when unset.
    #[serde(default)]
    pub cache_durable_url: Option<String>,
    /// Whether fetches verify TLS certificates.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Characters shown per page in markdown output before the ellipsis.
    #[serde(default)]
    pub markdown_preview_chars: Option<usize>,
}

fn default_memory_ttl() -> u64 {
    3600
}

fn default_cache_max_size() -> usize {
    128
}

fn default_durable_ttl() -> u64 {
    86_400
}

fn default_verify_tls() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_memory_seconds: default_memory_ttl(),
            cache_max_size: default_cache_max_size(),
            cache_ttl_durable_seconds: default_durable_ttl(),
            cache_durable_url: None,
            verify_tls: default_verify_tls(),
            markdown_preview_chars: None,
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the process environment.
    ///
    /// Recognised variables: `CACHE_TTL_MEM`, `CACHE_MAX_SIZE`,
    /// `CACHE_TTL_DURABLE`, `CACHE_DURABLE_URL` (or `REDIS_URL`),
    /// `VERIFY_TLS`, `MARKDOWN_PREVIEW_CHARS`. Unparseable values fall back
    /// to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse().ok());

        Self {
            cache_ttl_memory_seconds: parsed("CACHE_TTL_MEM")
                .unwrap_or(defaults.cache_ttl_memory_seconds),
            cache_max_size: parsed("CACHE_MAX_SIZE")
                .map(|v: u64| usize::try_from(v).unwrap_or(usize::MAX))
                .unwrap_or(defaults.cache_max_size),
            cache_ttl_durable_seconds: parsed("CACHE_TTL_DURABLE")
                .unwrap_or(defaults.cache_ttl_durable_seconds),
            cache_durable_url: lookup("CACHE_DURABLE_URL")
                .or_else(|| lookup("REDIS_URL"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            verify_tls: lookup("VERIFY_TLS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.verify_tls),
            markdown_preview_chars: parsed("MARKDOWN_PREVIEW_CHARS")
                .map(|v: u64| usize::try_from(v).unwrap_or(usize::MAX)),
        }
    }

    /// Sets the fast-tier capacity and TTL.
    #[must_use]
    pub fn with_memory_cache(mut self, max_size: usize, ttl_seconds: u64) -> Self {
        self.cache_max_size = max_size;
        self.cache_ttl_memory_seconds = ttl_seconds;
        self
    }

    /// Enables the durable tier.
    #[must_use]
    pub fn with_durable_url(mut self, url: impl Into<String>) -> Self {
        self.cache_durable_url = Some(url.into());
        self
    }

    /// Sets TLS verification.
    #[must_use]
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Fast-tier TTL as a duration.
    #[must_use]
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_memory_seconds)
    }

    /// Durable-tier TTL as a duration.
    #[must_use]
    pub fn durable_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_durable_seconds)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
