//! Data models shared by the search, fetch and pipeline layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::extract::extract_title_from_content;

/// A search result accepted by the search adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    /// The result URL.
    pub url: String,
    /// The result title as reported by the search engine.
    #[serde(default)]
    pub title: String,
}

impl SearchHit {
    /// Creates a new search hit.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// A result as yielded by a search backend, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHit {
    /// The result URL, if the engine reported one.
    pub url: Option<String>,
    /// The result title.
    pub title: String,
}

impl RawHit {
    /// Creates a raw hit with a URL.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            title: title.into(),
        }
    }
}

/// Where a fetched page's content came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// Fetched directly from the page URL.
    #[default]
    Direct,
}

impl FetchSource {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
        }
    }
}

/// The outcome of fetching a single URL.
///
/// Either `content`/`title` are populated (success) or `error` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    url: String,
    success: bool,
    content: String,
    title: String,
    error: Option<String>,
    source: FetchSource,
}

impl FetchOutcome {
    /// Creates a successful outcome, deriving the title from a leading `# ` line.
    #[must_use]
    pub fn success(url: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let title = extract_title_from_content(&content).to_string();
        Self {
            url: url.into(),
            success: true,
            content,
            title,
            error: None,
            source: FetchSource::Direct,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            content: String::new(),
            title: String::new(),
            error: Some(error.into()),
            source: FetchSource::Direct,
        }
    }

    /// The fetched URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the fetch succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Extracted content (empty on failure).
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Page title (empty on failure or when none was found).
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Failure reason.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Content source.
    #[must_use]
    pub fn source(&self) -> FetchSource {
        self.source
    }

    /// Content length in characters.
    #[must_use]
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }

    /// Converts to the object shape returned by `fetch_page`.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("url".to_string(), serde_json::json!(self.url));
        map.insert("success".to_string(), serde_json::json!(self.success));
        map.insert("source".to_string(), serde_json::json!(self.source.as_str()));
        if self.success {
            map.insert("title".to_string(), serde_json::json!(self.title));
            map.insert("content".to_string(), serde_json::json!(self.content));
        } else {
            map.insert("error".to_string(), serde_json::json!(self.error));
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for FetchOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_dict().serialize(serializer)
    }
}

/// Counters accumulated during one research run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// The research query.
    pub query: String,
    /// URLs discovered by the search producer.
    pub urls_searched: usize,
    /// Successful fetches.
    pub urls_fetched: usize,
    /// Failed fetches.
    pub urls_failed: usize,
    /// Total characters of successful content.
    pub content_chars: usize,
}

impl RunStatistics {
    /// Creates empty statistics for a query.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Folds one fetch outcome into the counters.
    pub fn record(&mut self, outcome: &FetchOutcome) {
        if outcome.is_success() {
            self.urls_fetched += 1;
            self.content_chars += outcome.content_chars();
        } else {
            self.urls_failed += 1;
        }
    }
}

/// Response format for the research operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Structured list of pages.
    #[default]
    Json,
    /// Plain text blocks separated by `=== url ===` headers.
    Raw,
    /// A markdown report.
    Markdown,
}

impl OutputFormat {
    /// Parses a format name, falling back to JSON for unknown names.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Raw => "raw",
            Self::Markdown => "markdown",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "raw" => Ok(Self::Raw),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
