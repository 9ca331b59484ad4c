//! Error types for websift.
//!
//! Recoverable failures (a single page fetch, an upstream search hiccup, a
//! durable cache outage) are turned into data at the lowest layer that can
//! handle them. The types here cover what is left: bad caller input,
//! configuration mistakes and genuinely unexpected internal failures.

use thiserror::Error;

/// The main error type for websift operations.
#[derive(Debug, Error)]
pub enum WebsiftError {
    /// The caller supplied missing or malformed input.
    #[error("{0}")]
    InvalidInput(String),

    /// A filter pattern failed to compile.
    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The HTTP client could not be built or used.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream search engine failed.
    #[error("{0}")]
    Search(#[from] SearchError),

    /// A cache tier failed.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebsiftError {
    /// Creates an input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error was caused by the caller's input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidPattern(_))
    }
}

/// Errors raised by a search backend.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The search request timed out.
    #[error("Search timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The search engine answered with an error status.
    #[error("Search engine returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Short description.
        message: String,
    },

    /// The request could not be sent or the body not read.
    #[error("Search request failed: {0}")]
    Transport(String),

    /// The results page could not be parsed.
    #[error("Failed to parse search results: {0}")]
    Parse(String),

    /// The engine is throttling us.
    #[error("Search rate limited")]
    RateLimited,
}

impl SearchError {
    /// Whether the failure is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) => false,
        }
    }
}

/// Errors raised by a cache tier.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The tier could not be reached.
    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),

    /// A tier operation did not complete in time.
    #[error("Cache operation '{operation}' timed out")]
    Timeout {
        /// The operation name.
        operation: &'static str,
    },

    /// A stored entry could not be encoded or decoded.
    #[error("Cache entry codec error: {0}")]
    Codec(String),

    /// The backing store rejected the command.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Result alias used across the crate.
pub type Result<T, E = WebsiftError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        let err = WebsiftError::invalid_input("query is required");
        assert!(err.is_input_error());
        assert_eq!(err.to_string(), "query is required");

        let err = WebsiftError::internal("boom");
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_invalid_pattern_is_input_error() {
        let regex_err = regex::Regex::new("(unclosed").unwrap_err();
        let err = WebsiftError::from(regex_err);
        assert!(err.is_input_error());
        assert!(err.to_string().starts_with("Invalid filter pattern"));
    }

    #[test]
    fn test_search_error_transience() {
        assert!(SearchError::RateLimited.is_transient());
        assert!(SearchError::Timeout { timeout_ms: 100 }.is_transient());
        assert!(SearchError::Status { status: 503, message: String::new() }.is_transient());
        assert!(!SearchError::Status { status: 404, message: String::new() }.is_transient());
        assert!(!SearchError::Parse("bad".to_string()).is_transient());
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::Timeout { operation: "get" };
        assert_eq!(err.to_string(), "Cache operation 'get' timed out");
    }
}
