//! Web search.
//!
//! A [`SearchBackend`] talks to the upstream engine and yields raw hits.
//! The [`SearchAdapter`] on top of it validates, deduplicates and filters
//! those hits into a bounded, lazy sequence of [`SearchHit`](crate::models::SearchHit)s.

mod adapter;
#[cfg(feature = "duckduckgo")]
mod duckduckgo;

pub use adapter::{is_valid_url, SearchAdapter, SearchHits};
#[cfg(feature = "duckduckgo")]
pub use duckduckgo::{parse_results, resolve_result_url, DuckDuckGoBackend};

use crate::errors::SearchError;
use crate::models::RawHit;

/// A lazy, best-effort sequence of raw results.
///
/// An `Err` item ends the sequence early.
pub type RawHits = Box<dyn Iterator<Item = Result<RawHit, SearchError>> + Send>;

/// A blocking search engine client.
///
/// Implementations may perform network IO on every call to `next` of the
/// returned iterator, so they must only be driven from a blocking context.
#[cfg_attr(test, mockall::automock)]
pub trait SearchBackend: Send + Sync {
    /// Starts a search for up to `max_results` ranked results.
    fn text(&self, query: &str, max_results: usize) -> Result<RawHits, SearchError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str {
        "custom"
    }
}
