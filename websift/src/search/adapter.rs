//! Validation, deduplication and filtering of raw search results.

use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::{RawHits, SearchBackend};
use crate::filters::{FilterRegistry, FilterSnapshot};
use crate::models::{RawHit, SearchHit};

/// Whether `url` is an absolute http(s) URL with a host.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| !host.is_empty())
    })
}

/// Produces clean, unique, fetchable search hits.
#[derive(Clone)]
pub struct SearchAdapter {
    backend: Arc<dyn SearchBackend>,
    filters: FilterRegistry,
}

impl std::fmt::Debug for SearchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAdapter")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl SearchAdapter {
    /// Creates an adapter over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>, filters: FilterRegistry) -> Self {
        Self { backend, filters }
    }

    /// Returns a lazy sequence of at most `count` accepted hits.
    ///
    /// Twice as many raw results are requested to make up for rejects.
    /// Nothing is sent upstream until the sequence is first polled.
    #[must_use]
    pub fn search(&self, query: &str, count: usize) -> SearchHits {
        SearchHits {
            backend: Some(Arc::clone(&self.backend)),
            query: query.to_string(),
            requested: count.saturating_mul(2),
            remaining: count,
            raw: None,
            seen: HashSet::new(),
            filters: self.filters.snapshot(),
        }
    }
}

/// Iterator returned by [`SearchAdapter::search`].
pub struct SearchHits {
    backend: Option<Arc<dyn SearchBackend>>,
    query: String,
    requested: usize,
    remaining: usize,
    raw: Option<RawHits>,
    seen: HashSet<String>,
    filters: Arc<FilterSnapshot>,
}

impl SearchHits {
    fn accept(&mut self, hit: RawHit) -> Option<SearchHit> {
        let url = hit.url.filter(|u| !u.is_empty())?;
        if self.seen.contains(&url) || !is_valid_url(&url) || self.filters.is_blocked_url(&url) {
            tracing::trace!(url = %url, "Rejected search hit");
            return None;
        }
        self.seen.insert(url.clone());
        Some(SearchHit::new(url, hit.title))
    }

    fn finish(&mut self) {
        self.backend = None;
        self.raw = None;
    }
}

impl Iterator for SearchHits {
    type Item = SearchHit;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            self.finish();
            return None;
        }

        if let Some(backend) = self.backend.take() {
            match backend.text(&self.query, self.requested) {
                Ok(raw) => self.raw = Some(raw),
                Err(e) => {
                    tracing::warn!(
                        query = %self.query,
                        backend = backend.name(),
                        error = %e,
                        transient = e.is_transient(),
                        "Search failed"
                    );
                    return None;
                }
            }
        }

        loop {
            let item = self.raw.as_mut()?.next();
            match item {
                None => {
                    self.finish();
                    return None;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        query = %self.query,
                        error = %e,
                        transient = e.is_transient(),
                        "Search ended early"
                    );
                    self.finish();
                    return None;
                }
                Some(Ok(hit)) => {
                    if let Some(accepted) = self.accept(hit) {
                        self.remaining -= 1;
                        if self.remaining == 0 {
                            self.finish();
                        }
                        return Some(accepted);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SearchError;
    use crate::search::MockSearchBackend;
    use pretty_assertions::assert_eq;

    fn hits(items: Vec<Result<RawHit, SearchError>>) -> RawHits {
        Box::new(items.into_iter())
    }

    fn urls(found: impl Iterator<Item = SearchHit>) -> Vec<String> {
        found.map(|h| h.url).collect()
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com/a"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("/relative/path"));
        assert!(!is_valid_url("mailto:someone@example.com"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn test_requests_double_and_filters() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_text()
            .withf(|query, max| query == "rust" && *max == 6)
            .times(1)
            .returning(|_, _| {
                Ok(hits(vec![
                    Ok(RawHit::new("https://a.com/1", "A")),
                    Ok(RawHit::new("https://a.com/1", "A again")),
                    Ok(RawHit::new("https://reddit.com/r/rust", "R")),
                    Ok(RawHit { url: None, title: "no url".to_string() }),
                    Ok(RawHit::new("not a url", "bad")),
                    Ok(RawHit::new("https://b.com/tag/x", "tag page")),
                    Ok(RawHit::new("https://c.com/2", "C")),
                    Ok(RawHit::new("https://d.com/3", "D")),
                    Ok(RawHit::new("https://e.com/4", "E")),
                ]))
            });

        let adapter = SearchAdapter::new(Arc::new(backend), FilterRegistry::new());
        let found: Vec<SearchHit> = adapter.search("rust", 3).collect();

        assert_eq!(
            found,
            vec![
                SearchHit::new("https://a.com/1", "A"),
                SearchHit::new("https://c.com/2", "C"),
                SearchHit::new("https://d.com/3", "D"),
            ]
        );
    }

    #[test]
    fn test_backend_error_at_start_yields_nothing() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_text()
            .returning(|_, _| Err(SearchError::RateLimited));
        backend.expect_name().return_const("mock");

        let adapter = SearchAdapter::new(Arc::new(backend), FilterRegistry::new());
        assert_eq!(adapter.search("q", 5).count(), 0);
    }

    #[test]
    fn test_mid_stream_error_ends_sequence() {
        let mut backend = MockSearchBackend::new();
        backend.expect_text().returning(|_, _| {
            Ok(hits(vec![
                Ok(RawHit::new("https://a.com/1", "A")),
                Err(SearchError::Transport("connection reset".to_string())),
                Ok(RawHit::new("https://b.com/2", "B")),
            ]))
        });

        let adapter = SearchAdapter::new(Arc::new(backend), FilterRegistry::new());
        assert_eq!(urls(adapter.search("q", 5)), vec!["https://a.com/1"]);
    }

    #[test]
    fn test_lazy_until_polled() {
        let mut backend = MockSearchBackend::new();
        backend.expect_text().times(0);

        let adapter = SearchAdapter::new(Arc::new(backend), FilterRegistry::new());
        let hits = adapter.search("q", 5);
        drop(hits);
    }

    #[test]
    fn test_zero_count_never_calls_backend() {
        let mut backend = MockSearchBackend::new();
        backend.expect_text().times(0);

        let adapter = SearchAdapter::new(Arc::new(backend), FilterRegistry::new());
        assert_eq!(adapter.search("q", 0).count(), 0);
    }
}
