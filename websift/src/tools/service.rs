//! The research service: tool handlers over the search, fetch and cache
//! layers.

use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::arguments::{missing, Arguments};
use super::definitions::{names, uris, ToolResponse};
use crate::cache::ResearchCache;
use crate::config::{FetchLimits, RunParameters, ServiceConfig};
use crate::errors::{Result, WebsiftError};
use crate::events::{progress_payload, EventSink, NoOpEventSink, RESEARCH_PROGRESS};
use crate::fetch::{random_user_agent, Fetcher, HttpFetcher};
use crate::filters::{FilterRegistry, FilterUpdate};
use crate::format::{format_json, format_markdown, format_raw};
use crate::models::{FetchOutcome, OutputFormat, RunStatistics, SearchHit};
use crate::pipeline::{Pipeline, ResearchStream, UNEXPECTED_ERROR};
use crate::search::{SearchAdapter, SearchBackend};

/// Default of `search_web`'s `num_results`.
pub const DEFAULT_NUM_RESULTS: usize = 50;
/// Upper bound of `search_web`'s `num_results`.
pub const MAX_NUM_RESULTS: usize = 200;

/// Minimum content length for a single `fetch_page` call.
pub const SINGLE_PAGE_MIN_CHARS: usize = 100;

/// Handles tool calls for one process.
///
/// Cloning is cheap; clones share filters, cache and event sink.
#[derive(Clone)]
pub struct ResearchService {
    config: ServiceConfig,
    filters: FilterRegistry,
    cache: Arc<ResearchCache>,
    backend: Arc<dyn SearchBackend>,
    fetcher: Option<Arc<dyn Fetcher>>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ResearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchService")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("backend", &self.backend.name())
            .field("injected_fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

impl ResearchService {
    /// Creates a service with default filters, a memory-only cache sized by
    /// `config` and no event sink.
    #[must_use]
    pub fn new(config: ServiceConfig, backend: Arc<dyn SearchBackend>) -> Self {
        let cache = ResearchCache::memory_only(config.cache_max_size, config.memory_ttl());
        Self {
            config,
            filters: FilterRegistry::new(),
            cache: Arc::new(cache),
            backend,
            fetcher: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates the production service: DuckDuckGo search and a cache built
    /// from `config` (durable tier included when configured and reachable).
    #[cfg(feature = "duckduckgo")]
    pub async fn from_config(config: ServiceConfig) -> Self {
        let backend = Arc::new(crate::search::DuckDuckGoBackend::new(config.verify_tls));
        let cache = ResearchCache::from_config(&config).await;
        Self::new(config, backend).with_cache(Arc::new(cache))
    }

    /// Replaces the filter registry.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Replaces the cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResearchCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Uses `fetcher` for every fetch instead of a per-run HTTP client.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the progress event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The live filter registry.
    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// The result cache.
    #[must_use]
    pub fn cache(&self) -> &ResearchCache {
        &self.cache
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn adapter(&self) -> SearchAdapter {
        SearchAdapter::new(Arc::clone(&self.backend), self.filters.clone())
    }

    /// The injected fetcher, or a fresh HTTP fetcher whose pool is shared by
    /// one run.
    fn fetcher_for(&self, max_concurrent: usize) -> Result<Arc<dyn Fetcher>> {
        if let Some(fetcher) = &self.fetcher {
            return Ok(Arc::clone(fetcher));
        }
        let fetcher = HttpFetcher::new(max_concurrent, self.config.verify_tls, self.filters.clone())?;
        Ok(Arc::new(fetcher))
    }

    async fn progress(&self, message: String) {
        tracing::debug!(message = %message, "Research progress");
        self.events
            .emit(RESEARCH_PROGRESS, Some(progress_payload(message)))
            .await;
    }

    /// Dispatches a tool call, turning every failure into a response.
    pub async fn call_tool(&self, name: &str, args: &Value) -> ToolResponse {
        let started = Instant::now();
        let result = AssertUnwindSafe(self.dispatch(name, args))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(content)) => {
                tracing::debug!(
                    tool = name,
                    duration_ms = started.elapsed().as_millis(),
                    "Tool call completed"
                );
                ToolResponse::ok(content)
            }
            Ok(Err(e)) => {
                if e.is_input_error() {
                    tracing::warn!(tool = name, error = %e, "Tool call rejected");
                } else {
                    tracing::error!(tool = name, error = %e, "Tool call failed");
                }
                ToolResponse::fail(e.to_string())
            }
            Err(_) => {
                tracing::error!(tool = name, "Tool call panicked");
                ToolResponse::fail(UNEXPECTED_ERROR)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<Value> {
        match name {
            names::SEARCH_WEB => self.search_web(args).await,
            names::FETCH_PAGE => self.fetch_page(args).await,
            names::RESEARCH => self.research(args).await,
            names::UPDATE_FILTERS => self.update_filters(args),
            names::CACHE_CLEAR => Ok(self.cache_clear().await),
            names::CACHE_STATS => self.cache_stats(),
            other => Ok(json!({ "error": format!("Unknown tool: {other}") })),
        }
    }

    /// `search_web`: `{query, count, results: [{url, title}]}`.
    pub async fn search_web(&self, args: &Value) -> Result<Value> {
        let args = Arguments::parse(args)?;
        let Some(query) = args.text("query") else {
            return Ok(missing("query"));
        };
        let num_results = args
            .count("num_results", DEFAULT_NUM_RESULTS)?
            .clamp(1, MAX_NUM_RESULTS);

        let hits = self.search(&query, num_results).await?;
        Ok(json!({
            "query": query,
            "count": hits.len(),
            "results": hits,
        }))
    }

    /// Runs a search to exhaustion on the blocking pool.
    pub async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let adapter = self.adapter();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || adapter.search(&query, count).collect())
            .await
            .map_err(|e| WebsiftError::internal(format!("search task failed: {e}")))
    }

    /// `fetch_page`: one page under the lenient single-page policy.
    pub async fn fetch_page(&self, args: &Value) -> Result<Value> {
        let args = Arguments::parse(args)?;
        let Some(url) = args.text("url") else {
            return Ok(missing("url"));
        };
        let max_length = args.count("max_length", 5000)?;
        let timeout = args.count("timeout", 20)?.max(1);

        let limits = FetchLimits::new(
            Duration::from_secs(u64::try_from(timeout).unwrap_or(u64::MAX)),
            SINGLE_PAGE_MIN_CHARS,
            max_length,
        );
        let outcome = self.fetch_one(&url, &limits).await?;
        Ok(outcome.to_dict())
    }

    /// Fetches one URL with a random user agent.
    pub async fn fetch_one(&self, url: &str, limits: &FetchLimits) -> Result<FetchOutcome> {
        let fetcher = self.fetcher_for(1)?;
        let outcome = fetcher.fetch(url, limits, random_user_agent()).await;
        tracing::debug!(url = %url, success = outcome.is_success(), "Single page fetched");
        Ok(outcome)
    }

    /// `research`: parses arguments and runs [`Self::run_research`].
    pub async fn research(&self, args: &Value) -> Result<Value> {
        let args = Arguments::parse(args)?;
        let Some(query) = args.text("query") else {
            return Ok(missing("query"));
        };

        let defaults = RunParameters::new(query);
        let params = RunParameters {
            search_results: args.count("search_results", defaults.search_results)?,
            fetch_count: args.count("fetch_count", defaults.fetch_count)?,
            max_content_length: args.count("max_content_length", defaults.max_content_length)?,
            timeout: u64::try_from(args.count("timeout", 20)?.max(1)).unwrap_or(u64::MAX),
            max_concurrent: args.count("max_concurrent", defaults.max_concurrent)?,
            output_format: args
                .text("output_format")
                .map_or_else(OutputFormat::default, |f| OutputFormat::parse_lenient(&f)),
            ..defaults
        };
        let use_cache = args.flag("use_cache", true)?;

        self.run_research(&params, use_cache).await
    }

    /// Runs a research job, consulting and filling the cache when
    /// `use_cache` is set.
    ///
    /// Cache hits are returned with `cached: true`. A run that fetched no
    /// page is never cached.
    pub async fn run_research(&self, params: &RunParameters, use_cache: bool) -> Result<Value> {
        let run_id = Uuid::now_v7();
        let key = params.fingerprint();

        if use_cache {
            if let Some(mut cached) = self.cache.get(&key).await {
                tracing::info!(%run_id, query = %params.query, "Returning cached research");
                if let Some(object) = cached.as_object_mut() {
                    object.insert("cached".to_string(), json!(true));
                }
                return Ok(cached);
            }
        }

        let started = Instant::now();
        self.progress(format!("Starting research: \"{}\"", params.query))
            .await;

        let (results, stats) = self.research_stream(params)?.collect().await;

        self.progress(format!(
            "Fetched {}/{} pages ({} chars)",
            stats.urls_fetched,
            stats.urls_searched,
            thousands(stats.content_chars)
        ))
        .await;
        tracing::info!(
            %run_id,
            query = %params.query,
            urls_searched = stats.urls_searched,
            urls_fetched = stats.urls_fetched,
            urls_failed = stats.urls_failed,
            content_chars = stats.content_chars,
            duration_ms = started.elapsed().as_millis(),
            "Research completed"
        );

        let response = self.format_response(params, &results, &stats);
        if use_cache && stats.urls_fetched > 0 {
            self.cache.set(&key, response.clone()).await;
        }
        Ok(response)
    }

    fn format_response(
        &self,
        params: &RunParameters,
        results: &[FetchOutcome],
        stats: &RunStatistics,
    ) -> Value {
        let content = match params.output_format {
            OutputFormat::Json => {
                let mut response = format_json(results, stats);
                if let Some(object) = response.as_object_mut() {
                    object.insert("cached".to_string(), json!(false));
                }
                return response;
            }
            OutputFormat::Raw => Value::String(format_raw(results)),
            OutputFormat::Markdown => {
                let preview = self
                    .config
                    .markdown_preview_chars
                    .unwrap_or(params.max_content_length);
                Value::String(format_markdown(results, stats, preview))
            }
        };

        json!({
            "query": params.query,
            "cached": false,
            "stats": stats,
            "content": content,
        })
    }

    /// Starts a research run and returns its outcome stream without touching
    /// the cache.
    pub fn research_stream(&self, params: &RunParameters) -> Result<ResearchStream> {
        let fetcher = self.fetcher_for(params.concurrency())?;
        Ok(Pipeline::new(self.adapter(), fetcher).stream(params))
    }

    /// `_update_filters`: merges the given lists into the live filters.
    pub fn update_filters(&self, args: &Value) -> Result<Value> {
        let update: FilterUpdate = serde_json::from_value(Arguments::parse(args)?.to_value())
            .map_err(|e| WebsiftError::invalid_input(format!("invalid filter update: {e}")))?;
        self.filters.update(update)?;
        Ok(json!({"status": "ok", "message": "Filter config updated"}))
    }

    /// `_cache_clear`.
    pub async fn cache_clear(&self) -> Value {
        self.cache.clear().await;
        json!({"status": "ok", "message": "Cache cleared"})
    }

    /// `_cache_stats`.
    pub fn cache_stats(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.cache.stats())?)
    }

    /// Reads a resource; unknown URIs yield an error object.
    pub fn read_resource(&self, uri: &str) -> Result<Value> {
        let filters = self.filters.filter_set();
        let value = match uri {
            uris::BLOCKED_DOMAINS => json!(filters.blocked_domains),
            uris::SKIP_URL_PATTERNS => json!(filters.skip_url_patterns),
            uris::BLOCKED_CONTENT => json!(filters.blocked_content_markers),
            uris::NAVIGATION_PATTERNS => json!(filters.navigation_patterns),
            uris::CACHE_STATS => self.cache_stats()?,
            other => json!({ "error": format!("Unknown resource: {other}") }),
        };
        Ok(value)
    }
}

/// Formats `n` with `,` thousands separators.
#[must_use]
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::fetch::TRUNCATION_MARKER;
    use crate::testing::{ScriptedFetcher, StaticSearchBackend};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    struct Harness {
        service: ResearchService,
        fetcher: Arc<ScriptedFetcher>,
        events: Arc<CollectingEventSink>,
    }

    fn harness_with(backend: StaticSearchBackend, fetcher: ScriptedFetcher) -> Harness {
        let fetcher = Arc::new(fetcher);
        let events = Arc::new(CollectingEventSink::new());
        let service = ResearchService::new(ServiceConfig::default(), Arc::new(backend))
            .with_fetcher(fetcher.clone())
            .with_event_sink(events.clone());
        Harness {
            service,
            fetcher,
            events,
        }
    }

    fn harness(urls: usize) -> Harness {
        harness_with(StaticSearchBackend::numbered(urls), ScriptedFetcher::new())
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[tokio::test]
    async fn test_search_web_returns_hits() {
        let h = harness(3);
        let value = h.service.search_web(&json!({"query": "rust"})).await.unwrap();

        assert_eq!(value["query"], "rust");
        assert_eq!(value["count"], 3);
        assert_eq!(
            value["results"][0],
            json!({"url": "https://site0.example.com/article", "title": "Result 0"})
        );
    }

    #[tokio::test]
    async fn test_search_web_clamps_num_results() {
        let h = harness(5);
        let low = h
            .service
            .search_web(&json!({"query": "rust", "num_results": 0}))
            .await
            .unwrap();
        assert_eq!(low["count"], 1);

        let high = h
            .service
            .search_web(&json!({"query": "rust", "num_results": 10_000}))
            .await
            .unwrap();
        assert_eq!(high["count"], 5);
    }

    #[tokio::test]
    async fn test_search_web_applies_filters() {
        let backend = StaticSearchBackend::new([
            "https://www.reddit.com/r/rust",
            "https://blog.example.com/tag/rust",
            "https://docs.example.com/guide",
        ]);
        let h = harness_with(backend, ScriptedFetcher::new());
        let value = h.service.search_web(&json!({"query": "rust"})).await.unwrap();

        assert_eq!(value["count"], 1);
        assert_eq!(value["results"][0]["url"], "https://docs.example.com/guide");
    }

    #[tokio::test]
    async fn test_missing_required_arguments() {
        let h = harness(1);
        assert_eq!(
            h.service.search_web(&json!({"query": "   "})).await.unwrap(),
            json!({"error": "query is required"})
        );
        assert_eq!(
            h.service.fetch_page(&json!({})).await.unwrap(),
            json!({"error": "url is required"})
        );
        assert_eq!(
            h.service.research(&Value::Null).await.unwrap(),
            json!({"error": "query is required"})
        );
    }

    #[tokio::test]
    async fn test_fetch_page_truncates_to_max_length() {
        let h = harness(0);
        let value = h
            .service
            .fetch_page(&json!({"url": "https://a.example.com/", "max_length": 120}))
            .await
            .unwrap();

        assert_eq!(value["success"], true);
        let content = value["content"].as_str().unwrap();
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(content.chars().count(), 120 + TRUNCATION_MARKER.chars().count());
    }

    #[tokio::test]
    async fn test_research_json_and_progress() {
        let h = harness(3);
        let value = h.service.research(&json!({"query": "q"})).await.unwrap();

        assert_eq!(value["query"], "q");
        assert_eq!(value["cached"], false);
        assert_eq!(value["stats"]["urls_searched"], 3);
        assert_eq!(value["stats"]["urls_fetched"], 3);
        assert_eq!(value["content"].as_array().unwrap().len(), 3);

        let chars = value["stats"]["content_chars"].as_u64().unwrap();
        let chars = thousands(usize::try_from(chars).unwrap());
        assert_eq!(
            h.events.progress_messages(),
            vec![
                "Starting research: \"q\"".to_string(),
                format!("Fetched 3/3 pages ({chars} chars)"),
            ]
        );
    }

    #[tokio::test]
    async fn test_research_second_call_is_cached() {
        let h = harness(2);
        let first = h.service.research(&json!({"query": "q"})).await.unwrap();
        let second = h.service.research(&json!({"query": "q"})).await.unwrap();

        assert_eq!(second["cached"], true);
        assert_eq!(first["content"], second["content"]);
        assert_eq!(h.fetcher.calls().len(), 2);
        assert_eq!(h.events.progress_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_research_without_cache_does_not_store() {
        let h = harness(2);
        h.service
            .research(&json!({"query": "q", "use_cache": false}))
            .await
            .unwrap();
        assert_eq!(h.service.cache_stats().unwrap()["memory_entries"], 0);
    }

    #[tokio::test]
    async fn test_research_with_no_fetched_pages_is_not_cached() {
        let fetcher = ScriptedFetcher::new().failing("https://site0.example.com/article");
        let h = harness_with(StaticSearchBackend::numbered(1), fetcher);

        let value = h.service.research(&json!({"query": "q"})).await.unwrap();
        assert_eq!(value["stats"]["urls_failed"], 1);
        assert_eq!(value["content"], json!([]));
        assert_eq!(h.service.cache_stats().unwrap()["memory_entries"], 0);
    }

    #[tokio::test]
    async fn test_research_raw_and_markdown_formats() {
        let h = harness(1);
        let raw = h
            .service
            .research(&json!({"query": "q", "output_format": "raw", "use_cache": false}))
            .await
            .unwrap();
        let text = raw["content"].as_str().unwrap();
        assert!(text.starts_with("=== https://site0.example.com/article ===\n"));
        assert_eq!(raw["cached"], false);

        let markdown = h
            .service
            .research(&json!({
                "query": "q",
                "output_format": "markdown",
                "max_content_length": 50,
                "use_cache": false
            }))
            .await
            .unwrap();
        let report = markdown["content"].as_str().unwrap();
        assert!(report.starts_with("# Research: q\n\n**Sources Analyzed**: 1 pages\n"));
        assert!(report.contains("## Page https://site0.example.com/article\n"));
    }

    #[tokio::test]
    async fn test_research_stream_yields_incrementally() {
        let h = harness(3);
        let params = RunParameters::new("q").with_search_results(3);
        let mut stream = h.service.research_stream(&params).unwrap();

        let first = stream.next().await.unwrap();
        assert!(first.is_success());
        assert_eq!(stream.stats().urls_fetched, 1);

        let (rest, stats) = stream.collect().await;
        assert_eq!(rest.len(), 2);
        assert_eq!(stats.urls_fetched, 3);
    }

    #[tokio::test]
    async fn test_update_filters_and_read_resource() {
        let h = harness(0);
        let response = h
            .service
            .call_tool(
                names::UPDATE_FILTERS,
                &json!({"blocked_domains": ["example.org"]}),
            )
            .await;
        assert!(!response.is_error);
        assert_eq!(response.content["status"], "ok");

        let domains = h.service.read_resource(uris::BLOCKED_DOMAINS).unwrap();
        assert_eq!(domains, json!(["example.org"]));
        let patterns = h.service.read_resource(uris::SKIP_URL_PATTERNS).unwrap();
        assert!(!patterns.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_filter_pattern_is_rejected() {
        let h = harness(0);
        let before = h.service.filters().filter_set();
        let response = h
            .service
            .call_tool(
                names::UPDATE_FILTERS,
                &json!({"blocked_domains": ["ok.com"], "skip_url_patterns": ["("]}),
            )
            .await;

        assert!(response.is_error);
        assert_eq!(h.service.filters().filter_set(), before);
    }

    #[tokio::test]
    async fn test_cache_admin_tools() {
        let h = harness(1);
        h.service.research(&json!({"query": "q"})).await.unwrap();

        let stats = h.service.call_tool(names::CACHE_STATS, &Value::Null).await;
        assert_eq!(stats.content["memory_entries"], 1);
        assert_eq!(
            h.service.read_resource(uris::CACHE_STATS).unwrap(),
            stats.content
        );

        let cleared = h.service.call_tool(names::CACHE_CLEAR, &json!({})).await;
        assert_eq!(
            cleared.content,
            json!({"status": "ok", "message": "Cache cleared"})
        );
        assert_eq!(h.service.cache_stats().unwrap()["memory_entries"], 0);
    }

    #[tokio::test]
    async fn test_call_tool_error_paths() {
        let h = harness(1);

        let unknown = h.service.call_tool("nope", &json!({})).await;
        assert!(!unknown.is_error);
        assert_eq!(unknown.error(), Some("Unknown tool: nope"));

        let malformed = h
            .service
            .call_tool(names::SEARCH_WEB, &json!({"query": "q", "num_results": "lots"}))
            .await;
        assert!(malformed.is_error);
        assert_eq!(malformed.error(), Some("num_results must be an integer"));

        let not_object = h.service.call_tool(names::RESEARCH, &json!("q")).await;
        assert!(not_object.is_error);

        let resource = h.service.read_resource("filters://nope").unwrap();
        assert_eq!(resource["error"], "Unknown resource: filters://nope");
    }

    #[tokio::test]
    async fn test_research_with_huge_limits_completes() {
        let h = harness(2);
        let response = h
            .service
            .call_tool(
                names::RESEARCH,
                &json!({"query": "q", "max_concurrent": 4e18, "search_results": 4e18}),
            )
            .await;

        assert!(!response.is_error, "{:?}", response.error());
        assert_eq!(response.content["stats"]["urls_fetched"], 2);
    }

    #[tokio::test]
    async fn test_call_tool_catches_panics() {
        let fetcher = ScriptedFetcher::new().panicking("https://boom.example.com/");
        let h = harness_with(StaticSearchBackend::default(), fetcher);

        let response = h
            .service
            .call_tool(names::FETCH_PAGE, &json!({"url": "https://boom.example.com/"}))
            .await;
        assert!(response.is_error);
        assert_eq!(response.error(), Some(UNEXPECTED_ERROR));
    }
}
