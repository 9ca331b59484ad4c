//! # Websift
//!
//! Concurrent web research: search the web, fetch the result pages in
//! parallel, extract readable text and cache the outcome.
//!
//! Websift provides:
//!
//! - **Streaming research pipeline**: a blocking search producer feeding a
//!   bounded pool of fetch tasks, with back-pressure end to end
//! - **Text extraction**: a multi-stage HTML cleaner tuned for article text
//! - **Runtime-configurable filters**: blocked domains, URL patterns, block
//!   page markers and navigation lines, swappable while requests run
//! - **Two-tier caching**: an in-process LRU with an optional Redis tier
//! - **Tool handlers**: `search_web`, `fetch_page`, `research` and admin
//!   operations for an LLM-facing protocol shell
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use websift::prelude::*;
//!
//! let service = ResearchService::from_config(ServiceConfig::from_env()).await;
//! let response = service
//!     .call_tool("research", &serde_json::json!({"query": "rust async runtimes"}))
//!     .await;
//! println!("{}", response.content);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod extract;
pub mod fetch;
pub mod filters;
pub mod format;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod tools;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{make_cache_key, CacheStats, CacheTier, MemoryTier, ResearchCache};
    pub use crate::config::{FetchLimits, RunParameters, ServiceConfig};
    pub use crate::errors::{CacheError, Result, SearchError, WebsiftError};
    pub use crate::events::{
        ChannelEventSink, EventSink, ForwardedEvent, NoOpEventSink, RESEARCH_PROGRESS,
    };
    pub use crate::extract::{clean_text, extract_text};
    pub use crate::fetch::{Fetcher, HttpFetcher};
    pub use crate::filters::{FilterRegistry, FilterSet, FilterUpdate};
    pub use crate::models::{FetchOutcome, OutputFormat, RunStatistics, SearchHit};
    pub use crate::pipeline::{Pipeline, ResearchStream};
    pub use crate::search::{SearchAdapter, SearchBackend};
    #[cfg(feature = "duckduckgo")]
    pub use crate::search::DuckDuckGoBackend;
    pub use crate::tools::{tool_definitions, ResearchService, ToolDefinition, ToolResponse};
}
