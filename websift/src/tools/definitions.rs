//! Tool, resource and prompt definitions exposed to the protocol shell.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tool names.
pub mod names {
    /// Search only.
    pub const SEARCH_WEB: &str = "search_web";
    /// Fetch one page.
    pub const FETCH_PAGE: &str = "fetch_page";
    /// Search and fetch.
    pub const RESEARCH: &str = "research";
    /// Partial filter update.
    pub const UPDATE_FILTERS: &str = "_update_filters";
    /// Empty the cache.
    pub const CACHE_CLEAR: &str = "_cache_clear";
    /// Cache statistics.
    pub const CACHE_STATS: &str = "_cache_stats";
}

/// Resource URIs.
pub mod uris {
    /// Blocked domain list.
    pub const BLOCKED_DOMAINS: &str = "filters://blocked-domains";
    /// Skip URL pattern list.
    pub const SKIP_URL_PATTERNS: &str = "filters://skip-url-patterns";
    /// Block-page marker list.
    pub const BLOCKED_CONTENT: &str = "filters://blocked-content";
    /// Navigation line pattern list.
    pub const NAVIGATION_PATTERNS: &str = "filters://navigation-patterns";
    /// Cache statistics.
    pub const CACHE_STATS: &str = "cache://stats";
}

/// Name of the report synthesis prompt.
pub const RESEARCH_REPORT_PROMPT_NAME: &str = "research_report";

/// Instructions for turning research output into a cited report.
pub const RESEARCH_REPORT_PROMPT: &str = "\
You are a research analyst synthesising web research results into a structured report.

## Instructions
- Write in clear, professional prose. Do NOT include raw URLs in the report body.
- Use the Source Name (page title) as attribution, e.g. \"(Source Name)\".
- Do NOT reproduce large verbatim passages. Paraphrase and synthesise.
- Structure the report as shown below.

## Report Template

## Research: {topic}

**Stats**: {N} pages analysed

### Key Findings

1. **[Finding 1]**
   Supporting detail. (Source Name)

2. **[Finding 2]**
   Supporting detail. (Source Name)

### Data / Benchmarks

| Metric | Value | Source |
|--------|-------|--------|
| ...    | ...   | ...    |

### Summary

One or two paragraph synthesis of the most important takeaways.

### Sources

- Source Name 1
- Source Name 2
";

/// Definition of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema of the argument object.
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Argument names the schema marks as required.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|names| names.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A readable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// What the resource holds.
    pub description: String,
    /// Content type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl ResourceDefinition {
    fn json(uri: &str, name: &str, description: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            mime_type: "application/json".to_string(),
        }
    }
}

/// Result of one tool call as handed to the protocol shell.
///
/// `is_error` marks failures of the call itself (malformed arguments,
/// internal errors). Expected outcomes such as a missing query or a failed
/// page fetch are reported in `content` with `is_error == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// The tool's JSON result.
    pub content: serde_json::Value,
    /// Whether the call failed.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn ok(content: serde_json::Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates a failed response carrying `{"error": message}`.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            content: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// The `error` field of the content, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.content.get("error")?.as_str()
    }
}

fn string_list_schema() -> serde_json::Value {
    json!({"type": "array", "items": {"type": "string"}})
}

/// Every tool the service answers, in listing order.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(names::SEARCH_WEB)
            .with_description(
                "Search the web and return a filtered list of URLs and titles. Blocked \
                 domains and low-value URL patterns (/tag/, /category/, /shop/, ...) are \
                 removed. Use this when you only need links, or to pick pages for fetch_page.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "num_results": {
                        "type": "integer",
                        "description": "Max results to return (default 50, max 200)",
                        "default": 50
                    }
                },
                "required": ["query"]
            })),
        ToolDefinition::new(names::FETCH_PAGE)
            .with_description(
                "Fetch a single URL and extract its readable text. Handles block-page \
                 detection, a 2 MB response cap and HTML noise removal.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to fetch"},
                    "max_length": {
                        "type": "integer",
                        "description": "Max characters of content to return (default 5000)",
                        "default": 5000
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Request timeout in seconds (default 20)",
                        "default": 20
                    }
                },
                "required": ["url"]
            })),
        ToolDefinition::new(names::RESEARCH)
            .with_description(
                "Run a full research pipeline: search, fetch the result pages in parallel \
                 and return cleaned text. Results are cached to avoid redundant searches.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Research query"},
                    "search_results": {
                        "type": "integer",
                        "description": "Number of search results to request (default 50)",
                        "default": 50
                    },
                    "fetch_count": {
                        "type": "integer",
                        "description": "Max pages to fetch (0 = fetch all results, default 0)",
                        "default": 0
                    },
                    "max_content_length": {
                        "type": "integer",
                        "description": "Max characters per page (default 5000)",
                        "default": 5000
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Per-request timeout in seconds (default 20)",
                        "default": 20
                    },
                    "max_concurrent": {
                        "type": "integer",
                        "description": "Max parallel fetches (default 20)",
                        "default": 20
                    },
                    "output_format": {
                        "type": "string",
                        "enum": ["json", "raw", "markdown"],
                        "description": "Response format (default json)",
                        "default": "json"
                    },
                    "use_cache": {
                        "type": "boolean",
                        "description": "Read from and write to the cache (default true)",
                        "default": true
                    }
                },
                "required": ["query"]
            })),
        ToolDefinition::new(names::UPDATE_FILTERS)
            .with_description(
                "[Management] Update one or more filter lists. Omitted lists keep their \
                 current value. Changes apply to subsequent requests.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "blocked_domains": string_list_schema(),
                    "skip_url_patterns": string_list_schema(),
                    "blocked_content_markers": string_list_schema(),
                    "navigation_patterns": string_list_schema()
                }
            })),
        ToolDefinition::new(names::CACHE_CLEAR)
            .with_description("[Management] Clear all cached research results."),
        ToolDefinition::new(names::CACHE_STATS)
            .with_description("[Management] Return current cache statistics."),
    ]
}

/// Every readable resource.
#[must_use]
pub fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition::json(
            uris::BLOCKED_DOMAINS,
            "Blocked Domains",
            "Domains excluded from search results and fetches.",
        ),
        ResourceDefinition::json(
            uris::SKIP_URL_PATTERNS,
            "Skip URL Patterns",
            "Regex patterns; matching URLs are skipped.",
        ),
        ResourceDefinition::json(
            uris::BLOCKED_CONTENT,
            "Blocked Content Markers",
            "Pages containing any marker are treated as CAPTCHA/blocked.",
        ),
        ResourceDefinition::json(
            uris::NAVIGATION_PATTERNS,
            "Navigation Patterns",
            "Regex patterns for navigation lines dropped during extraction.",
        ),
        ResourceDefinition::json(uris::CACHE_STATS, "Cache Statistics", "Read-only cache statistics."),
    ]
}
