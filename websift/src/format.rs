//! Response formatters for research results.
//!
//! Only successful outcomes appear in formatted output; failures are
//! reflected in the statistics alone.

use serde_json::json;
use std::fmt::Write as _;

use crate::models::{FetchOutcome, RunStatistics};

/// Suffix appended to a cut markdown preview.
pub const PREVIEW_ELLIPSIS: &str = "...";

/// Structured response: `{query, stats, content: [{url, title, content, source}]}`.
#[must_use]
pub fn format_json(results: &[FetchOutcome], stats: &RunStatistics) -> serde_json::Value {
    let content: Vec<serde_json::Value> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| {
            json!({
                "url": r.url(),
                "title": r.title(),
                "content": r.content(),
                "source": r.source().as_str(),
            })
        })
        .collect();

    json!({
        "query": stats.query,
        "stats": stats,
        "content": content,
    })
}

/// Plain text: one `=== url ===` block per successful page.
#[must_use]
pub fn format_raw(results: &[FetchOutcome]) -> String {
    let mut out = String::new();
    for r in results.iter().filter(|r| r.is_success()) {
        let _ = write!(out, "=== {} ===\n{}\n\n", r.url(), r.content());
    }
    out
}

/// A markdown report with a per-page preview of at most `max_preview` chars.
#[must_use]
pub fn format_markdown(
    results: &[FetchOutcome],
    stats: &RunStatistics,
    max_preview: usize,
) -> String {
    let successful: Vec<&FetchOutcome> = results.iter().filter(|r| r.is_success()).collect();

    let mut out = String::new();
    let _ = write!(
        out,
        "# Research: {}\n\n**Sources Analyzed**: {} pages\n\n---\n\n",
        stats.query,
        successful.len()
    );

    for r in successful.into_iter().filter(|r| !r.content().is_empty()) {
        let heading = if r.title().is_empty() { r.url() } else { r.title() };
        let _ = write!(out, "## {heading}\n*Source: {}*\n\n", r.url());
        out.push_str(&preview(r.content(), max_preview));
        out.push_str("\n\n---\n\n");
    }
    out
}

fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => format!("{}{PREVIEW_ELLIPSIS}", &content[..cut]),
    }
}

/// One result as a streaming raw block.
#[must_use]
pub fn format_result_raw_single(result: &FetchOutcome) -> String {
    format!("=== {} ===\n{}\n", result.url(), result.content())
}

/// One result as a single NDJSON line (no trailing newline).
#[must_use]
pub fn format_result_json_single(result: &FetchOutcome) -> String {
    result.to_dict().to_string()
}
