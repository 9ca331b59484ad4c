//! Tool layer: the operations exposed to an LLM-facing protocol shell.
//!
//! This module provides:
//! - Tool, resource and prompt definitions
//! - Lenient argument parsing
//! - The [`ResearchService`] that handles every tool call

mod arguments;
mod definitions;
mod service;

pub use arguments::{missing, Arguments};
pub use definitions::{
    names, resource_definitions, tool_definitions, uris, ResourceDefinition, ToolDefinition,
    ToolResponse, RESEARCH_REPORT_PROMPT, RESEARCH_REPORT_PROMPT_NAME,
};
pub use service::{
    thousands, ResearchService, DEFAULT_NUM_RESULTS, MAX_NUM_RESULTS, SINGLE_PAGE_MIN_CHARS,
};
