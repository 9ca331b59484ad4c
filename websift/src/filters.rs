//! URL and content filtering.
//!
//! The filter lists are runtime-configurable. A [`FilterRegistry`] is a cheap
//! handle to an immutable, fully compiled [`FilterSnapshot`]; updates build a
//! new snapshot and swap it in under a write lock, so readers always see a
//! matcher compiled from one consistent set of lists.

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::Result;

/// Domains excluded from search results and fetches.
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "reddit.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "youtube.com",
    "tiktok.com",
    "instagram.com",
    "linkedin.com",
    "medium.com",
];

/// URL patterns for low-value pages (media, auth, shop, listing pages).
pub const DEFAULT_SKIP_URL_PATTERNS: &[&str] = &[
    r"\.pdf$",
    r"\.jpg$",
    r"\.png$",
    r"\.gif$",
    r"/login",
    r"/signin",
    r"/signup",
    r"/cart",
    r"/checkout",
    r"amazon\.com/.*/(dp|gp)/",
    r"ebay\.com/itm/",
    r"/tag/",
    r"/tags/",
    r"/category/",
    r"/categories/",
    r"/topic/",
    r"/topics/",
    r"/archive/",
    r"/page/\d+",
    r"/shop/",
    r"/store/",
    r"/buy/",
    r"/product/",
    r"/products/",
];

/// Phrases that identify CAPTCHA and bot-wall pages.
pub const DEFAULT_BLOCKED_CONTENT_MARKERS: &[&str] = &[
    "verify you are human",
    "access to this page has been denied",
    "please complete the security check",
    "cloudflare ray id:",
    "checking your browser",
    "enable javascript and cookies",
    "unusual traffic from your computer",
    "are you a robot",
    "captcha",
    "perimeterx",
    "distil networks",
    "blocked by",
];

/// Line prefixes that mark navigation chrome.
pub const DEFAULT_NAVIGATION_PATTERNS: &[&str] = &["skip to", "jump to"];

/// Content shorter than this is never treated as a block page.
pub const MIN_BLOCK_CHECK_CHARS: usize = 30;

/// Only this many leading characters are scanned for block markers.
pub const BLOCK_CHECK_WINDOW_CHARS: usize = 2000;

/// The raw filter lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Domain substrings to block.
    pub blocked_domains: Vec<String>,
    /// Regex patterns for URLs to skip.
    pub skip_url_patterns: Vec<String>,
    /// Lowercase markers of block pages.
    pub blocked_content_markers: Vec<String>,
    /// Lowercase navigation line prefixes.
    pub navigation_patterns: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            blocked_domains: owned(DEFAULT_BLOCKED_DOMAINS),
            skip_url_patterns: owned(DEFAULT_SKIP_URL_PATTERNS),
            blocked_content_markers: owned(DEFAULT_BLOCKED_CONTENT_MARKERS),
            navigation_patterns: owned(DEFAULT_NAVIGATION_PATTERNS),
        }
    }
}

impl FilterSet {
    /// Returns a copy with the supplied fields of `update` replacing ours.
    #[must_use]
    pub fn merged(&self, update: FilterUpdate) -> Self {
        Self {
            blocked_domains: update
                .blocked_domains
                .unwrap_or_else(|| self.blocked_domains.clone()),
            skip_url_patterns: update
                .skip_url_patterns
                .unwrap_or_else(|| self.skip_url_patterns.clone()),
            blocked_content_markers: update
                .blocked_content_markers
                .unwrap_or_else(|| self.blocked_content_markers.clone()),
            navigation_patterns: update
                .navigation_patterns
                .unwrap_or_else(|| self.navigation_patterns.clone()),
        }
    }
}

/// A partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterUpdate {
    /// Replacement domain list.
    #[serde(default)]
    pub blocked_domains: Option<Vec<String>>,
    /// Replacement URL pattern list.
    #[serde(default)]
    pub skip_url_patterns: Option<Vec<String>>,
    /// Replacement block marker list.
    #[serde(default)]
    pub blocked_content_markers: Option<Vec<String>>,
    /// Replacement navigation prefix list.
    #[serde(default)]
    pub navigation_patterns: Option<Vec<String>>,
}

/// An immutable filter set together with its compiled URL matcher.
#[derive(Debug, Clone)]
pub struct FilterSnapshot {
    set: FilterSet,
    url_matcher: Option<Regex>,
    markers: Vec<String>,
    navigation: Vec<String>,
}

impl FilterSnapshot {
    /// Compiles a snapshot from a filter set.
    pub fn compile(set: FilterSet) -> Result<Self> {
        let url_matcher = build_url_matcher(&set.blocked_domains, &set.skip_url_patterns)?;
        let markers = set
            .blocked_content_markers
            .iter()
            .map(|m| m.to_lowercase())
            .collect();
        let navigation = set
            .navigation_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        Ok(Self {
            set,
            url_matcher,
            markers,
            navigation,
        })
    }

    /// The lists this snapshot was compiled from.
    #[must_use]
    pub fn filter_set(&self) -> &FilterSet {
        &self.set
    }

    /// Whether a URL matches a blocked domain or skip pattern.
    #[must_use]
    pub fn is_blocked_url(&self, url: &str) -> bool {
        self.url_matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(url))
    }

    /// Whether content looks like a CAPTCHA or bot-block page.
    #[must_use]
    pub fn is_blocked_content(&self, content: &str) -> bool {
        if content.chars().count() < MIN_BLOCK_CHECK_CHARS {
            return false;
        }
        let window: String = content
            .chars()
            .take(BLOCK_CHECK_WINDOW_CHARS)
            .collect::<String>()
            .to_lowercase();
        self.markers.iter().any(|m| window.contains(m.as_str()))
    }

    /// Whether a line starts with a navigation phrase.
    #[must_use]
    pub fn is_navigation_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.navigation.iter().any(|p| lower.starts_with(p.as_str()))
    }
}

impl Default for FilterSnapshot {
    fn default() -> Self {
        // The built-in patterns are known to compile.
        Self::compile(FilterSet::default()).unwrap_or_else(|_| Self {
            set: FilterSet::default(),
            url_matcher: None,
            markers: owned(DEFAULT_BLOCKED_CONTENT_MARKERS),
            navigation: owned(DEFAULT_NAVIGATION_PATTERNS),
        })
    }
}

fn build_url_matcher(domains: &[String], patterns: &[String]) -> Result<Option<Regex>> {
    let domain_part = domains
        .iter()
        .map(|d| regex::escape(d))
        .collect::<Vec<_>>()
        .join("|");
    let pattern_part = patterns.join("|");

    let combined = match (domain_part.is_empty(), pattern_part.is_empty()) {
        (true, true) => return Ok(None),
        (false, true) => domain_part,
        (true, false) => pattern_part,
        (false, false) => format!("(?:{domain_part})|(?:{pattern_part})"),
    };

    let matcher = RegexBuilder::new(&combined).case_insensitive(true).build()?;
    Ok(Some(matcher))
}

/// Shared handle to the current filter snapshot.
///
/// Cloning the registry shares state; use [`FilterRegistry::new`] for an
/// isolated instance.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    current: Arc<RwLock<Arc<FilterSnapshot>>>,
}

impl FilterRegistry {
    /// Creates a registry with the default lists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from explicit lists.
    pub fn with_filters(set: FilterSet) -> Result<Self> {
        let snapshot = FilterSnapshot::compile(set)?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    /// Returns the latest committed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<FilterSnapshot> {
        self.current.read().clone()
    }

    /// Returns a copy of the current lists.
    #[must_use]
    pub fn filter_set(&self) -> FilterSet {
        self.snapshot().filter_set().clone()
    }

    /// Merges `update` into the current lists and recompiles.
    ///
    /// On an invalid pattern nothing changes and the error is returned.
    pub fn update(&self, update: FilterUpdate) -> Result<()> {
        let mut current = self.current.write();
        let merged = current.filter_set().merged(update);
        let snapshot = FilterSnapshot::compile(merged)?;
        *current = Arc::new(snapshot);
        tracing::info!(
            blocked_domains = current.set.blocked_domains.len(),
            skip_url_patterns = current.set.skip_url_patterns.len(),
            blocked_content_markers = current.set.blocked_content_markers.len(),
            navigation_patterns = current.set.navigation_patterns.len(),
            "Filter config updated"
        );
        Ok(())
    }

    /// See [`FilterSnapshot::is_blocked_url`].
    #[must_use]
    pub fn is_blocked_url(&self, url: &str) -> bool {
        self.snapshot().is_blocked_url(url)
    }

    /// See [`FilterSnapshot::is_blocked_content`].
    #[must_use]
    pub fn is_blocked_content(&self, content: &str) -> bool {
        self.snapshot().is_blocked_content(content)
    }

    /// See [`FilterSnapshot::is_navigation_line`].
    #[must_use]
    pub fn is_navigation_line(&self, line: &str) -> bool {
        self.snapshot().is_navigation_line(line)
    }
}
