//! HTML to readable text extraction.
//!
//! The extractor is a staged regex/heuristic cleaner, not a DOM parser:
//!
//! 1. drop noise subtrees (`script`, `style`, `nav`, ...) and comments
//! 2. pull the `<title>` and strip a trailing site name
//! 3. turn structural tags into line breaks and bullets
//! 4. strip remaining tags, decode entities, normalise whitespace
//! 5. run a line-level noise filter
//!
//! The result is prefixed with `# {title}` when a title was found.

use regex::Regex;
use std::sync::LazyLock;

use crate::filters::FilterSnapshot;

/// Lines with a lower share of alphanumeric characters are dropped.
pub const MIN_ALNUM_RATIO: f64 = 0.30;

/// The alphanumeric ratio only applies to lines longer than this.
pub const ALNUM_CHECK_MIN_CHARS: usize = 3;

/// Lines with at least this many bullet glyphs are dropped.
pub const MAX_BULLET_GLYPHS: usize = 4;

/// Lines shorter than this with few words and no lowercase are UI fragments.
pub const UI_FRAGMENT_MAX_CHARS: usize = 15;

/// Word limit for the UI fragment rule.
pub const UI_FRAGMENT_MAX_WORDS: usize = 2;

/// Lines shorter than this are buffered and merged.
pub const SHORT_LINE_CHARS: usize = 25;

/// Number of buffered short lines that triggers a merge.
pub const SHORT_LINE_BATCH: usize = 5;

/// A merged batch at or above this length is discarded.
pub const MAX_JOINED_CHARS: usize = 300;

/// Buffers of this many lines or fewer are flushed line by line.
pub const SHORT_FLUSH_INDIVIDUAL: usize = 2;

/// Glyphs counted by the bullet rule.
pub const BULLET_GLYPHS: &[char] = &['•', '·', '●', '○', '◦', '‣', '⁃'];

/// Characters trimmed before the pure-marker check.
pub const LIST_MARKER_CHARS: &[char] = &['•', '-', '*', '·', '►', '▸', '▹', '→', '‣', '⁃', '●', ' '];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript",
];

#[allow(clippy::expect_used)]
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("built-in extractor pattern")
}

static NOISE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)<(script|style|nav|footer|header|aside|noscript)[^>]*>"));
static NOISE_CLOSE: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    NOISE_TAGS
        .iter()
        .map(|tag| (*tag, pattern(&format!("(?i)</{tag}>"))))
        .collect()
});
static COMMENTS: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<!--.*?-->"));
static TITLE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<title[^>]*>(.*?)</title>"));
static BR: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<br\s*/?>"));
static BLOCK_END: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)</(p|div|h[1-6]|li|tr|article|section)>"));
static LI_OPEN: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<li[^>]*>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<[^>]+>"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| pattern(r"[ \t]+"));
static LEADING_SPACES: LazyLock<Regex> = LazyLock::new(|| pattern(r"\n[ \t]+"));
static MULTI_NEWLINE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\n{3,}"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+"));
static SITE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\s*[|\-–—]\s*[^|\-–—]{3,50}$"));

/// Strips tags, decodes entities and collapses whitespace.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let decoded = html_escape::decode_html_entities(text);
    let untagged = ANY_TAG.replace_all(&decoded, "");
    WHITESPACE.replace_all(&untagged, " ").trim().to_string()
}

/// Returns the title from content that starts with a `# Title` line.
pub fn extract_title_from_content(content: &str) -> &str {
    content
        .strip_prefix("# ")
        .and_then(|rest| rest.find('\n').map(|end| &rest[..end]))
        .unwrap_or("")
}

/// Extracts readable text from an HTML page.
pub fn extract_text(html: &str, filters: &FilterSnapshot) -> String {
    let html = strip_noise_blocks(html);
    let html = COMMENTS.replace_all(&html, "");

    let raw_title = TITLE
        .captures(&html)
        .map(|caps| html_escape::decode_html_entities(caps[1].trim()).into_owned())
        .unwrap_or_default();
    let title = strip_site_suffix(&raw_title);

    let html = BR.replace_all(&html, "\n");
    let html = BLOCK_END.replace_all(&html, "\n\n");
    let html = LI_OPEN.replace_all(&html, "• ");

    let text = ANY_TAG.replace_all(&html, " ");
    let text = html_escape::decode_html_entities(&text);
    let text = SPACES.replace_all(&text, " ");
    let text = LEADING_SPACES.replace_all(&text, "\n");
    let text = MULTI_NEWLINE.replace_all(&text, "\n\n");

    let lines = LineFilter::new(filters, &title, &raw_title).run(&text);
    let body = MULTI_NEWLINE.replace_all(&lines.join("\n"), "\n\n").trim().to_string();

    if title.is_empty() {
        body
    } else {
        format!("# {title}\n\n{body}")
    }
}

fn strip_site_suffix(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    SITE_SUFFIX.replace(text, "").into_owned()
}

/// Removes each noise element from its opening tag through the first
/// matching close tag. Unclosed elements are left in place.
fn strip_noise_blocks(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied_to = 0;
    let mut search_from = 0;

    while let Some(caps) = NOISE_OPEN.captures_at(html, search_from) {
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let close = NOISE_CLOSE
            .iter()
            .find(|(tag, _)| tag.eq_ignore_ascii_case(name.as_str()))
            .and_then(|(_, closer)| closer.find_at(html, open.end()));

        match close {
            Some(close) => {
                out.push_str(&html[copied_to..open.start()]);
                copied_to = close.end();
                search_from = close.end();
            }
            // `<` is one byte, so this stays on a char boundary.
            None => search_from = open.start() + 1,
        }
    }

    out.push_str(&html[copied_to..]);
    out
}

struct LineFilter<'a> {
    filters: &'a FilterSnapshot,
    title: &'a str,
    raw_title: &'a str,
    title_seen: bool,
    prev_line: String,
    short_buffer: Vec<String>,
    kept: Vec<String>,
}

impl<'a> LineFilter<'a> {
    fn new(filters: &'a FilterSnapshot, title: &'a str, raw_title: &'a str) -> Self {
        Self {
            filters,
            title,
            raw_title,
            title_seen: false,
            prev_line: String::new(),
            short_buffer: Vec::new(),
            kept: Vec::new(),
        }
    }

    fn run(mut self, text: &str) -> Vec<String> {
        for line in text.split('\n') {
            let line = line.trim();
            if line.is_empty() || self.is_noise(line) {
                continue;
            }
            self.keep(line);
        }
        self.flush_short();
        self.kept
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_noise(&mut self, line: &str) -> bool {
        if self.filters.is_navigation_line(line) {
            return true;
        }

        let chars = line.chars().count();
        let alnum = line.chars().filter(|c| c.is_alphanumeric()).count();
        if chars > ALNUM_CHECK_MIN_CHARS && (alnum as f64 / chars as f64) < MIN_ALNUM_RATIO {
            return true;
        }

        if line.chars().filter(|c| BULLET_GLYPHS.contains(c)).count() >= MAX_BULLET_GLYPHS {
            return true;
        }

        if line.trim_matches(LIST_MARKER_CHARS).chars().count() < 2 {
            return true;
        }

        if line == self.prev_line {
            return true;
        }

        if !self.title.is_empty() && !self.title_seen {
            let normalised = strip_site_suffix(line);
            if normalised == self.title || line == self.raw_title {
                self.title_seen = true;
                return true;
            }
        }

        chars < UI_FRAGMENT_MAX_CHARS
            && line.split_whitespace().count() <= UI_FRAGMENT_MAX_WORDS
            && !line.starts_with('#')
            && !line.chars().any(char::is_lowercase)
    }

    fn keep(&mut self, line: &str) {
        if line.chars().count() < SHORT_LINE_CHARS && !line.starts_with('#') {
            self.short_buffer.push(line.to_string());
            if self.short_buffer.len() >= SHORT_LINE_BATCH {
                let joined = self.short_buffer.join(" | ");
                if joined.chars().count() < MAX_JOINED_CHARS {
                    self.kept.push(joined);
                }
                self.short_buffer.clear();
            }
            return;
        }

        self.flush_short();
        self.kept.push(line.to_string());
        self.prev_line = line.to_string();
    }

    fn flush_short(&mut self) {
        if self.short_buffer.is_empty() {
            return;
        }
        if self.short_buffer.len() <= SHORT_FLUSH_INDIVIDUAL {
            self.kept.append(&mut self.short_buffer);
        } else {
            self.kept.push(self.short_buffer.join(" | "));
            self.short_buffer.clear();
        }
    }
}
