use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Structured content extracted from a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub byline: Option<String>,
    pub text: String,
    pub html: String,
    pub word_count: usize,
    pub language: Option<String>,
}

/// Side-channel facts about the extraction, consumed by metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    pub lang_detect_duration: Duration,
    pub lang_reliable: bool,
}

/// Collapse runs of spaces/tabs and squeeze blank lines down to paragraph
/// breaks. Word counts are taken after normalization.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.trim();
    let spaced = SPACE_RUNS.replace_all(text, " ");
    BLANK_LINES.replace_all(&spaced, "\n\n").to_string()
}
