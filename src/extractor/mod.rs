pub mod cleaner;
pub mod language;
pub mod model;
pub mod reader;

#[cfg(test)]
mod tests;

pub use model::{Article, Diagnostics};

use thiserror::Error;
use url::Url;

use crate::extractor::model::normalize_whitespace;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unreadable document: {0}")]
    Unreadable(String),
}

/// Content extraction seam. The processor only depends on this trait, so the
/// readability/sanitization/language stack underneath is swappable.
pub trait Extractor: Send + Sync {
    fn extract(&self, url: &Url, html: &str) -> Result<(Article, Diagnostics), ExtractError>;
}

/// Default extractor: readability heuristics, ammonia sanitization, whatlang
/// language identification.
#[derive(Debug, Clone, Default)]
pub struct ReadabilityExtractor;

impl Extractor for ReadabilityExtractor {
    fn extract(&self, url: &Url, html: &str) -> Result<(Article, Diagnostics), ExtractError> {
        let result = reader::read(html, url).map_err(ExtractError::Unreadable)?;

        // Heuristic extraction that found nothing falls back to the raw
        // document; a document with no extractable text falls back to a
        // strict plain-text rendering. Neither case fails the job.
        let mut clean_html = cleaner::sanitize(&result.html);
        if clean_html.is_empty() {
            clean_html = cleaner::sanitize(html);
        }
        if !clean_html.is_empty() {
            clean_html = cleaner::resolve_links(&clean_html, url);
        }

        let mut text = result.text;
        if text.is_empty() {
            text = cleaner::strip_tags(html);
        }
        let text = normalize_whitespace(&text);

        let word_count = text.split_whitespace().count();
        let detection = language::detect_language(&text);

        let article = Article {
            title: result.title,
            byline: result.byline,
            text,
            html: clean_html,
            word_count,
            language: detection.lang,
        };
        let diagnostics = Diagnostics {
            lang_detect_duration: detection.duration,
            lang_reliable: detection.reliable,
        };

        Ok((article, diagnostics))
    }
}
