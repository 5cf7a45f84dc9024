use readability::extractor;
use scraper::{Html, Selector};
use url::Url;

/// Raw output of the readability pass, before sanitization and fallbacks.
#[derive(Debug)]
pub struct ReaderResult {
    pub title: String,
    pub byline: Option<String>,
    pub text: String,
    pub html: String,
}

/// Run the readability heuristic against the document. This is the only step
/// that can fail extraction outright; everything downstream degrades softly.
pub fn read(html: &str, url: &Url) -> Result<ReaderResult, String> {
    let product = extractor::extract(&mut html.as_bytes(), url).map_err(|e| e.to_string())?;

    Ok(ReaderResult {
        title: product.title.trim().to_string(),
        byline: extract_byline(html),
        text: product.text.trim().to_string(),
        html: product.content,
    })
}

/// The readability crate carries no byline, so pull one from the usual
/// metadata spots: meta author tags first, then a rel=author anchor.
fn extract_byline(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for selector_str in [
        "meta[name='author']",
        "meta[property='article:author']",
        "meta[name='byl']",
    ] {
        let selector = Selector::parse(selector_str).ok()?;
        if let Some(element) = document.select(&selector).next()
            && let Some(content) = element.value().attr("content")
        {
            let byline = content.trim();
            if !byline.is_empty() && !byline.starts_with("http") {
                return Some(byline.to_string());
            }
        }
    }

    let selector = Selector::parse("a[rel='author']").ok()?;
    if let Some(element) = document.select(&selector).next() {
        let byline = element.text().collect::<String>().trim().to_string();
        if !byline.is_empty() {
            return Some(byline);
        }
    }

    None
}
