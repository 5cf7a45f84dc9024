use ammonia::Builder;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).unwrap());
static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"src="([^"]+)""#).unwrap());

/// Allow-list sanitization: drops scripts, styles, event handlers, and any
/// element outside ammonia's default conservative set.
pub fn sanitize(html: &str) -> String {
    Builder::default().clean(html).to_string().trim().to_string()
}

/// Strict plain-text rendering: every tag removed, only text content kept.
pub fn strip_tags(html: &str) -> String {
    let mut builder = Builder::default();
    builder.tags(HashSet::new());
    builder.clean(html).to_string().trim().to_string()
}

/// Rewrite relative `href`/`src` attributes against the page's final URL so
/// archived HTML keeps working outside its origin.
pub fn resolve_links(html: &str, base_url: &Url) -> String {
    let resolved = HREF_ATTR.replace_all(html, |caps: &regex::Captures| {
        match base_url.join(&caps[1]) {
            Ok(absolute) => format!(r#"href="{}""#, absolute),
            Err(_) => caps[0].to_string(),
        }
    });

    let resolved = SRC_ATTR.replace_all(&resolved, |caps: &regex::Captures| {
        match base_url.join(&caps[1]) {
            Ok(absolute) => format!(r#"src="{}""#, absolute),
            Err(_) => caps[0].to_string(),
        }
    });

    resolved.to_string()
}
