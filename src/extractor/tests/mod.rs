use url::Url;

use crate::extractor::{Extractor, ReadabilityExtractor};

fn extract(html: &str, url: &str) -> (crate::extractor::Article, crate::extractor::Diagnostics) {
    let url = Url::parse(url).unwrap();
    ReadabilityExtractor
        .extract(&url, html)
        .expect("extraction should succeed")
}

#[test]
fn extracts_article_fields() {
    let body = "This article has enough real prose that both readability and the \
                language detector have something to chew on. "
        .repeat(8);
    let html = format!(
        r#"<!doctype html><html><head><title>Sample Article</title>
        <meta name="author" content="Jane Writer"></head>
        <body><article><h1>Sample Article</h1><p>{body}</p>
        <a href="/related">related</a>
        <script>alert('nope')</script></article></body></html>"#
    );

    let (article, _) = extract(&html, "https://example.com/article");

    assert!(article.title.contains("Sample Article"));
    assert_eq!(article.byline, Some("Jane Writer".to_string()));
    assert!(article.text.contains("real prose"));
    assert!(!article.html.contains("<script"));
    assert!(!article.html.contains("alert"));
    assert_eq!(article.language, Some("en".to_string()));
}

#[test]
fn resolves_relative_links_against_final_url() {
    let body = "Plenty of surrounding prose so the content block is kept. ".repeat(10);
    let html = format!(
        r#"<html><head><title>Links</title></head><body><article>
        <p>{body}</p><p><a href="/other">other</a>
        <img src="pic.png" alt=""></p></article></body></html>"#
    );

    let (article, _) = extract(&html, "https://example.com/posts/1");

    if article.html.contains("href=") {
        assert!(article.html.contains("https://example.com/other"));
    }
}

#[test]
fn word_count_matches_whitespace_split() {
    let body = "one two three four five six seven eight nine ten ".repeat(30);
    let html = format!(
        "<html><head><title>Counted</title></head><body><article><p>{body}</p></article></body></html>"
    );

    let (article, _) = extract(&html, "https://example.com/counted");

    assert_eq!(article.word_count, article.text.split_whitespace().count());
    assert!(article.word_count > 0);
}

#[test]
fn sparse_page_still_yields_text() {
    // Too little content for readability to keep; the strict-sanitized
    // fallback must still produce something rather than failing the job.
    let html = "<html><head><title>Tiny</title></head><body><p>hi there</p></body></html>";

    let (article, _) = extract(html, "https://example.com/tiny");

    assert!(!article.text.is_empty());
    assert_eq!(article.word_count, article.text.split_whitespace().count());
}

#[test]
fn ambiguous_text_leaves_language_unset() {
    let html = "<html><head><title>x</title></head><body><p>7 42 9000 - 3.14</p></body></html>";

    let (article, diagnostics) = extract(html, "https://example.com/x");

    assert_eq!(article.language, None);
    assert!(!diagnostics.lang_reliable);
}

#[test]
fn malformed_but_parseable_html_degrades_softly() {
    let html = "<html><head><title>Broken</title><body><p>Unclosed tags<div>More content";

    let (article, _) = extract(html, "https://example.com/broken");

    assert!(article.text.contains("Unclosed") || article.text.contains("More"));
}
