//! Charset detection and UTF-8 decoding for fetched bodies.
//!
//! Decoding is intentionally lossy: a page with a few mojibake characters is
//! still worth archiving, so decode failures never fail a fetch.

use encoding_rs::Encoding;
use regex::Regex;
use std::sync::LazyLock;

static HEADER_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

static META_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

// Only the document prologue is inspected for <meta> hints.
const SNIFF_LIMIT: usize = 4096;

/// Decode a response body to UTF-8, returning the text and the name of the
/// encoding used. Precedence: Content-Type header, `<meta charset>` in the
/// first 4 KiB, then chardetng's statistical guess.
pub fn decode_body(content_type: &str, body: &[u8]) -> (String, &'static str) {
    let encoding = detect_encoding(content_type, body);
    let (decoded, _, _) = encoding.decode(body);
    (decoded.into_owned(), encoding.name())
}

fn detect_encoding(content_type: &str, body: &[u8]) -> &'static Encoding {
    if let Some(encoding) = charset_label(&HEADER_CHARSET, content_type) {
        return encoding;
    }

    let prologue = &body[..body.len().min(SNIFF_LIMIT)];
    let prologue_str = String::from_utf8_lossy(prologue);
    if let Some(encoding) = charset_label(&META_CHARSET, &prologue_str) {
        return encoding;
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(prologue, false);
    detector.guess(None, true)
}

fn charset_label(pattern: &Regex, haystack: &str) -> Option<&'static Encoding> {
    let label = pattern.captures(haystack)?.get(1)?.as_str().to_lowercase();
    Encoding::for_label(label.as_bytes())
}
