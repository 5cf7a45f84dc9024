use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use url::Url;

/// A downloaded page. `url_final` is the URL reached after redirects;
/// `body_utf8` is the body decoded with the detected charset.
#[derive(Debug)]
pub struct PageResponse {
    pub url_final: Url,
    pub status: StatusCode,
    pub body_raw: Bytes,
    pub body_utf8: String,
    pub charset: &'static str,
    pub fetched_at: DateTime<Utc>,
}
