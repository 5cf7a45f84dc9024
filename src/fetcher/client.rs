use crate::fetcher::{decode::decode_body, errors::FetchError, types::PageResponse};
use chrono::Utc;
use reqwest::{Client, ClientBuilder, header};
use std::time::Duration;
use tracing::instrument;

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = "keepstack-worker/0.1";

/// HTTP fetcher for archive ingestion. One instance is shared by all jobs;
/// the timeout bounds the whole request including the body read.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                );
                headers
            })
            .build()
            .map_err(|e| FetchError::Unknown(e.to_string()))?;

        Ok(Self { client })
    }

    /// Download a page, following redirects and recording the final URL.
    /// Any HTTP status >= 400 is an error; the caller decides on retries.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        let parsed_url = url::Url::parse(url)?;

        let response = self
            .client
            .get(parsed_url)
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        if let Some(content_length) = response.content_length()
            && content_length > MAX_BODY_SIZE
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        let url_final = response.url().clone();
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Http {
                status,
                retriable: status.is_server_error(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body_raw = response
            .bytes()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        // Content-Length may have been missing or wrong.
        if body_raw.len() as u64 > MAX_BODY_SIZE {
            return Err(FetchError::BodyTooLarge(body_raw.len() as u64));
        }

        let (body_utf8, charset) = decode_body(&content_type, &body_raw);

        Ok(PageResponse {
            url_final,
            status,
            body_raw,
            body_utf8,
            charset,
            fetched_at: Utc::now(),
        })
    }
}
