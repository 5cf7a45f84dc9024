use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::ingest::IngestError;
use crate::observability::{InFlightGuard, Metrics};
use crate::store::Store;

/// Runs the ingestion pipeline for one link: lookup, fetch, extract,
/// persist. Failure at any stage aborts the rest; retries are entirely the
/// queue's concern.
pub struct Processor {
    fetcher: Fetcher,
    extractor: Arc<dyn Extractor>,
    store: Store,
    metrics: Arc<Metrics>,
}

impl Processor {
    pub fn new(
        fetcher: Fetcher,
        extractor: Arc<dyn Extractor>,
        store: Store,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            metrics,
        }
    }

    #[instrument(skip(self), fields(link_id = %link_id))]
    pub async fn process(&self, link_id: Uuid) -> Result<(), IngestError> {
        let link = self.store.lookup_link(link_id).await?;

        self.metrics
            .queue_lag
            .record(queue_lag_seconds(Utc::now(), link.created_at));

        let fetch_start = Instant::now();
        let page = self.fetcher.fetch(&link.url).await?;
        self.metrics
            .fetch_duration
            .record(fetch_start.elapsed().as_secs_f64());

        let extract_start = Instant::now();
        let extracted = self.extractor.extract(&page.url_final, &page.body_utf8);
        self.metrics
            .extract_duration
            .record(extract_start.elapsed().as_secs_f64());

        let (article, diagnostics) = match extracted {
            Ok(result) => result,
            Err(err) => {
                self.metrics.extract_failures.increment(1);
                warn!(url = %page.url_final, "extraction failed: {err}");
                return Err(err.into());
            }
        };

        self.metrics
            .lang_detect_duration
            .record(diagnostics.lang_detect_duration.as_secs_f64());
        match article.language.as_deref() {
            Some(lang) => self.metrics.record_language(lang),
            // Empty text means detection never ran; only count real attempts.
            None if !article.text.is_empty() => self.metrics.lang_detect_errors.increment(1),
            None => {}
        }

        let persist_start = Instant::now();
        self.store
            .persist(&link, &article, &page.body_utf8)
            .await
            .map_err(IngestError::Persist)?;
        self.metrics
            .persist_duration
            .record(persist_start.elapsed().as_secs_f64());

        info!(
            url = %page.url_final,
            words = article.word_count,
            lang = article.language.as_deref().unwrap_or("-"),
            charset = page.charset,
            "archived link"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::queue::MessageHandler for Processor {
    async fn handle(&self, link_id: Uuid) -> Result<(), crate::queue::HandlerError> {
        use crate::queue::HandlerError;

        let in_flight = InFlightGuard::start(&self.metrics);
        let result = self.process(link_id).await;
        in_flight.finish();

        match result {
            Ok(()) => {
                self.metrics.jobs_processed.increment(1);
                Ok(())
            }
            Err(err) => {
                self.metrics.jobs_failed.increment(1);
                if err.is_transient() {
                    Err(HandlerError::transient(err))
                } else {
                    Err(HandlerError::permanent(err))
                }
            }
        }
    }
}

/// Seconds between link creation and ingestion pickup, clamped at zero so
/// clock skew between the API and worker hosts never reports negative lag.
fn queue_lag_seconds(now: DateTime<Utc>, created_at: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds().max(0) as f64 / 1000.0
}
