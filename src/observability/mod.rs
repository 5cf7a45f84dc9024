//! Worker metrics.
//!
//! All collectors live in one explicit bundle constructed at startup and
//! passed by reference into the components that record them; nothing here
//! reaches for a process-global registry beyond the installed recorder.

use metrics::{
    Counter, Gauge, Histogram, counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram,
};

const NS: &str = "keepstack_worker";

pub struct Metrics {
    pub jobs_processed: Counter,
    pub jobs_failed: Counter,
    pub jobs_in_flight: Gauge,
    pub queue_lag: Histogram,
    pub fetch_duration: Histogram,
    pub extract_duration: Histogram,
    pub persist_duration: Histogram,
    pub extract_failures: Counter,
    pub lang_detect_duration: Histogram,
    pub lang_detect_errors: Counter,
}

impl Metrics {
    /// Create the bundle. Must run after the metrics recorder is installed,
    /// or the handles bind to the no-op recorder.
    pub fn new() -> Self {
        describe_counter!(
            format!("{NS}_jobs_processed_total"),
            "Link ingestion jobs successfully processed."
        );
        describe_counter!(
            format!("{NS}_jobs_failed_total"),
            "Link ingestion jobs that failed."
        );
        describe_gauge!(
            format!("{NS}_jobs_in_flight"),
            "Link ingestion jobs currently being processed."
        );
        describe_histogram!(
            format!("{NS}_queue_lag_seconds"),
            "Time between link creation and ingestion pickup."
        );
        describe_histogram!(
            format!("{NS}_fetch_duration_seconds"),
            "Time spent fetching URLs."
        );
        describe_histogram!(
            format!("{NS}_extract_duration_seconds"),
            "Time spent extracting fetched HTML."
        );
        describe_histogram!(
            format!("{NS}_persist_duration_seconds"),
            "Time spent storing extracted content."
        );
        describe_counter!(
            format!("{NS}_extract_failed_total"),
            "Extraction attempts that resulted in errors."
        );
        describe_histogram!(
            format!("{NS}_lang_detect_duration_seconds"),
            "Time spent detecting article language."
        );
        describe_counter!(
            format!("{NS}_lang_detect_total"),
            "Successful language detections grouped by ISO code."
        );
        describe_counter!(
            format!("{NS}_lang_detect_errors_total"),
            "Language detections that failed the reliability check."
        );

        Self {
            jobs_processed: counter!(format!("{NS}_jobs_processed_total")),
            jobs_failed: counter!(format!("{NS}_jobs_failed_total")),
            jobs_in_flight: gauge!(format!("{NS}_jobs_in_flight")),
            queue_lag: histogram!(format!("{NS}_queue_lag_seconds")),
            fetch_duration: histogram!(format!("{NS}_fetch_duration_seconds")),
            extract_duration: histogram!(format!("{NS}_extract_duration_seconds")),
            persist_duration: histogram!(format!("{NS}_persist_duration_seconds")),
            extract_failures: counter!(format!("{NS}_extract_failed_total")),
            lang_detect_duration: histogram!(format!("{NS}_lang_detect_duration_seconds")),
            lang_detect_errors: counter!(format!("{NS}_lang_detect_errors_total")),
        }
    }

    /// Per-language success counter. The label varies per call, so this goes
    /// through the macro instead of a stored handle.
    pub fn record_language(&self, lang: &str) {
        counter!(format!("{NS}_lang_detect_total"), "lang" => lang.to_string()).increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one job on the in-flight gauge. The handler future can be dropped
/// mid-flight when its deadline fires, so the decrement lives in `Drop`;
/// a guard dropped without `finish` also counts the job as failed.
pub struct InFlightGuard<'a> {
    metrics: &'a Metrics,
}

impl<'a> InFlightGuard<'a> {
    pub fn start(metrics: &'a Metrics) -> Self {
        metrics.jobs_in_flight.increment(1.0);
        Self { metrics }
    }

    /// Settle the gauge for a job whose handler ran to completion. The
    /// caller records success or failure itself.
    pub fn finish(self) {
        self.metrics.jobs_in_flight.decrement(1.0);
        std::mem::forget(self);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.jobs_in_flight.decrement(1.0);
        self.metrics.jobs_failed.increment(1);
    }
}
