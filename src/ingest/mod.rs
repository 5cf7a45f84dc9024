pub mod processor;

pub use processor::Processor;

use thiserror::Error;
use uuid::Uuid;

use crate::extractor::ExtractError;
use crate::fetcher::FetchError;

/// Terminal error of one pipeline run. Every stage failure aborts the rest
/// of the pipeline; nothing is partially committed.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("link {0} not found")]
    NotFound(Uuid),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("persist failed: {0}")]
    Persist(#[from] sqlx::Error),
}

impl IngestError {
    /// Whether queue redelivery may succeed. Missing links and unparsable
    /// documents are permanent for that payload; fetch and persist failures
    /// are generally transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound(_) => false,
            Self::Extract(_) => false,
            Self::Fetch(err) => err.should_retry(),
            Self::Persist(_) => true,
        }
    }
}
