//! Error taxonomy for the retrieval pipeline.
//!
//! Every I/O-performing stage returns one of these variants. The pipeline
//! decides per variant whether to absorb the fault (log and degrade) or
//! surface it; only [`RetrievalError::InvalidInput`] in strict mode ever
//! reaches the caller as a failure.

use thiserror::Error;

/// Faults the retrieval pipeline can encounter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    /// No usable query could be extracted from the payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A metasearch engine failed or answered with something other than JSON.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    /// Network error, timeout or non-2xx status while fetching a page.
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    /// The fetched body could not be turned into text.
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// Embedding or vector-store error while writing to the cache.
    #[error("cache write failed: {0}")]
    CacheWrite(String),

    /// Embedding or vector-store error while reading from the cache.
    #[error("cache read failed: {0}")]
    CacheRead(String),

    /// A cache operation was requested but no cache is configured.
    #[error("vector cache is disabled")]
    CacheDisabled,
}

impl RetrievalError {
    /// Stable machine-readable code used in structured error documents.
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::InvalidInput(_) => "invalid_input",
            RetrievalError::SearchUnavailable(_) => "search_unavailable",
            RetrievalError::FetchFailure(_) => "fetch_failure",
            RetrievalError::ExtractionFailure(_) => "extraction_failure",
            RetrievalError::CacheWrite(_) => "cache_write_failure",
            RetrievalError::CacheRead(_) => "cache_read_failure",
            RetrievalError::CacheDisabled => "cache_disabled",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
