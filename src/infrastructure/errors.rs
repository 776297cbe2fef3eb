//! Error taxonomy for the extraction pipeline
//!
//! Only `TransportInit` is fatal to a run. Every other condition degrades to
//! a smaller, explainable result: the source's instability is the expected
//! steady state, not an exception.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The underlying session resource could not be acquired. Aborts the run
    /// before any strategy executes.
    #[error("transport session failed to initialize: {0}")]
    TransportInit(String),

    /// A navigation exceeded its timeout. Treated as a zero-result outcome
    /// for that sub-request, never propagated out of the runner.
    #[error("navigation timed out after {timeout_ms}ms: {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// A captured body could not be parsed as structured data.
    #[error("failed to parse captured response from {url}: {reason}")]
    CaptureParse { url: String, reason: String },

    /// A single record failed to persist. Counted under `failed`, does not
    /// abort the batch.
    #[error("ingestion failed for '{identity}': {reason}")]
    Ingestion { identity: String, reason: String },

    /// Every strategy completed with zero unique records. Consumed internally
    /// by the seed fallback, never surfaced to the caller.
    #[error("all extraction strategies returned zero records")]
    AllStrategiesEmpty,

    #[error("store operation failed: {0}")]
    Store(#[from] sqlx::Error),

    #[error("seed dataset is invalid: {0}")]
    SeedData(#[from] serde_json::Error),
}

impl ExtractionError {
    /// Whether this error aborts the run. Everything except transport
    /// initialization degrades in place.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportInit(_))
    }
}
