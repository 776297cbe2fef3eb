//! Event types for real-time observation of an extraction run
//!
//! Events are broadcast on a `tokio::sync::broadcast` channel so that any
//! number of observers (WebSocket bridges, log sinks, tests) can follow a
//! run without the runner knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Terminal status of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// All strategies executed to completion (possibly via seed fallback).
    Completed,
    /// A cancellation signal cut the run short; counts cover only what was
    /// captured before the signal.
    Cancelled,
}

/// Aggregate outcome of one extraction run. Immutable once the run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    /// Raw elements seen across all captures, before name filtering and dedup.
    pub discovered: u64,
    /// Unique records after deduplication.
    pub unique_extracted: u64,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    /// Elements dropped because no name alias resolved.
    pub skipped_no_name: u64,
    /// Records attributed to each strategy at normalization time.
    pub strategy_source: HashMap<String, u64>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn summary(&self) -> String {
        format!(
            "discovered={} unique={} created={} updated={} failed={} skipped_no_name={} status={:?}",
            self.discovered,
            self.unique_extracted,
            self.created,
            self.updated,
            self.failed,
            self.skipped_no_name,
            self.status,
        )
    }
}

/// Events emitted at each phase boundary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExtractionEvent {
    ExtractionStarted {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    ExtractionProgress {
        run_id: String,
        strategy: String,
        count_so_far: u64,
    },
    /// Intermediate ingestion progress, one per persisted batch.
    IngestionProgress {
        run_id: String,
        processed: u64,
        total: u64,
    },
    ExtractionCompleted {
        run_id: String,
        result: RunResult,
    },
    ExtractionError {
        run_id: String,
        message: String,
    },
}

impl ExtractionEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::ExtractionStarted { run_id, .. }
            | Self::ExtractionProgress { run_id, .. }
            | Self::IngestionProgress { run_id, .. }
            | Self::ExtractionCompleted { run_id, .. }
            | Self::ExtractionError { run_id, .. } => run_id,
        }
    }
}
