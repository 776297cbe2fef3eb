//! scheme-harvester: resilient multi-strategy extraction and ingestion
//!
//! Pulls structured scheme listings from a source with no stable public
//! contract, using a chain of extraction strategies of decreasing
//! reliability, then merges the results into a durable store without
//! duplicates — and never surfaces a fully-empty result downstream.
//!
//! The pieces, leaf first: a [`infrastructure::transport::TransportSession`]
//! owns the network context and captures record-bearing responses; the
//! [`pipeline::runner::ExtractionRunner`] drives the strategy chain and
//! streams captures through the normalizer into a run-scoped deduplicator;
//! the ingestor upserts the finalized set into a [`infrastructure::scheme_repository::SchemeStore`].

pub mod domain;
pub mod infrastructure;
pub mod pipeline;

pub use domain::{ExtractionEvent, RunResult, RunStatus, SchemeRecord};
pub use infrastructure::{ExtractionConfig, ExtractionError, HttpSession, SqliteSchemeRepository};
pub use pipeline::ExtractionRunner;
