//! Extraction pipeline: strategies, normalization, dedup, ingestion.

pub mod dedup;
pub mod ingestor;
pub mod normalizer;
pub mod runner;
pub mod seed;
pub mod strategy;

pub use dedup::Deduplicator;
pub use ingestor::{IngestStats, Ingestor};
pub use normalizer::{normalize_capture, NormalizedBatch};
pub use runner::ExtractionRunner;
pub use strategy::{strategy_chain, StrategyKind, StrategyPlan, SEED_STRATEGY};
