//! Strategy runner: orchestrates one extraction run end to end
//!
//! A run walks the ordered strategy chain sequentially over one transport
//! session, streaming each sub-request's captures through the normalizer
//! into the run-scoped deduplicator so partial progress survives any later
//! failure. If every strategy completes empty, the bundled seed dataset
//! stands in, so a run always terminates with a usable result.
//!
//! Strategies share one session and one politeness budget, so nothing here
//! is parallelized. The caller is expected to `spawn` the run as a detached
//! task and observe it through the event channel.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::events::{ExtractionEvent, RunResult, RunStatus};
use crate::domain::scheme::RawCapture;
use crate::infrastructure::config::ExtractionConfig;
use crate::infrastructure::errors::ExtractionError;
use crate::infrastructure::scheme_repository::SchemeStore;
use crate::infrastructure::transport::TransportSession;
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::ingestor::{IngestStats, Ingestor};
use crate::pipeline::normalizer::normalize_capture;
use crate::pipeline::seed::load_seed_records;
use crate::pipeline::strategy::{
    self, StrategyKind, StrategyPlan, PAGINATED_STRATEGY, SEED_STRATEGY,
};

/// Label for the optional per-scheme detail enrichment pass.
const DETAIL_ENRICH_LABEL: &str = "detail-enrich";

/// Pages the DOM fallback walks. It exists to catch records the APIs hide,
/// not to re-crawl the whole catalog.
const DOM_FALLBACK_PAGES: u32 = 3;

/// Counters accumulated across strategies within one run.
#[derive(Debug, Default)]
struct RunTotals {
    discovered: u64,
    skipped_no_name: u64,
    strategy_source: HashMap<String, u64>,
    /// External ids queued for detail enrichment.
    detail_ids: Vec<String>,
}

pub struct ExtractionRunner {
    config: ExtractionConfig,
    store: Arc<dyn SchemeStore>,
    event_tx: broadcast::Sender<ExtractionEvent>,
    cancel: CancellationToken,
}

impl ExtractionRunner {
    pub fn new(config: ExtractionConfig, store: Arc<dyn SchemeStore>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to run events. Any number of observers may listen.
    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.event_tx.subscribe()
    }

    /// Token callers use to request cancellation. On receipt the in-flight
    /// sub-request finishes, remaining work is skipped, and whatever was
    /// accumulated is finalized and ingested.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run detached. Completion is observed via the event channel and the
    /// joined `RunResult`, never via a synchronous return to a request path.
    pub fn spawn(
        self: Arc<Self>,
        session: Box<dyn TransportSession>,
    ) -> tokio::task::JoinHandle<Result<RunResult, ExtractionError>> {
        tokio::spawn(async move { self.run(session).await })
    }

    /// Execute one full extraction run over the given session.
    ///
    /// Only transport initialization failure is fatal; every other condition
    /// degrades to a smaller result with explainable per-strategy counts.
    pub async fn run(
        &self,
        mut session: Box<dyn TransportSession>,
    ) -> Result<RunResult, ExtractionError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("🚀 Extraction run {} started", run_id);
        self.emit(ExtractionEvent::ExtractionStarted {
            run_id: run_id.clone(),
            timestamp: started_at,
        });

        if let Err(e) = session.open().await {
            error!("Run {} aborted: {}", run_id, e);
            self.emit(ExtractionEvent::ExtractionError {
                run_id: run_id.clone(),
                message: e.to_string(),
            });
            session.close().await;
            return Err(e);
        }

        let mut dedup = Deduplicator::new();
        let mut totals = RunTotals::default();

        // No strategy error escapes this call, so close() runs on every
        // path out of the run.
        self.execute_strategies(session.as_mut(), &run_id, &mut dedup, &mut totals)
            .await;
        session.close().await;

        let cancelled = self.cancel.is_cancelled();
        if !cancelled && dedup.unique_count() == 0 {
            warn!("{} — falling back to seed dataset", ExtractionError::AllStrategiesEmpty);
            self.load_seed_fallback(&run_id, &mut dedup, &mut totals);
        }

        let unique_extracted = dedup.unique_count();
        let records = dedup.finalize();

        let stats = if self.config.persist && !records.is_empty() {
            let ingestor = Ingestor::new(self.store.as_ref(), self.config.ingest_batch_size);
            ingestor
                .ingest(&records, |processed, total| {
                    self.emit(ExtractionEvent::IngestionProgress {
                        run_id: run_id.clone(),
                        processed,
                        total,
                    });
                })
                .await
        } else {
            IngestStats::default()
        };

        let result = RunResult {
            run_id: run_id.clone(),
            discovered: totals.discovered,
            unique_extracted,
            created: stats.created,
            updated: stats.updated,
            failed: stats.failed,
            skipped_no_name: totals.skipped_no_name,
            strategy_source: totals.strategy_source,
            status: if cancelled { RunStatus::Cancelled } else { RunStatus::Completed },
            started_at,
            finished_at: Utc::now(),
        };
        info!("🏁 Extraction run {} finished: {}", run_id, result.summary());
        self.emit(ExtractionEvent::ExtractionCompleted {
            run_id,
            result: result.clone(),
        });
        Ok(result)
    }

    async fn execute_strategies(
        &self,
        session: &mut dyn TransportSession,
        run_id: &str,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        for plan in strategy::strategy_chain() {
            if self.cancel.is_cancelled() {
                info!("Cancellation received, skipping remaining strategies");
                break;
            }
            info!("▶️ Strategy '{}' starting", plan.name);
            // Record the attempt even when it yields nothing: a near-zero
            // count in a previously productive strategy is the operator's
            // signal that the source changed shape.
            totals.strategy_source.entry(plan.name.to_string()).or_insert(0);

            match plan.kind {
                StrategyKind::PaginatedApi => {
                    self.run_paginated(session, &plan, dedup, totals).await;
                    if self.config.enrich_details {
                        self.run_detail_enrichment(session, dedup, totals).await;
                    }
                }
                StrategyKind::KeywordSearch => {
                    let terms = self.config.search_keywords.clone();
                    let urls: Vec<String> =
                        terms.iter().map(|t| strategy::keyword_url(&self.config, t)).collect();
                    self.run_term_sweep(session, &plan, urls, dedup, totals).await;
                }
                StrategyKind::CategorySweep => {
                    let terms = self.config.categories.clone();
                    let urls: Vec<String> =
                        terms.iter().map(|t| strategy::category_url(&self.config, t)).collect();
                    self.run_term_sweep(session, &plan, urls, dedup, totals).await;
                }
                StrategyKind::MinistrySweep => {
                    let terms = self.config.ministries.clone();
                    let urls: Vec<String> =
                        terms.iter().map(|t| strategy::ministry_url(&self.config, t)).collect();
                    self.run_term_sweep(session, &plan, urls, dedup, totals).await;
                }
                StrategyKind::DomFallback => {
                    self.run_dom_fallback(session, &plan, dedup, totals).await;
                }
            }

            info!(
                "⏹️ Strategy '{}' done, {} unique so far",
                plan.name,
                dedup.unique_count()
            );
            self.emit(ExtractionEvent::ExtractionProgress {
                run_id: run_id.to_string(),
                strategy: plan.name.to_string(),
                count_so_far: dedup.unique_count(),
            });
        }
    }

    /// Walk the search API page by page. The source never signals end of
    /// data, so stop on the first zero-yield page or at the page budget,
    /// whichever comes first.
    async fn run_paginated(
        &self,
        session: &mut dyn TransportSession,
        plan: &StrategyPlan,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        for page in 0..self.config.max_pages_per_strategy {
            if self.cancel.is_cancelled() {
                break;
            }
            let url = strategy::paginated_url(&self.config, page);
            session.fetch_direct(&url).await;
            let yielded = self.absorb(session.drain_captures(), plan.name, dedup, totals);
            if yielded == 0 {
                debug!("Page {} yielded nothing, ending pagination", page);
                break;
            }
            self.courtesy_delay().await;
        }
    }

    /// One sub-request per term (keyword, category, or ministry).
    async fn run_term_sweep(
        &self,
        session: &mut dyn TransportSession,
        plan: &StrategyPlan,
        urls: Vec<String>,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        for url in urls {
            if self.cancel.is_cancelled() {
                break;
            }
            session.fetch_direct(&url).await;
            self.absorb(session.drain_captures(), plan.name, dedup, totals);
            self.courtesy_delay().await;
        }
    }

    /// Navigate rendered pages, fire the trigger probes, and take whatever
    /// appears: embedded state captures plus scraped cards.
    async fn run_dom_fallback(
        &self,
        session: &mut dyn TransportSession,
        plan: &StrategyPlan,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        for page in 1..=DOM_FALLBACK_PAGES {
            if self.cancel.is_cancelled() {
                break;
            }
            let url = strategy::dom_page_url(&self.config, page);
            session.goto(&url, self.config.navigation_timeout_ms).await;
            session.trigger_load().await;
            self.absorb(session.drain_captures(), plan.name, dedup, totals);

            let cards = session
                .current_page()
                .map(|(page_url, html)| strategy::parse_scheme_cards(html, page_url))
                .unwrap_or_default();
            for record in cards {
                totals.discovered += 1;
                *totals.strategy_source.entry(plan.name.to_string()).or_insert(0) += 1;
                dedup.observe(record);
            }
            self.courtesy_delay().await;
        }
    }

    /// Best-effort per-scheme detail fetches for ids found by pagination.
    /// Richer captures merge into existing identities through the dedup.
    async fn run_detail_enrichment(
        &self,
        session: &mut dyn TransportSession,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        let ids = std::mem::take(&mut totals.detail_ids);
        if ids.is_empty() {
            return;
        }
        info!("🔎 Enriching {} scheme(s) with detail fetches", ids.len());
        totals.strategy_source.entry(DETAIL_ENRICH_LABEL.to_string()).or_insert(0);
        for id in ids {
            if self.cancel.is_cancelled() {
                break;
            }
            let url = strategy::detail_url(&self.config, &id);
            session.fetch_direct(&url).await;
            self.absorb(session.drain_captures(), DETAIL_ENRICH_LABEL, dedup, totals);
            self.courtesy_delay().await;
        }
    }

    /// Normalize a drained capture batch into the deduplicator. Returns the
    /// number of raw elements discovered, which drives the pagination
    /// stopping rule.
    fn absorb(
        &self,
        captures: Vec<RawCapture>,
        label: &str,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) -> u64 {
        let mut yielded = 0;
        for capture in captures {
            let batch = normalize_capture(&capture, label);
            yielded += batch.discovered;
            totals.discovered += batch.discovered;
            totals.skipped_no_name += batch.skipped_no_name;
            *totals.strategy_source.entry(label.to_string()).or_insert(0) +=
                batch.records.len() as u64;
            for record in batch.records {
                if self.config.enrich_details && label == PAGINATED_STRATEGY {
                    if let Some(id) = &record.external_id {
                        totals.detail_ids.push(id.clone());
                    }
                }
                dedup.observe(record);
            }
        }
        yielded
    }

    fn load_seed_fallback(
        &self,
        run_id: &str,
        dedup: &mut Deduplicator,
        totals: &mut RunTotals,
    ) {
        match load_seed_records() {
            Ok(records) => {
                let count = records.len() as u64;
                for record in records {
                    totals.discovered += 1;
                    dedup.observe(record);
                }
                totals.strategy_source.insert(SEED_STRATEGY.to_string(), count);
            }
            Err(e) => {
                // A broken bundle is a build defect, but it must not turn
                // into a thrown run failure.
                error!("Seed dataset failed to load: {}", e);
                self.emit(ExtractionEvent::ExtractionError {
                    run_id: run_id.to_string(),
                    message: format!("seed fallback unavailable: {e}"),
                });
            }
        }
    }

    /// Etiquette pause between sub-requests, cut short by cancellation.
    async fn courtesy_delay(&self) {
        let delay = Duration::from_millis(self.config.inter_request_delay_ms);
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.cancel.cancelled() => {}
        }
    }

    fn emit(&self, event: ExtractionEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.event_tx.send(event);
    }
}
