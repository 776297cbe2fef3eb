//! CLI entry point: run one extraction end to end.
//!
//! Usage: `scheme-harvester [config.json]`. The database location comes
//! from `DATABASE_URL` (defaults to a local SQLite file). Progress is
//! followed on the event channel and logged; Ctrl-C requests a graceful
//! cancellation that keeps everything captured so far.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scheme_harvester::infrastructure::config::ExtractionConfig;
use scheme_harvester::infrastructure::scheme_repository::SqliteSchemeRepository;
use scheme_harvester::infrastructure::transport::HttpSession;
use scheme_harvester::pipeline::runner::ExtractionRunner;
use scheme_harvester::ExtractionEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "harvester.json".to_string());
    let config = ExtractionConfig::load_or_default(Path::new(&config_path))?;

    let database_url = ExtractionConfig::database_url();
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .with_context(|| format!("failed to open store at {database_url}"))?;
    let repository = SqliteSchemeRepository::new(pool);
    repository.initialize().await?;

    let session = Box::new(HttpSession::new(config.endpoint.clone()));
    let runner = Arc::new(ExtractionRunner::new(config, Arc::new(repository)));

    let mut events = runner.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ExtractionEvent::ExtractionProgress { strategy, count_so_far, .. } = &event {
                info!("progress: {} unique after '{}'", count_so_far, strategy);
            }
        }
    });

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing in-flight request and finalizing");
            cancel.cancel();
        }
    });

    let result = runner.spawn(session).await??;
    info!("Run {} done: {}", result.run_id, result.summary());
    for (strategy, count) in &result.strategy_source {
        info!("  {:>20}: {}", strategy, count);
    }
    Ok(())
}
