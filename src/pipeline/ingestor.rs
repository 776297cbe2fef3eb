//! Batched, best-effort ingestion of finalized records
//!
//! Ingestion is a best-effort batch, not all-or-nothing: a per-record store
//! failure is counted and the rest of the batch proceeds. Batch boundaries
//! carry no transactional meaning; they bound resource usage and pace the
//! progress events.

use tracing::{debug, warn};

use crate::domain::scheme::SchemeRecord;
use crate::infrastructure::errors::ExtractionError;
use crate::infrastructure::scheme_repository::SchemeStore;

/// Aggregate counts from one ingestion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
}

pub struct Ingestor<'a> {
    store: &'a dyn SchemeStore,
    batch_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn SchemeStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Upsert every record, invoking `on_batch(processed, total)` after each
    /// completed batch so callers can emit intermediate progress.
    pub async fn ingest<F>(&self, records: &[SchemeRecord], mut on_batch: F) -> IngestStats
    where
        F: FnMut(u64, u64),
    {
        let total = records.len() as u64;
        let mut stats = IngestStats::default();

        for batch in records.chunks(self.batch_size) {
            for record in batch {
                match self.store.upsert(record).await {
                    Ok(outcome) if outcome.created => stats.created += 1,
                    Ok(_) => stats.updated += 1,
                    Err(e) => {
                        stats.failed += 1;
                        let err = ExtractionError::Ingestion {
                            identity: record.identity_key().to_string(),
                            reason: e.to_string(),
                        };
                        warn!("{}", err);
                    }
                }
            }
            let processed = stats.created + stats.updated + stats.failed;
            debug!("Ingested batch: {}/{} records", processed, total);
            on_batch(processed, total);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scheme::{IdentityKey, PersistedScheme};
    use crate::infrastructure::scheme_repository::UpsertOutcome;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store that can be told to fail specific identities.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, SchemeRecord>>,
        fail_keys: Vec<String>,
    }

    #[async_trait]
    impl SchemeStore for MemoryStore {
        async fn find_by_identity(
            &self,
            key: &IdentityKey,
        ) -> Result<Option<PersistedScheme>, ExtractionError> {
            Ok(self.rows.lock().unwrap().get(key.as_str()).map(|record| {
                PersistedScheme {
                    record: record.clone(),
                    created_at: record.extracted_at,
                    updated_at: record.extracted_at,
                    is_active: true,
                }
            }))
        }

        async fn upsert(&self, record: &SchemeRecord) -> Result<UpsertOutcome, ExtractionError> {
            let key = record.identity_key().to_string();
            if self.fail_keys.contains(&key) {
                return Err(ExtractionError::Ingestion {
                    identity: key,
                    reason: "simulated store failure".to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            let created = rows.insert(key, record.clone()).is_none();
            Ok(UpsertOutcome { created })
        }
    }

    fn records(n: usize) -> Vec<SchemeRecord> {
        (0..n).map(|i| SchemeRecord::named(format!("Scheme {i}"))).collect()
    }

    #[tokio::test]
    async fn second_pass_updates_instead_of_creating() {
        let store = MemoryStore::default();
        let ingestor = Ingestor::new(&store, 50);
        let set = records(5);

        let first = ingestor.ingest(&set, |_, _| {}).await;
        assert_eq!(first, IngestStats { created: 5, updated: 0, failed: 0 });

        let second = ingestor.ingest(&set, |_, _| {}).await;
        assert_eq!(second, IngestStats { created: 0, updated: 5, failed: 0 });
    }

    #[tokio::test]
    async fn per_record_failure_does_not_abort_the_batch() {
        let store = MemoryStore {
            fail_keys: vec!["scheme 1".to_string(), "scheme 3".to_string()],
            ..Default::default()
        };
        let ingestor = Ingestor::new(&store, 2);

        let stats = ingestor.ingest(&records(5), |_, _| {}).await;
        assert_eq!(stats.created, 3);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn batch_callback_paces_progress() {
        let store = MemoryStore::default();
        let ingestor = Ingestor::new(&store, 2);

        let mut checkpoints = Vec::new();
        ingestor.ingest(&records(5), |done, total| checkpoints.push((done, total))).await;
        assert_eq!(checkpoints, vec![(2, 5), (4, 5), (5, 5)]);
    }
}
