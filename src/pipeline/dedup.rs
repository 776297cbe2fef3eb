//! Run-scoped deduplication with field-level merge
//!
//! One `Deduplicator` lives for exactly one extraction run. Scoping the map
//! to the run avoids unbounded growth and cross-run contamination. Insertion
//! order is preserved so finalized records ingest in capture order.

use std::collections::HashMap;
use tracing::trace;

use crate::domain::scheme::{IdentityKey, SchemeRecord};

#[derive(Debug, Default)]
pub struct Deduplicator {
    by_key: HashMap<IdentityKey, usize>,
    records: Vec<Option<SchemeRecord>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one record. Returns `true` when its identity was newly
    /// discovered this run. On a repeat identity, the new record's non-empty
    /// fields are layered over the held one: later strategies sometimes
    /// carry richer detail for the same entity.
    pub fn observe(&mut self, record: SchemeRecord) -> bool {
        let key = record.identity_key();
        match self.by_key.get(&key) {
            Some(&slot) => {
                if let Some(existing) = self.records[slot].as_mut() {
                    trace!("Merging repeat identity '{}'", key);
                    existing.merge_from(&record);
                }
                false
            }
            None => {
                self.records.push(Some(record));
                self.by_key.insert(key, self.records.len() - 1);
                true
            }
        }
    }

    /// Unique identities observed so far.
    pub fn unique_count(&self) -> u64 {
        self.by_key.len() as u64
    }

    /// Consume the run's state, returning the unique records in first-seen
    /// order. The deduplicator is empty afterwards.
    pub fn finalize(&mut self) -> Vec<SchemeRecord> {
        self.by_key.clear();
        self.records.drain(..).flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_identity_is_not_newly_discovered() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.observe(SchemeRecord::named("Test Yojana")));
        assert!(!dedup.observe(SchemeRecord::named("test yojana")));
        assert_eq!(dedup.unique_count(), 1);
    }

    #[test]
    fn later_record_enriches_blank_fields() {
        let mut dedup = Deduplicator::new();

        let first = SchemeRecord::named("Test Yojana");
        dedup.observe(first);

        let mut second = SchemeRecord::named("Test Yojana");
        second.ministry = "M1".to_string();
        dedup.observe(second);

        let finalized = dedup.finalize();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].ministry, "M1");
    }

    #[test]
    fn later_non_empty_wins_on_conflict() {
        let mut dedup = Deduplicator::new();

        let mut first = SchemeRecord::named("Conflicted");
        first.external_id = Some("S7".to_string());
        first.ministry = "Ministry A".to_string();
        dedup.observe(first);

        let mut second = SchemeRecord::named("Conflicted");
        second.external_id = Some("S7".to_string());
        second.ministry = "Ministry B".to_string();
        second.category = "Welfare".to_string();
        dedup.observe(second);

        let finalized = dedup.finalize();
        assert_eq!(finalized[0].ministry, "Ministry B");
        assert_eq!(finalized[0].category, "Welfare");
    }

    #[test]
    fn finalize_preserves_first_seen_order_and_clears() {
        let mut dedup = Deduplicator::new();
        for name in ["C", "A", "B", "A"] {
            dedup.observe(SchemeRecord::named(name));
        }
        let names: Vec<String> = dedup.finalize().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["C", "A", "B"]);
        assert_eq!(dedup.unique_count(), 0);
        assert!(dedup.finalize().is_empty());
    }

    #[test]
    fn external_id_separates_same_named_records() {
        let mut dedup = Deduplicator::new();

        let mut first = SchemeRecord::named("Shared Name");
        first.external_id = Some("S1".to_string());
        let mut second = SchemeRecord::named("Shared Name");
        second.external_id = Some("S2".to_string());

        assert!(dedup.observe(first));
        assert!(dedup.observe(second));
        assert_eq!(dedup.unique_count(), 2);
    }
}
