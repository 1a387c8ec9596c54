//! Record Store
//!
//! Append-only record list plus a membership set keyed by sequence number.
//! Gap detection only ever consults the set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::wire::MarketRecord;

/// Action to take when a sequence number arrives a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Append the record anyway; only the membership set de-duplicates.
    #[default]
    Keep,
    /// Discard the second arrival, increment counter.
    Drop,
}

#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<MarketRecord>,
    seen: BTreeSet<i32>,
    policy: DuplicatePolicy,
    duplicates: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Append a record. Returns false if the duplicate policy discarded it.
    pub fn add(&mut self, record: MarketRecord) -> bool {
        if !self.seen.insert(record.sequence) {
            self.duplicates += 1;
            debug!(seq = record.sequence, policy = ?self.policy, "Duplicate sequence");
            if self.policy == DuplicatePolicy::Drop {
                return false;
            }
        }
        self.records.push(record);
        true
    }

    /// Largest sequence stored, or 0 when empty.
    pub fn max_sequence(&self) -> i32 {
        self.seen.last().copied().unwrap_or(0).max(0)
    }

    pub fn contains(&self, sequence: i32) -> bool {
        self.seen.contains(&sequence)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of arrivals whose sequence was already present
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn records(&self) -> &[MarketRecord] {
        &self.records
    }

    /// Stable ascending sort by sequence, consuming the store.
    pub fn into_sorted(self) -> Vec<MarketRecord> {
        let mut records = self.records;
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Stable ascending copy by sequence.
    pub fn sorted_by_sequence(&self) -> Vec<MarketRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.sequence);
        records
    }
}
