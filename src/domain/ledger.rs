//! Progress ledger: which candidate ids are done and which failed.
//!
//! `processed_ids` is the authority on "already done". `last_index` is only a
//! hint for where a resumed scan may start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLedger {
    #[serde(default)]
    pub processed_ids: BTreeSet<String>,
    #[serde(default)]
    pub failed_ids: BTreeMap<String, FailureRecord>,
    #[serde(default)]
    pub last_index: usize,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ProgressLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_processed(&self, id: &str) -> bool {
        self.processed_ids.contains(id)
    }

    /// Marks `id` done. A success clears any earlier failure for the same id.
    pub fn mark_processed(&mut self, id: &str) {
        self.failed_ids.remove(id);
        self.processed_ids.insert(id.to_string());
    }

    pub fn mark_failed(&mut self, id: &str, error: impl Into<String>, url: impl Into<String>) {
        self.failed_ids.insert(
            id.to_string(),
            FailureRecord {
                url: url.into(),
                error: error.into(),
                timestamp: Utc::now(),
            },
        );
    }

    /// Monotonic: never moves backwards.
    pub fn update_index(&mut self, index: usize) {
        self.last_index = self.last_index.max(index);
    }

    pub fn touch(&mut self) {
        self.saved_at = Some(Utc::now());
    }

    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed_ids.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_ids.len()
    }
}
