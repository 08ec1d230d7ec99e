//! In-memory product sink
//!
//! Used for dry runs and tests. Records are kept in insertion order and can
//! be pre-seeded with ids that should count as already stored.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::domain::{InsertOutcome, PersistenceFailure, ProductRecord, ProductSink};

#[derive(Debug, Default)]
pub struct MemorySink {
    known: RwLock<HashSet<String>>,
    records: RwLock<Vec<ProductRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that reports `ids` as already present
    pub fn with_existing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: RwLock::new(ids.into_iter().map(Into::into).collect()),
            records: RwLock::default(),
        }
    }

    pub async fn records(&self) -> Vec<ProductRecord> {
        self.records.read().await.clone()
    }

    pub async fn stored_ids(&self) -> Vec<String> {
        self.records.read().await.iter().map(|r| r.id.clone()).collect()
    }
}

#[async_trait]
impl ProductSink for MemorySink {
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, PersistenceFailure> {
        let known = self.known.read().await;
        Ok(ids.iter().filter(|id| known.contains(*id)).cloned().collect())
    }

    async fn insert_if_absent(&self, record: &ProductRecord) -> Result<InsertOutcome, PersistenceFailure> {
        if !self.known.write().await.insert(record.id.clone()) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        tracing::info!("Stored product in memory: {}", record.id);
        self.records.write().await.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
}
