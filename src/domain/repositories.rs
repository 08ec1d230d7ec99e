//! Capability interfaces the pipeline is assembled from.
//!
//! Contains trait definitions for fetching pages, extracting products,
//! generating text and persisting records. Infrastructure provides the
//! production implementations; tests substitute their own.

use async_trait::async_trait;
use std::collections::HashSet;

use super::errors::{EnrichmentFailure, ExtractionFailure, FetchFailure, PersistenceFailure};
use super::product::{ProductRecord, ScrapedProduct};

/// A successfully fetched HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    #[must_use]
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchFailure>;
}

/// Pulls product fields out of a fetched detail page.
pub trait ProductExtractor: Send + Sync {
    fn extract(&self, page: &FetchedPage, product_id: &str) -> Result<ScrapedProduct, ExtractionFailure>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, EnrichmentFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

#[async_trait]
pub trait ProductSink: Send + Sync {
    /// The subset of `ids` the sink already holds.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, PersistenceFailure>;

    /// Write `record` unless a record with the same id exists. Safe to repeat.
    async fn insert_if_absent(&self, record: &ProductRecord) -> Result<InsertOutcome, PersistenceFailure>;
}
