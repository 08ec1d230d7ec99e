//! Candidate list files written by discovery and read by the batch run.
//!
//! Two formats carry the same ranked list: a flat CSV for spreadsheets and a
//! JSON array with every candidate field. Loading prefers the JSON file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{CandidateProduct, candidate::sort_by_priority};
use crate::infrastructure::parsing::{extract_product_id, is_valid_product_id};

#[derive(Error, Debug)]
pub enum CandidateStoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid candidate JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CandidateStoreError + '_ {
    move |source| CandidateStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> CandidateStoreError + '_ {
    move |source| CandidateStoreError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// One CSV line. `rank` 0 means the listing position was unknown.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    url: String,
    #[serde(default)]
    id: String,
    priority_score: f64,
    #[serde(default)]
    source: String,
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    category: String,
    #[serde(default)]
    title: String,
}

impl From<&CandidateProduct> for CsvRow {
    fn from(candidate: &CandidateProduct) -> Self {
        Self {
            url: candidate.canonical_url.clone(),
            id: candidate.id.clone(),
            priority_score: (candidate.priority_score * 100.0).round() / 100.0,
            source: candidate.discovery_source.clone(),
            rank: candidate.rank_in_source.unwrap_or(0),
            category: candidate.category.clone(),
            title: candidate.title.clone(),
        }
    }
}

impl CsvRow {
    fn into_candidate(self) -> Option<CandidateProduct> {
        let id = if self.id.trim().is_empty() {
            extract_product_id(&self.url)?
        } else {
            self.id.trim().to_ascii_uppercase()
        };
        if !is_valid_product_id(&id) {
            return None;
        }
        Some(CandidateProduct {
            id,
            canonical_url: self.url,
            discovery_source: self.source,
            rank_in_source: (self.rank > 0).then_some(self.rank),
            priority_score: self.priority_score,
            first_seen_at: Utc::now(),
            category: self.category,
            title: self.title,
            listing_price: None,
            listing_rating: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CandidateStore {
    csv_path: PathBuf,
    json_path: PathBuf,
}

impl CandidateStore {
    pub fn new(csv_path: impl Into<PathBuf>, json_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            json_path: json_path.into(),
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    /// Write both files, highest priority first
    pub async fn write_all(&self, candidates: &[CandidateProduct]) -> Result<(), CandidateStoreError> {
        let mut ranked = candidates.to_vec();
        sort_by_priority(&mut ranked);

        for path in [&self.csv_path, &self.json_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        for candidate in &ranked {
            writer.serialize(CsvRow::from(candidate))?;
        }
        let csv_bytes = writer
            .into_inner()
            .map_err(|e| io_error(&self.csv_path)(e.into_error()))?;
        tokio::fs::write(&self.csv_path, csv_bytes)
            .await
            .map_err(io_error(&self.csv_path))?;

        let json = serde_json::to_string_pretty(&ranked).map_err(json_error(&self.json_path))?;
        tokio::fs::write(&self.json_path, json)
            .await
            .map_err(io_error(&self.json_path))?;

        info!(
            "💾 Saved {} candidates to {} and {}",
            ranked.len(),
            self.csv_path.display(),
            self.json_path.display()
        );
        Ok(())
    }

    /// Load the ranked candidate list, JSON first, CSV as fallback
    pub async fn load(&self) -> Result<Vec<CandidateProduct>, CandidateStoreError> {
        let mut candidates = match self.load_json().await {
            Ok(Some(list)) if !list.is_empty() => list,
            Ok(_) => self.load_csv().await?.unwrap_or_default(),
            Err(e) => {
                warn!("⚠️ {}", e);
                self.load_csv().await?.unwrap_or_default()
            }
        };

        if candidates.is_empty() {
            warn!("No candidates found in {} or {}", self.json_path.display(), self.csv_path.display());
        }
        sort_by_priority(&mut candidates);
        Ok(candidates)
    }

    async fn load_json(&self) -> Result<Option<Vec<CandidateProduct>>, CandidateStoreError> {
        if !tokio::fs::try_exists(&self.json_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.json_path)
            .await
            .map_err(io_error(&self.json_path))?;
        let mut list: Vec<CandidateProduct> = serde_json::from_str(&content).map_err(json_error(&self.json_path))?;
        list.retain(|candidate| {
            let valid = is_valid_product_id(&candidate.id);
            if !valid {
                warn!("Dropping candidate with invalid id {:?}", candidate.id);
            }
            valid
        });
        info!("📂 Loaded {} candidates from JSON", list.len());
        Ok(Some(list))
    }

    async fn load_csv(&self) -> Result<Option<Vec<CandidateProduct>>, CandidateStoreError> {
        if !tokio::fs::try_exists(&self.csv_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = tokio::fs::read(&self.csv_path).await.map_err(io_error(&self.csv_path))?;

        let mut reader = csv::Reader::from_reader(content.as_slice());
        let mut list = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            match row {
                Ok(row) => match row.into_candidate() {
                    Some(candidate) => list.push(candidate),
                    None => warn!("Skipping CSV row {}: no valid product id", line + 2),
                },
                Err(e) => warn!("Skipping CSV row {}: {}", line + 2, e),
            }
        }
        info!("📂 Loaded {} candidates from CSV", list.len());
        Ok(Some(list))
    }
}
