//! Durable storage for the progress ledger.
//!
//! The ledger is a single JSON document. Saves write a sibling temp file and
//! rename it over the target so a crash never leaves a half-written ledger.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::ProgressLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to access ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger; a missing file is an empty ledger, an unreadable one
    /// is an error.
    pub async fn load(&self) -> Result<ProgressLedger, LedgerError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("No ledger at {}, starting fresh", self.path.display());
            return Ok(ProgressLedger::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await.map_err(io_error(&self.path))?;
        let ledger: ProgressLedger = serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        info!(
            "📂 Loaded ledger: {} processed, {} failed",
            ledger.processed_count(),
            ledger.failed_count()
        );
        Ok(ledger)
    }

    /// Stamp and atomically persist the ledger
    pub async fn save(&self, ledger: &mut ProgressLedger) -> Result<(), LedgerError> {
        ledger.touch();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
            }
        }

        let json = serde_json::to_string_pretty(ledger)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await.map_err(io_error(&temp))?;
        tokio::fs::rename(&temp, &self.path).await.map_err(io_error(&self.path))?;

        debug!("💾 Ledger saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty_ledger() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("progress.json"));
        let ledger = store.load().await.unwrap();
        assert_eq!(ledger.processed_count(), 0);
        assert_eq!(ledger.last_index, 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("state").join("progress.json"));

        let mut ledger = ProgressLedger::new();
        ledger.mark_processed("A");
        ledger.mark_failed("B", "HTTP 404", "https://x/dp/B");
        ledger.update_index(7);
        store.save(&mut ledger).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_processed("A"));
        assert_eq!(loaded.failed_ids["B"].error, "HTTP 404");
        assert_eq!(loaded.last_index, 7);
        assert!(loaded.saved_at.is_some());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = LedgerStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        assert!(err.to_string().contains("corrupt"));
    }

    #[tokio::test]
    async fn test_legacy_document_without_timestamp_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, r#"{"processed_ids": ["A", "B"], "failed_ids": {}, "last_index": 2}"#).unwrap();

        let ledger = LedgerStore::new(&path).load().await.unwrap();
        assert_eq!(ledger.processed_count(), 2);
        assert!(ledger.saved_at.is_none());
    }
}
