//! Infrastructure layer for HTTP, parsing, generation and storage
//!
//! This module provides the production implementations of the domain
//! capability traits, plus configuration and logging.

pub mod bundle_store;
pub mod candidate_store;
pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod ledger_store;
pub mod logging;
pub mod memory_sink;
pub mod ollama_client;
pub mod parsing;
pub mod product_repository;
pub mod retry_policy;

// Re-export commonly used items
pub use bundle_store::{BundleImage, FileBundleSink, ReviewDigest, SocialBundle, SocialBundleWriter};
pub use candidate_store::{CandidateStore, CandidateStoreError};
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpClient;
pub use ledger_store::{LedgerError, LedgerStore};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use memory_sink::MemorySink;
pub use ollama_client::OllamaClient;
pub use parsing::{DetailPageExtractor, ListingParser, ParsingConfig};
pub use product_repository::SqliteProductSink;
pub use retry_policy::{DelayRange, RetryCalculator};
