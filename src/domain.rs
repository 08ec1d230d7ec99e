//! Domain module - Core business logic and entities
//!
//! This module contains the candidate ranking model, the scraped/enriched
//! product records, the progress ledger and the failure taxonomy shared by
//! every stage of the pipeline.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod candidate;
pub mod content;
pub mod errors;
pub mod ledger;
pub mod product;
pub mod repositories;
pub mod stats;

// Re-export commonly used items for convenience
pub use candidate::{AddOutcome, CandidateProduct, CandidateSet, RankBonusConfig};
pub use content::{ContentOrigin, EnrichedContent, Locale, ReviewSections, SocialPlatform};
pub use errors::{EnrichmentFailure, ExtractionFailure, FailureKind, FetchFailure, PersistenceFailure};
pub use ledger::{FailureRecord, ProgressLedger};
pub use product::{PriceBlock, ProductRecord, ReviewSummary, ScrapedProduct, affiliate_link};
pub use repositories::{FetchedPage, InsertOutcome, PageFetcher, ProductExtractor, ProductSink, TextGenerator};
pub use stats::{RunStatistics, RunSummary, Stage, StageTiming};
