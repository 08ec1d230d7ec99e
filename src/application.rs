//! Application layer - pipeline stages built on the domain traits
//!
//! - `discovery`: weighted crawl of listing sources into a ranked candidate set
//! - `enrichment`: generated reviews and social posts with deterministic fallbacks
//! - `batch`: the worker-pool orchestrator driving fetch → extract → enrich → persist
//! - `social`: ready-to-post bundles for the top candidates

pub mod batch;
pub mod discovery;
pub mod enrichment;
pub mod prompts;
pub mod review_parser;
pub mod social;

pub use batch::{BatchOrchestrator, RunParameters, RunReport, StopReason, TaskRecord, TaskStatus};
pub use discovery::{CrawlState, DiscoveryCrawler, DiscoveryReport, DiscoveryStats};
pub use enrichment::{EnrichmentGenerator, render_description};
pub use review_parser::{ParsedReview, ReviewParseError, parse_review};
pub use social::{SocialPublisher, SocialReport};
