//! Shelf Scout - priority-ranked, resumable crawl-and-enrich pipeline
//!
//! Discovers products on a retail site's bestseller-style listings, ranks
//! them by source weight and listing position, then enriches the top of the
//! list with generated reviews and stores the result.

pub mod application;
pub mod domain;
pub mod infrastructure;
