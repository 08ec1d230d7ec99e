//! Discovery crawler
//!
//! Walks each source's listing tree (root page, sub-categories, paginated
//! continuations) and merges every product reference into a [`CandidateSet`].
//! All mutable crawl state lives in [`CrawlState`], which the caller owns.

use scraper::Html;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{AddOutcome, CandidateProduct, CandidateSet, FetchFailure, PageFetcher};
use crate::infrastructure::config::{DiscoveryConfig, SiteConfig, SourceConfig};
use crate::infrastructure::parsing::{CategoryLink, ListingEntry, ListingParser};
use crate::infrastructure::retry_policy::DelayRange;

/// Category label for products found on a source's root page
pub const ROOT_CATEGORY: &str = "Main";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStats {
    pub products_new: usize,
    pub products_upgraded: usize,
    pub requests_ok: usize,
    pub requests_failed: usize,
    pub rate_limited: usize,
    pub categories_visited: usize,
    /// Product references observed per source
    pub per_source: BTreeMap<String, usize>,
}

impl DiscoveryStats {
    pub fn log_summary(&self, total: usize) {
        info!("📊 Discovery statistics");
        info!("   Unique products: {}", total);
        info!("   New: {} | Upgraded: {}", self.products_new, self.products_upgraded);
        info!(
            "   Requests: {} ok, {} failed ({} rate limited)",
            self.requests_ok, self.requests_failed, self.rate_limited
        );
        info!("   Categories visited: {}", self.categories_visited);
        for (source, count) in &self.per_source {
            info!("   {:<20} {}", source, count);
        }
    }
}

/// Everything a crawl mutates
#[derive(Debug, Default)]
pub struct CrawlState {
    pub candidates: CandidateSet,
    pub visited_categories: HashSet<String>,
    pub stats: DiscoveryStats,
}

impl CrawlState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parsed content of one listing page
#[derive(Debug, Default)]
struct ListingPage {
    entries: Vec<ListingEntry>,
    categories: Vec<CategoryLink>,
    continuations: Vec<String>,
}

/// Which parts of a listing page a caller needs
#[derive(Debug, Clone, Copy)]
enum PageKind<'a> {
    Root { nav_pattern: &'a str },
    CategoryFirst { max_pages: u32 },
    Continuation,
}

/// Result of one crawl
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub candidates: Vec<CandidateProduct>,
    pub stats: DiscoveryStats,
}

pub struct DiscoveryCrawler {
    fetcher: Arc<dyn PageFetcher>,
    parser: ListingParser,
    site: SiteConfig,
    config: DiscoveryConfig,
}

impl DiscoveryCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, parser: ListingParser, site: SiteConfig, config: DiscoveryConfig) -> Self {
        Self {
            fetcher,
            parser,
            site,
            config,
        }
    }

    /// Crawl every source into a fresh state and return the ranked list
    pub async fn discover(&self) -> DiscoveryReport {
        let mut state = CrawlState::new();
        self.crawl(&mut state).await;
        state.stats.log_summary(state.candidates.len());
        DiscoveryReport {
            candidates: state.candidates.into_ranked(),
            stats: state.stats,
        }
    }

    /// Crawl sources in descending weight order until the target is reached
    pub async fn crawl(&self, state: &mut CrawlState) {
        let mut sources: Vec<&SourceConfig> = self.site.sources.iter().collect();
        sources.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        for source in sources {
            if self.target_reached(state) {
                info!("🎉 Target reached: {} products", state.candidates.len());
                break;
            }
            self.crawl_source(source, state).await;
        }
    }

    fn target_reached(&self, state: &CrawlState) -> bool {
        state.candidates.len() >= self.config.target_count
    }

    async fn crawl_source(&self, source: &SourceConfig, state: &mut CrawlState) {
        let root_url = source.root_url(&self.site.base_url);
        info!("🎯 Source {} (weight {}) : {}", source.name, source.weight, root_url);

        let Some(root) = self
            .fetch_listing(&root_url, PageKind::Root { nav_pattern: &source.nav_pattern }, state)
            .await
        else {
            warn!("❌ Root page of {} unavailable, skipping source", source.name);
            return;
        };

        let added = self.record(&root.entries, source, ROOT_CATEGORY, state);
        info!("  ✓ Main page: {} products", added);

        let mut categories: Vec<CategoryLink> = root
            .categories
            .into_iter()
            .filter(|c| !state.visited_categories.contains(&c.url))
            .collect();
        if self.config.shuffle_categories {
            fastrand::shuffle(&mut categories);
        }
        categories.truncate(self.config.max_categories_per_source);
        info!("  📂 {} categories to visit", categories.len());

        for category in categories {
            if self.target_reached(state) {
                return;
            }
            // Another category in this batch may share the URL after canonicalisation
            if !state.visited_categories.insert(category.url.clone()) {
                continue;
            }
            state.stats.categories_visited += 1;
            self.crawl_category(source, &category, state).await;
        }

        info!("  📊 Source {} complete, {} products total", source.name, state.candidates.len());
    }

    async fn crawl_category(&self, source: &SourceConfig, category: &CategoryLink, state: &mut CrawlState) {
        debug!("📁 Category {} : {}", category.name, category.url);
        let kind = PageKind::CategoryFirst {
            max_pages: source.max_pages,
        };
        let Some(first) = self.fetch_listing(&category.url, kind, state).await else {
            return;
        };
        let added = self.record(&first.entries, source, &category.name, state);
        debug!("     Page 1: +{}", added);

        for (page_number, url) in first.continuations.iter().enumerate() {
            if self.target_reached(state) {
                return;
            }
            if let Some(page) = self.fetch_listing(url, PageKind::Continuation, state).await {
                let added = self.record(&page.entries, source, &category.name, state);
                debug!("     Page {}: +{}", page_number + 2, added);
            }
        }
    }

    /// Fetch and parse one listing page. A failure skips this page only.
    async fn fetch_listing(&self, url: &str, kind: PageKind<'_>, state: &mut CrawlState) -> Option<ListingPage> {
        match self.fetcher.fetch(url).await {
            Ok(page) => {
                state.stats.requests_ok += 1;
                Some(self.parse_listing(&page.body, url, kind))
            }
            Err(failure) => {
                state.stats.requests_failed += 1;
                self.on_fetch_failure(&failure, state).await;
                None
            }
        }
    }

    async fn on_fetch_failure(&self, failure: &FetchFailure, state: &mut CrawlState) {
        warn!("⚠️ Listing page skipped: {}", failure);
        if failure.is_rate_limited() {
            state.stats.rate_limited += 1;
            let cooldown =
                DelayRange::new(self.config.rate_limit_cooldown_min_ms, self.config.rate_limit_cooldown_max_ms).sample();
            info!("⏳ Rate limited, cooling down for {:.1}s", cooldown.as_secs_f64());
            tokio::time::sleep(cooldown).await;
        }
    }

    fn parse_listing(&self, body: &str, url: &str, kind: PageKind<'_>) -> ListingPage {
        let html = Html::parse_document(body);
        let base_url = &self.site.base_url;
        let entries = self.parser.parse_products(&html, base_url);

        match kind {
            PageKind::Root { nav_pattern } => ListingPage {
                entries,
                categories: self.parser.category_links(&html, nav_pattern, base_url),
                continuations: Vec::new(),
            },
            PageKind::CategoryFirst { max_pages } => ListingPage {
                entries,
                categories: Vec::new(),
                continuations: self.parser.pagination_urls(&html, url, base_url, max_pages),
            },
            PageKind::Continuation => ListingPage {
                entries,
                ..ListingPage::default()
            },
        }
    }

    /// Merge page entries into the candidate set; returns how many were seen
    fn record(&self, entries: &[ListingEntry], source: &SourceConfig, category: &str, state: &mut CrawlState) -> usize {
        for entry in entries {
            let candidate = CandidateProduct::observed(
                &entry.id,
                &entry.url,
                &source.name,
                source.weight,
                Some(entry.rank),
                &self.config.rank_bonus,
            )
            .with_category(category)
            .with_title(entry.title.clone().unwrap_or_default())
            .with_listing_details(entry.price.clone(), entry.rating.clone());

            match state.candidates.add(candidate) {
                AddOutcome::Inserted => state.stats.products_new += 1,
                AddOutcome::Upgraded => state.stats.products_upgraded += 1,
                AddOutcome::Kept => {}
            }
        }
        *state.stats.per_source.entry(source.name.clone()).or_default() += entries.len();
        entries.len()
    }
}
