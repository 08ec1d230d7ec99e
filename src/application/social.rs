//! Social publisher
//!
//! Builds ready-to-post bundles for the top candidates: product data, a
//! condensed review, one post per platform and downloaded product images.
//! Progress is tracked in its own ledger so bundles are not rebuilt.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::enrichment::EnrichmentGenerator;
use crate::domain::{
    CandidateProduct, Locale, PageFetcher, ProductExtractor, ProgressLedger, ScrapedProduct, affiliate_link,
};
use crate::infrastructure::bundle_store::{BundleImage, ReviewDigest, SocialBundle, SocialBundleWriter};
use crate::infrastructure::config::SocialConfig;
use crate::infrastructure::ledger_store::{LedgerError, LedgerStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialReport {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bundles: Vec<PathBuf>,
}

pub struct SocialPublisher {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ProductExtractor>,
    enricher: Arc<EnrichmentGenerator>,
    writer: SocialBundleWriter,
    ledger_store: Option<LedgerStore>,
    config: SocialConfig,
    affiliate_tag: Option<String>,
    cancel: CancellationToken,
}

impl SocialPublisher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ProductExtractor>,
        enricher: Arc<EnrichmentGenerator>,
        writer: SocialBundleWriter,
        config: SocialConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            enricher,
            writer,
            ledger_store: None,
            config,
            affiliate_tag: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_ledger_store(mut self, store: LedgerStore) -> Self {
        self.ledger_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_affiliate_tag(mut self, tag: Option<String>) -> Self {
        self.affiliate_tag = tag;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publish bundles for up to `max_products` candidates at or above `threshold`
    pub async fn publish(
        &self,
        candidates: &[CandidateProduct],
        ledger: &mut ProgressLedger,
        max_products: usize,
        threshold: f64,
    ) -> Result<SocialReport, LedgerError> {
        let mut report = SocialReport::default();

        let mut selected: Vec<(usize, &CandidateProduct)> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if selected.len() >= max_products {
                break;
            }
            if candidate.priority_score < threshold {
                continue;
            }
            if ledger.is_processed(&candidate.id) {
                report.skipped += 1;
                continue;
            }
            selected.push((index, candidate));
        }

        info!("📣 {} products to publish ({} already done)", selected.len(), report.skipped);

        for (index, candidate) in selected {
            if self.cancel.is_cancelled() {
                warn!("🛑 Social run interrupted");
                break;
            }

            info!("📦 [{:.0}] {}", candidate.priority_score, candidate.id);
            match self.publish_one(candidate).await {
                Ok(dir) => {
                    ledger.mark_processed(&candidate.id);
                    report.published += 1;
                    report.bundles.push(dir);
                }
                Err(e) => {
                    error!("   ❌ {} failed: {:#}", candidate.id, e);
                    ledger.mark_failed(&candidate.id, format!("{e:#}"), candidate.canonical_url.clone());
                    report.failed += 1;
                }
            }
            ledger.update_index(index);

            if let Some(store) = &self.ledger_store {
                store.save(ledger).await?;
            }
        }

        info!(
            "🎉 Social run done: {} published, {} failed, {} skipped",
            report.published, report.failed, report.skipped
        );
        Ok(report)
    }

    async fn publish_one(&self, candidate: &CandidateProduct) -> anyhow::Result<PathBuf> {
        let page = self.fetcher.fetch(&candidate.canonical_url).await?;
        let product = self.extractor.extract(&page, &candidate.id)?;
        info!("   ✓ Scraped: {}", product.title.chars().take(40).collect::<String>());

        let images = self.download_images(&product).await;
        info!("   ✓ {} image(s)", images.len());

        let mut posts = BTreeMap::new();
        for platform in &self.config.platforms {
            posts.insert(*platform, self.enricher.generate_social(&product, *platform).await);
        }

        let review = ReviewDigest::from_content(&self.enricher.generate(&product, Locale::En).await);

        let bundle = SocialBundle {
            affiliate_link: affiliate_link(&product.url, self.affiliate_tag.as_deref()),
            product,
            review,
            posts,
            images,
        };
        self.writer.write(&bundle).await
    }

    /// Download up to `max_images`; failed downloads are skipped
    async fn download_images(&self, product: &ScrapedProduct) -> Vec<BundleImage> {
        let mut images = Vec::new();
        for url in product.images.iter().take(self.config.max_images) {
            match self.fetcher.fetch_bytes(url).await {
                Ok(bytes) if !bytes.is_empty() => images.push(BundleImage {
                    source_url: url.clone(),
                    bytes,
                }),
                Ok(_) => warn!("   ⚠️ Empty image: {}", url),
                Err(e) => warn!("   ⚠️ Image download failed: {}", e),
            }
        }
        images
    }
}
