//! Per-product bundle directories on disk
//!
//! Two writers share the layout `<root>/<product id>/`:
//! - [`FileBundleSink`] stores enriched records (`data.json`, `review.json`)
//! - [`SocialBundleWriter`] stores social post bundles with images

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{
    ContentOrigin, EnrichedContent, InsertOutcome, PersistenceFailure, ProductRecord, ProductSink, ScrapedProduct,
    SocialPlatform,
};
use crate::infrastructure::parsing::is_valid_product_id;

const DATA_FILE: &str = "data.json";
const REVIEW_FILE: &str = "review.json";
const SOCIAL_FILE: &str = "social_content.json";
const IMAGES_DIR: &str = "images";

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Product sink that writes one directory per record
#[derive(Debug, Clone)]
pub struct FileBundleSink {
    root: PathBuf,
}

impl FileBundleSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of one record; ids that are not product ids never reach the filesystem
    fn bundle_dir(&self, id: &str) -> Result<PathBuf, PersistenceFailure> {
        if is_valid_product_id(id) {
            Ok(self.root.join(id))
        } else {
            Err(PersistenceFailure::Rejected {
                id: id.to_string(),
                reason: "not a product id".to_string(),
            })
        }
    }

    async fn write_bundle(&self, dir: &Path, record: &ProductRecord) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        write_json(&dir.join(REVIEW_FILE), &record.content).await?;
        // data.json goes last; its presence marks the bundle complete
        write_json(&dir.join(DATA_FILE), record).await
    }
}

#[async_trait]
impl ProductSink for FileBundleSink {
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, PersistenceFailure> {
        let mut existing = HashSet::new();
        for id in ids.iter().filter(|id| is_valid_product_id(id)) {
            let dir = self.root.join(id);
            if tokio::fs::try_exists(dir.join(DATA_FILE))
                .await
                .map_err(|e| PersistenceFailure::Unavailable(e.to_string()))?
            {
                existing.insert(id.clone());
            }
        }
        Ok(existing)
    }

    async fn insert_if_absent(&self, record: &ProductRecord) -> Result<InsertOutcome, PersistenceFailure> {
        let dir = self.bundle_dir(&record.id)?;
        let present = tokio::fs::try_exists(dir.join(DATA_FILE))
            .await
            .map_err(|e| PersistenceFailure::Unavailable(format!("{}: {e}", dir.display())))?;
        if present {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        self.write_bundle(&dir, record).await.map_err(|e| PersistenceFailure::Rejected {
            id: record.id.clone(),
            reason: format!("{e:#}"),
        })?;
        debug!("📦 Wrote bundle {}", dir.display());
        Ok(InsertOutcome::Inserted)
    }
}

/// Condensed review stored alongside social posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDigest {
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub overall_score: u8,
    pub verdict: String,
    pub origin: ContentOrigin,
}

impl ReviewDigest {
    pub const MAX_PROS: usize = 5;
    pub const MAX_CONS: usize = 3;

    #[must_use]
    pub fn from_content(content: &EnrichedContent) -> Self {
        let sections = &content.sections;
        Self {
            summary: sections.summary.clone(),
            pros: sections.pros.iter().take(Self::MAX_PROS).cloned().collect(),
            cons: sections.cons.iter().take(Self::MAX_CONS).cloned().collect(),
            overall_score: content.overall_score,
            verdict: sections.verdict.clone(),
            origin: content.origin,
        }
    }
}

/// An image downloaded for a social bundle
#[derive(Debug, Clone)]
pub struct BundleImage {
    pub source_url: String,
    pub bytes: Vec<u8>,
}

impl BundleImage {
    /// File extension guessed from the source URL
    #[must_use]
    pub fn extension(&self) -> &'static str {
        let lower = self.source_url.to_ascii_lowercase();
        if lower.contains(".png") {
            "png"
        } else if lower.contains(".webp") {
            "webp"
        } else {
            "jpg"
        }
    }
}

/// Everything written for one product by the social publisher
#[derive(Debug, Clone)]
pub struct SocialBundle {
    pub product: ScrapedProduct,
    pub affiliate_link: String,
    pub review: ReviewDigest,
    pub posts: BTreeMap<SocialPlatform, String>,
    pub images: Vec<BundleImage>,
}

#[derive(Serialize)]
struct SocialContentFile<'a> {
    product_id: &'a str,
    generated_at: DateTime<Utc>,
    posts: BTreeMap<&'static str, &'a str>,
}

#[derive(Serialize)]
struct SocialDataFile<'a> {
    #[serde(flatten)]
    product: &'a ScrapedProduct,
    affiliate_link: &'a str,
    image_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SocialBundleWriter {
    root: PathBuf,
}

impl SocialBundleWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write the bundle and return its directory
    pub async fn write(&self, bundle: &SocialBundle) -> Result<PathBuf> {
        ensure!(
            is_valid_product_id(&bundle.product.id),
            "Refusing to write a bundle for id {:?}",
            bundle.product.id
        );
        let dir = self.root.join(&bundle.product.id);
        let images_dir = dir.join(IMAGES_DIR);
        tokio::fs::create_dir_all(&images_dir)
            .await
            .with_context(|| format!("Failed to create {}", images_dir.display()))?;

        let mut image_files = Vec::with_capacity(bundle.images.len());
        for (index, image) in bundle.images.iter().enumerate() {
            let name = format!("image_{}.{}", index + 1, image.extension());
            tokio::fs::write(images_dir.join(&name), &image.bytes)
                .await
                .with_context(|| format!("Failed to write image {name}"))?;
            image_files.push(format!("{IMAGES_DIR}/{name}"));
        }

        for (platform, text) in &bundle.posts {
            let path = dir.join(format!("{}.txt", platform.name()));
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let social = SocialContentFile {
            product_id: &bundle.product.id,
            generated_at: Utc::now(),
            posts: bundle.posts.iter().map(|(p, text)| (p.name(), text.as_str())).collect(),
        };
        write_json(&dir.join(SOCIAL_FILE), &social).await?;
        write_json(&dir.join(REVIEW_FILE), &bundle.review).await?;

        let data = SocialDataFile {
            product: &bundle.product,
            affiliate_link: &bundle.affiliate_link,
            image_files,
        };
        write_json(&dir.join(DATA_FILE), &data).await?;

        info!("📁 Social bundle saved: {}", dir.display());
        Ok(dir)
    }
}
