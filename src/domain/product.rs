use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content::EnrichedContent;

/// Price information as shown on a product page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceBlock {
    pub current: Option<f64>,
    pub original: Option<f64>,
    pub discount_percent: Option<f64>,
    pub currency: String,
}

impl PriceBlock {
    /// Fills `discount_percent` from current/original when both are known.
    #[must_use]
    pub fn with_computed_discount(mut self) -> Self {
        if self.discount_percent.is_none() {
            if let (Some(current), Some(original)) = (self.current, self.original) {
                if original > current && original > 0.0 {
                    let pct = (original - current) / original * 100.0;
                    self.discount_percent = Some((pct * 10.0).round() / 10.0);
                }
            }
        }
        self
    }

    /// "129.00 AED" style label, or "N/A" when no price was found
    #[must_use]
    pub fn display_current(&self) -> String {
        match self.current {
            Some(value) => format!("{value:.2} {}", self.currency),
            None => "N/A".to_string(),
        }
    }
}

/// Aggregate customer review information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub count: u32,
    pub average_rating: Option<f32>,
    pub highlights: Vec<String>,
}

/// Fields extracted from one product detail page fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    pub id: String,
    pub url: String,
    pub title: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: PriceBlock,
    pub images: Vec<String>,
    pub review_summary: ReviewSummary,
    pub specs: BTreeMap<String, String>,
    pub features: Vec<String>,
    pub raw_description: String,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedProduct {
    #[must_use]
    pub fn brand_or_default(&self) -> &str {
        self.brand.as_deref().unwrap_or("Various")
    }

    #[must_use]
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or("General")
    }
}

/// What a sink receives for one completed candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub url: String,
    pub affiliate_link: String,
    pub product: ScrapedProduct,
    pub content: Vec<EnrichedContent>,
    pub overall_score: u8,
    pub priority_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Assemble a record; the overall score comes from the first locale's content.
    #[must_use]
    pub fn assemble(
        product: ScrapedProduct,
        content: Vec<EnrichedContent>,
        affiliate_tag: Option<&str>,
        priority_score: f64,
    ) -> Self {
        let affiliate_link = affiliate_link(&product.url, affiliate_tag);
        let overall_score = content.first().map_or(0, |c| c.overall_score);
        Self {
            id: product.id.clone(),
            url: product.url.clone(),
            affiliate_link,
            product,
            content,
            overall_score,
            priority_score,
            created_at: Utc::now(),
        }
    }
}

/// Product URL carrying the affiliate tag, if one is configured
#[must_use]
pub fn affiliate_link(url: &str, affiliate_tag: Option<&str>) -> String {
    match affiliate_tag {
        Some(tag) if !tag.is_empty() => format!("{url}?tag={tag}"),
        _ => url.to_string(),
    }
}
