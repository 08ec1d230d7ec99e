//! Product detail page extraction
//!
//! Multiple selector strategies per field with regex fallbacks for prices,
//! ratings and image URLs. Only the title is mandatory; every other field
//! degrades to an empty value.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use super::config::DetailSelectors;
use super::{compile_selectors, element_text, first_text};
use crate::domain::{ExtractionFailure, FetchedPage, PriceBlock, ProductExtractor, ReviewSummary, ScrapedProduct};

const DEFAULT_CURRENCY: &str = "AED";
const MAX_IMAGES: usize = 10;
const MAX_FEATURES: usize = 10;
const MAX_HIGHLIGHTS: usize = 3;
const DESCRIPTION_FEATURES: usize = 5;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"(\d+(?:\.\d+)?)").unwrap();
    static ref CURRENCY_CODE: Regex = Regex::new(r"\b([A-Z]{3})\b").unwrap();
    /// Thumbnail size tokens, rewritten to the 1500px rendition
    static ref THUMBNAIL_SIZES: [(Regex, &'static str); 3] = [
        (Regex::new(r"_AC_US\d+_").unwrap(), "_AC_SL1500_"),
        (Regex::new(r"_S[XY]\d+_").unwrap(), "_SL1500_"),
        (Regex::new(r"_SS\d+_").unwrap(), "_SL1500_"),
    ];
}

/// Extractor for product detail pages
pub struct DetailPageExtractor {
    title_selectors: Vec<Selector>,
    brand_selectors: Vec<Selector>,
    breadcrumb_selectors: Vec<Selector>,
    price_whole_selectors: Vec<Selector>,
    price_fraction_selectors: Vec<Selector>,
    price_offscreen_selectors: Vec<Selector>,
    original_price_selectors: Vec<Selector>,
    currency_selectors: Vec<Selector>,
    main_image_selectors: Vec<Selector>,
    thumbnail_selectors: Vec<Selector>,
    rating_selectors: Vec<Selector>,
    review_count_selectors: Vec<Selector>,
    highlight_selectors: Vec<Selector>,
    feature_selectors: Vec<Selector>,
    spec_row_selectors: Vec<Selector>,
    detail_bullet_selectors: Vec<Selector>,
    description_selectors: Vec<Selector>,
    th_selector: Selector,
    td_selector: Selector,
}

impl DetailPageExtractor {
    pub fn new() -> Result<Self> {
        Self::with_config(&DetailSelectors::default())
    }

    pub fn with_config(selectors: &DetailSelectors) -> Result<Self> {
        Ok(Self {
            title_selectors: compile_selectors(&selectors.title)?,
            brand_selectors: compile_selectors(&selectors.brand)?,
            breadcrumb_selectors: compile_selectors(&selectors.breadcrumb)?,
            price_whole_selectors: compile_selectors(&selectors.price_whole)?,
            price_fraction_selectors: compile_selectors(&selectors.price_fraction)?,
            price_offscreen_selectors: compile_selectors(&selectors.price_offscreen)?,
            original_price_selectors: compile_selectors(&selectors.original_price)?,
            currency_selectors: compile_selectors(&selectors.currency_symbol)?,
            main_image_selectors: compile_selectors(&selectors.main_image)?,
            thumbnail_selectors: compile_selectors(&selectors.thumbnails)?,
            rating_selectors: compile_selectors(&selectors.rating)?,
            review_count_selectors: compile_selectors(&selectors.review_count)?,
            highlight_selectors: compile_selectors(&selectors.review_highlights)?,
            feature_selectors: compile_selectors(&selectors.feature_bullets)?,
            spec_row_selectors: compile_selectors(&selectors.spec_rows)?,
            detail_bullet_selectors: compile_selectors(&selectors.detail_bullets)?,
            description_selectors: compile_selectors(&selectors.description)?,
            th_selector: Selector::parse("th").map_err(|e| anyhow::anyhow!("Invalid selector 'th': {}", e))?,
            td_selector: Selector::parse("td").map_err(|e| anyhow::anyhow!("Invalid selector 'td': {}", e))?,
        })
    }

    fn extract_brand(&self, html: &Html) -> Option<String> {
        first_text(html, &self.brand_selectors).map(|raw| clean_brand(&raw)).filter(|b| !b.is_empty())
    }

    fn extract_category(&self, html: &Html) -> Option<String> {
        self.breadcrumb_selectors
            .iter()
            .map(|selector| {
                html.select(selector)
                    .map(|el| element_text(&el))
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .find(|crumbs| !crumbs.is_empty())
            .and_then(|crumbs| crumbs.last().cloned())
    }

    fn extract_price(&self, html: &Html) -> PriceBlock {
        let offscreen = first_text(html, &self.price_offscreen_selectors);

        let current = first_text(html, &self.price_whole_selectors)
            .and_then(|whole| {
                let whole: String = whole.chars().filter(char::is_ascii_digit).collect();
                let fraction = first_text(html, &self.price_fraction_selectors)
                    .map(|f| f.chars().filter(char::is_ascii_digit).collect::<String>())
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(|| "00".to_string());
                format!("{whole}.{fraction}").parse::<f64>().ok()
            })
            .or_else(|| offscreen.as_deref().and_then(parse_price_text));

        let original = first_text(html, &self.original_price_selectors)
            .as_deref()
            .and_then(parse_price_text);

        let currency = first_text(html, &self.currency_selectors)
            .filter(|symbol| symbol.chars().any(char::is_alphabetic))
            .or_else(|| {
                offscreen
                    .as_deref()
                    .and_then(|text| CURRENCY_CODE.captures(text))
                    .map(|c| c[1].to_string())
            })
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        PriceBlock {
            current,
            original,
            discount_percent: None,
            currency,
        }
        .with_computed_discount()
    }

    fn extract_images(&self, html: &Html) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();

        let main = self
            .main_image_selectors
            .iter()
            .flat_map(|selector| html.select(selector))
            .find_map(|img| main_image_url(&img));
        if let Some(url) = main {
            seen.insert(url.clone());
            images.push(url);
        }

        for selector in &self.thumbnail_selectors {
            for img in html.select(selector) {
                let Some(src) = img.value().attr("src").or_else(|| img.value().attr("data-old-hires")) else {
                    continue;
                };
                let full = upscale_thumbnail(src);
                if full.starts_with("http") && !full.ends_with(".gif") && seen.insert(full.clone()) {
                    images.push(full);
                }
            }
        }

        images.truncate(MAX_IMAGES);
        images
    }

    fn extract_reviews(&self, html: &Html) -> ReviewSummary {
        let average_rating = first_text(html, &self.rating_selectors)
            .and_then(|text| NUMBER.captures(&text).and_then(|c| c[1].parse::<f32>().ok()))
            .filter(|r| (0.0..=5.0).contains(r));

        let count = first_text(html, &self.review_count_selectors)
            .map(|text| text.chars().filter(char::is_ascii_digit).collect::<String>())
            .and_then(|digits| digits.parse::<u32>().ok())
            .unwrap_or(0);

        let highlights = self
            .highlight_selectors
            .iter()
            .flat_map(|selector| html.select(selector))
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
            .take(MAX_HIGHLIGHTS)
            .collect();

        ReviewSummary {
            count,
            average_rating,
            highlights,
        }
    }

    fn extract_features(&self, html: &Html) -> Vec<String> {
        let mut seen = HashSet::new();
        self.feature_selectors
            .iter()
            .map(|selector| {
                html.select(selector)
                    .map(|el| element_text(&el))
                    .filter(|t| t.len() > 3 && seen.insert(t.clone()))
                    .take(MAX_FEATURES)
                    .collect::<Vec<_>>()
            })
            .find(|features| !features.is_empty())
            .unwrap_or_default()
    }

    fn extract_specs(&self, html: &Html) -> BTreeMap<String, String> {
        let mut specs = BTreeMap::new();

        for row in self.spec_row_selectors.iter().flat_map(|selector| html.select(selector)) {
            let key = row.select(&self.th_selector).next().map(|el| clean_spec_text(&element_text(&el)));
            let value = row.select(&self.td_selector).next().map(|el| clean_spec_text(&element_text(&el)));
            if let (Some(key), Some(value)) = (key, value) {
                if !key.is_empty() && !value.is_empty() {
                    specs.entry(key).or_insert(value);
                }
            }
        }

        for bullet in self.detail_bullet_selectors.iter().flat_map(|selector| html.select(selector)) {
            let text = clean_spec_text(&element_text(&bullet));
            if let Some((key, value)) = text.split_once(':') {
                let (key, value) = (key.trim(), value.trim());
                if !key.is_empty() && !value.is_empty() {
                    specs.entry(key.to_string()).or_insert_with(|| value.to_string());
                }
            }
        }

        specs
    }
}

impl ProductExtractor for DetailPageExtractor {
    fn extract(&self, page: &FetchedPage, product_id: &str) -> Result<ScrapedProduct, ExtractionFailure> {
        if page.body.trim().is_empty() {
            return Err(ExtractionFailure::NotAProductPage {
                url: page.url.clone(),
                reason: "empty body".to_string(),
            });
        }

        let html = Html::parse_document(&page.body);
        let title = first_text(&html, &self.title_selectors).ok_or_else(|| {
            warn!("No title found for {} at {}", product_id, page.url);
            ExtractionFailure::missing("title", &page.url)
        })?;

        let features = self.extract_features(&html);
        let raw_description = if features.is_empty() {
            first_text(&html, &self.description_selectors).unwrap_or_else(|| title.clone())
        } else {
            features.iter().take(DESCRIPTION_FEATURES).cloned().collect::<Vec<_>>().join(" ")
        };

        let product = ScrapedProduct {
            id: product_id.to_string(),
            url: page.url.clone(),
            brand: self.extract_brand(&html),
            category: self.extract_category(&html),
            price: self.extract_price(&html),
            images: self.extract_images(&html),
            review_summary: self.extract_reviews(&html),
            specs: self.extract_specs(&html),
            features,
            raw_description,
            title,
            scraped_at: Utc::now(),
        };

        debug!(
            "Extracted {}: {} images, {} features, {} specs",
            product.id,
            product.images.len(),
            product.features.len(),
            product.specs.len()
        );
        Ok(product)
    }
}

/// "Visit the Acme Store" / "Brand: Acme" -> "Acme"
fn clean_brand(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("Visit the ")
        .or_else(|| trimmed.strip_prefix("Brand:"))
        .unwrap_or(trimmed);
    without_prefix.trim().strip_suffix(" Store").unwrap_or(without_prefix.trim()).trim().to_string()
}

fn clean_spec_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200e}' | '\u{200f}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number out of a price label such as "AED 1,299.00"
fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn main_image_url(img: &ElementRef<'_>) -> Option<String> {
    let element = img.value();
    if let Some(url) = element.attr("data-old-hires").filter(|u| u.starts_with("http")) {
        return Some(url.to_string());
    }
    if let Some(dynamic) = element.attr("data-a-dynamic-image") {
        // Keys are URLs, values are [width, height]; the widest rendition wins
        match serde_json::from_str::<BTreeMap<String, Vec<u32>>>(dynamic) {
            Ok(renditions) => {
                let widest = renditions
                    .into_iter()
                    .max_by_key(|(_, size)| size.first().copied().unwrap_or(0))
                    .map(|(url, _)| url);
                if widest.is_some() {
                    return widest;
                }
            }
            Err(e) => debug!("Unreadable dynamic image map: {}", e),
        }
    }
    element.attr("src").filter(|u| u.starts_with("http")).map(ToString::to_string)
}

fn upscale_thumbnail(src: &str) -> String {
    THUMBNAIL_SIZES
        .iter()
        .fold(src.to_string(), |url, (pattern, replacement)| pattern.replace_all(&url, *replacement).into_owned())
}
