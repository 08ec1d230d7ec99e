//! Parsing configuration for HTML extraction
//!
//! Centralized CSS selector lists. Every field is an ordered list of
//! strategies; the first one that yields a non-empty value wins.

use serde::{Deserialize, Serialize};

/// Main parsing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub listing_selectors: ListingSelectors,
    pub detail_selectors: DetailSelectors,
}

/// CSS selectors for bestseller-style listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Product containers; the 1-based container position is the rank
    pub product_container: Vec<String>,
    /// Links to product detail pages inside a container
    pub product_link: Vec<String>,
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub rating: Vec<String>,
    /// Links to continuation pages of the same listing
    pub pagination: Vec<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            product_container: strings(&[
                "div[data-asin]",
                "li.zg-item-immersion",
                "div.p13n-sc-uncoverable-faceout",
                "a[href*='/dp/'], a[href*='/gp/product/']",
            ]),
            product_link: strings(&["a[href*='/dp/']", "a[href*='/gp/product/']"]),
            title: strings(&[
                "div._cDEzb_p13n-sc-css-line-clamp-3_g3dy1",
                "div.p13n-sc-truncate-desktop-type2",
                "div.p13n-sc-truncated",
                "span.zg-text-center-align",
                "a.a-link-normal span div",
            ]),
            price: strings(&["span.p13n-sc-price", "span._cDEzb_p13n-sc-price_3mJ9Z", "span.a-price span.a-offscreen"]),
            rating: strings(&["i.a-icon-star-small span.a-icon-alt", "span.a-icon-alt"]),
            pagination: strings(&["ul.a-pagination a[href]"]),
        }
    }
}

/// CSS selectors for product detail pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    pub title: Vec<String>,
    pub brand: Vec<String>,
    pub breadcrumb: Vec<String>,
    pub price_whole: Vec<String>,
    pub price_fraction: Vec<String>,
    pub price_offscreen: Vec<String>,
    pub original_price: Vec<String>,
    pub currency_symbol: Vec<String>,
    pub main_image: Vec<String>,
    pub thumbnails: Vec<String>,
    pub rating: Vec<String>,
    pub review_count: Vec<String>,
    pub review_highlights: Vec<String>,
    pub feature_bullets: Vec<String>,
    pub spec_rows: Vec<String>,
    pub detail_bullets: Vec<String>,
    pub description: Vec<String>,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            title: strings(&["#productTitle", "#title", "h1.a-size-large", "h1"]),
            brand: strings(&["#bylineInfo", "a#brand", "tr.po-brand td.a-span9 span"]),
            breadcrumb: strings(&["#wayfinding-breadcrumbs_feature_div ul li a", "#nav-subnav a.nav-a"]),
            price_whole: strings(&["#corePrice_feature_div span.a-price-whole", "span.a-price-whole"]),
            price_fraction: strings(&["#corePrice_feature_div span.a-price-fraction", "span.a-price-fraction"]),
            price_offscreen: strings(&[
                "#corePrice_feature_div span.a-offscreen",
                "#priceblock_dealprice",
                "#priceblock_ourprice",
                "span.a-price span.a-offscreen",
            ]),
            original_price: strings(&[
                "span.a-price.a-text-price span.a-offscreen",
                ".basisPrice span.a-offscreen",
                "#listPrice",
            ]),
            currency_symbol: strings(&["span.a-price-symbol"]),
            main_image: strings(&["#landingImage", "#imgBlkFront", "#main-image"]),
            thumbnails: strings(&["#altImages img", "#imageBlock img"]),
            rating: strings(&["#acrPopover span.a-icon-alt", "i.a-icon-star span.a-icon-alt", "span.a-icon-alt"]),
            review_count: strings(&["#acrCustomerReviewText"]),
            review_highlights: strings(&["[data-hook='review-title'] span", "[data-hook='review-title']"]),
            feature_bullets: strings(&["#feature-bullets ul li span.a-list-item", "#feature-bullets li"]),
            spec_rows: strings(&[
                "#productDetails_techSpec_section_1 tr",
                "#productDetails_detailBullets_sections1 tr",
                "table.prodDetTable tr",
            ]),
            detail_bullets: strings(&["#detailBullets_feature_div li span.a-list-item"]),
            description: strings(&["#productDescription", "#aplus"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
