//! HTML parsing infrastructure
//!
//! Listing and detail page parsers built on `scraper`, with ordered selector
//! fallbacks and product id / URL canonicalisation helpers.

pub mod config;
pub mod listing_parser;
pub mod product_detail_parser;
pub mod product_id;

pub use config::{DetailSelectors, ListingSelectors, ParsingConfig};
pub use listing_parser::{CategoryLink, ListingEntry, ListingParser};
pub use product_detail_parser::DetailPageExtractor;
pub use product_id::{canonical_product_url, extract_product_id, is_valid_product_id, resolve_url};

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Compile multiple selector strings into Selector objects
pub(crate) fn compile_selectors(selector_strings: &[String]) -> Result<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                errors.push(format!("'{selector_str}': {e}"));
            }
        }
    }

    if selectors.is_empty() && !selector_strings.is_empty() {
        return Err(anyhow::anyhow!(
            "No valid selectors compiled from {} attempts. Errors: {}",
            selector_strings.len(),
            errors.join(", ")
        ));
    }

    Ok(selectors)
}

/// Collapsed text of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty text across the selector strategies
pub(crate) fn first_text(html: &Html, selectors: &[Selector]) -> Option<String> {
    for (i, selector) in selectors.iter().enumerate() {
        if let Some(text) = html.select(selector).map(|el| element_text(&el)).find(|t| !t.is_empty()) {
            debug!("Selector strategy {} matched", i);
            return Some(text);
        }
    }
    None
}

/// First non-empty text inside `element` across the selector strategies
pub(crate) fn first_text_within(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| element.select(selector))
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}
