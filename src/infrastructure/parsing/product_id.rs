//! Product identifiers and canonical product URLs.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    /// Known URL shapes carrying a 10 character product id, tried in order
    static ref PRODUCT_ID_PATTERNS: Vec<Regex> = [
        r"(?i)/dp/([A-Z0-9]{10})",
        r"(?i)/gp/product/([A-Z0-9]{10})",
        r"(?i)/product/([A-Z0-9]{10})",
        r"(?i)asin=([A-Z0-9]{10})",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect();
}

/// Extract the product id from a URL; first matching pattern wins.
#[must_use]
pub fn extract_product_id(url: &str) -> Option<String> {
    PRODUCT_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Length of every product id on the site
pub const PRODUCT_ID_LEN: usize = 10;

/// Whether `id` has the shape of a product id: ten ASCII letters or digits.
/// Ids are used as directory names, so anything else is refused.
#[must_use]
pub fn is_valid_product_id(id: &str) -> bool {
    id.len() == PRODUCT_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Resolve `href` against `base_url`, falling back to plain concatenation
#[must_use]
pub fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map_or_else(|_| format!("{}{}", base_url.trim_end_matches('/'), href), |u| u.to_string())
}

/// Absolute URL with the query string and any `/ref=` tracking suffix removed
#[must_use]
pub fn canonical_product_url(href: &str, base_url: &str) -> String {
    let without_query = href.split('?').next().unwrap_or(href);
    let without_ref = without_query.split("/ref=").next().unwrap_or(without_query);
    resolve_url(without_ref, base_url)
}
