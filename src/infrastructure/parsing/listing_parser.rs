//! Listing page parser
//!
//! Extracts ranked product references, sub-category navigation links and
//! pagination links from bestseller-style listing pages.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

use super::config::ListingSelectors;
use super::product_id::{canonical_product_url, extract_product_id, resolve_url};
use super::{compile_selectors, element_text, first_text_within};

/// Path fragment shared by every category link of the listing tree
const CATEGORY_TREE_MARKER: &str = "/gp/bestsellers/";

/// A product reference found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: String,
    pub url: String,
    /// 1-based container position on the page
    pub rank: u32,
    pub title: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
}

/// A sub-category reachable from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub url: String,
    pub name: String,
}

/// Parser for listing pages
pub struct ListingParser {
    container_selectors: Vec<Selector>,
    link_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    price_selectors: Vec<Selector>,
    rating_selectors: Vec<Selector>,
    pagination_selectors: Vec<Selector>,
    anchor_selector: Selector,
    image_selector: Selector,
}

impl ListingParser {
    /// Create a new listing parser with default selectors
    pub fn new() -> Result<Self> {
        Self::with_config(&ListingSelectors::default())
    }

    /// Create parser with custom selector configuration
    pub fn with_config(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            container_selectors: compile_selectors(&selectors.product_container)?,
            link_selectors: compile_selectors(&selectors.product_link)?,
            title_selectors: compile_selectors(&selectors.title)?,
            price_selectors: compile_selectors(&selectors.price)?,
            rating_selectors: compile_selectors(&selectors.rating)?,
            pagination_selectors: compile_selectors(&selectors.pagination)?,
            anchor_selector: parse_static("a[href]")?,
            image_selector: parse_static("img[alt]")?,
        })
    }

    /// Product references in page order.
    ///
    /// The first container strategy that matches any element is used; a
    /// product seen twice on one page keeps its first rank.
    #[must_use]
    pub fn parse_products(&self, html: &Html, base_url: &str) -> Vec<ListingEntry> {
        for (strategy, selector) in self.container_selectors.iter().enumerate() {
            let containers: Vec<ElementRef<'_>> = html.select(selector).collect();
            if containers.is_empty() {
                continue;
            }
            debug!("Found {} product containers using strategy {}", containers.len(), strategy);

            let mut seen = HashSet::new();
            let mut entries = Vec::new();
            for (index, container) in containers.iter().enumerate() {
                let Some(href) = self.product_href(container) else {
                    continue;
                };
                let Some(id) = extract_product_id(href) else {
                    continue;
                };
                if !seen.insert(id.clone()) {
                    continue;
                }

                entries.push(ListingEntry {
                    url: canonical_product_url(href, base_url),
                    rank: u32::try_from(index + 1).unwrap_or(u32::MAX),
                    title: self.title_of(container),
                    price: first_text_within(container, &self.price_selectors),
                    rating: first_text_within(container, &self.rating_selectors),
                    id,
                });
            }
            return entries;
        }

        debug!("No product containers matched any strategy");
        Vec::new()
    }

    /// Sub-category links that belong to the source's navigation.
    ///
    /// A link qualifies when its href carries the source's navigation marker
    /// or sits in the category tree, and its text is longer than two
    /// characters. URLs are canonicalised and de-duplicated in page order.
    #[must_use]
    pub fn category_links(&self, html: &Html, nav_pattern: &str, base_url: &str) -> Vec<CategoryLink> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in html.select(&self.anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let in_navigation = (!nav_pattern.is_empty() && href.contains(nav_pattern)) || href.contains(CATEGORY_TREE_MARKER);
            if !in_navigation || extract_product_id(href).is_some() {
                continue;
            }

            let name = element_text(&anchor);
            if name.chars().count() <= 2 {
                continue;
            }

            let url = canonical_product_url(href, base_url);
            if seen.insert(url.clone()) {
                links.push(CategoryLink { url, name });
            }
        }

        links
    }

    /// Continuation page URLs for a listing, at most `max_pages - 1` of them.
    ///
    /// Uses the page's own pagination links when present, otherwise builds
    /// `pg=N` URLs for pages `2..=max_pages`.
    #[must_use]
    pub fn pagination_urls(&self, html: &Html, page_url: &str, base_url: &str, max_pages: u32) -> Vec<String> {
        let wanted = max_pages.saturating_sub(1) as usize;
        if wanted == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        seen.insert(page_url.to_string());
        let found: Vec<String> = self
            .pagination_selectors
            .iter()
            .flat_map(|selector| html.select(selector))
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.contains("pg=") || href.contains("_pg_"))
            .map(|href| resolve_url(href, base_url))
            .filter(|url| seen.insert(url.clone()))
            .take(wanted)
            .collect();

        if !found.is_empty() {
            return found;
        }

        let separator = if page_url.contains('?') { '&' } else { '?' };
        (2..=max_pages)
            .map(|page| format!("{page_url}{separator}pg={page}"))
            .take(wanted)
            .collect()
    }

    fn product_href<'a>(&self, container: &ElementRef<'a>) -> Option<&'a str> {
        let is_product_href = |href: &str| href.contains("/dp/") || href.contains("/gp/product/");

        if container.value().name() == "a" {
            if let Some(href) = container.value().attr("href").filter(|h| is_product_href(h)) {
                return Some(href);
            }
        }
        self.link_selectors
            .iter()
            .flat_map(|selector| container.select(selector))
            .filter_map(|a| a.value().attr("href"))
            .find(|href| is_product_href(href))
    }

    fn title_of(&self, container: &ElementRef<'_>) -> Option<String> {
        first_text_within(container, &self.title_selectors).or_else(|| {
            container
                .select(&self.image_selector)
                .filter_map(|img| img.value().attr("alt"))
                .map(str::trim)
                .find(|alt| !alt.is_empty())
                .map(ToString::to_string)
        })
    }
}

fn parse_static(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", selector, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.amazon.ae";

    fn listing_page() -> Html {
        Html::parse_document(
            r#"
            <html><body>
              <div id="zg-left-col">
                <a href="/gp/bestsellers/electronics/ref=zg_bs_nav_electronics_0">Electronics</a>
                <a href="/gp/bestsellers/kitchen/ref=zg_bs_nav_kitchen_0?ie=UTF8">Home &amp; Kitchen</a>
                <a href="/gp/bestsellers/kitchen/ref=zg_bs_nav_kitchen_1">Home &amp; Kitchen</a>
                <a href="/gp/bestsellers/x/ref=zg_bs_nav_x">TV</a>
                <a href="/help">Customer Service</a>
              </div>
              <div data-asin="B08N5WRWNW">
                <a href="/Kettle/dp/B08N5WRWNW/ref=zg_bs_1?psc=1">
                  <img alt="Electric Kettle 1.7L" src="k.jpg">
                </a>
                <span class="p13n-sc-price">AED 79.00</span>
                <i class="a-icon-star-small"><span class="a-icon-alt">4.5 out of 5 stars</span></i>
              </div>
              <div data-asin="">
                <span>sponsored slot without link</span>
              </div>
              <div data-asin="B07XJ8C8F5">
                <a href="/gp/product/B07XJ8C8F5"><div class="p13n-sc-truncated">Wireless Mouse</div></a>
              </div>
              <div data-asin="B08N5WRWNW">
                <a href="/Kettle/dp/B08N5WRWNW">duplicate</a>
              </div>
              <ul class="a-pagination">
                <li><a href="/gp/bestsellers/electronics/ref=zg_bs_pg_2?ie=UTF8&amp;pg=2">2</a></li>
              </ul>
            </body></html>
            "#,
        )
    }

    #[test]
    fn test_products_are_ranked_by_container_position() {
        let parser = ListingParser::new().unwrap();
        let entries = parser.parse_products(&listing_page(), BASE);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "B08N5WRWNW");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[0].url, "https://www.amazon.ae/Kettle/dp/B08N5WRWNW");
        assert_eq!(entries[0].title.as_deref(), Some("Electric Kettle 1.7L"));
        assert_eq!(entries[0].price.as_deref(), Some("AED 79.00"));
        assert_eq!(entries[0].rating.as_deref(), Some("4.5 out of 5 stars"));

        assert_eq!(entries[1].id, "B07XJ8C8F5");
        assert_eq!(entries[1].rank, 3);
        assert_eq!(entries[1].title.as_deref(), Some("Wireless Mouse"));
    }

    #[test]
    fn test_anchor_fallback_strategy() {
        let html = Html::parse_document(
            r#"<p><a href="/x/dp/B0AAAAAAAA">One</a> <a href="/y/dp/B0BBBBBBBB?th=1">Two</a></p>"#,
        );
        let parser = ListingParser::new().unwrap();
        let ids: Vec<_> = parser.parse_products(&html, BASE).into_iter().map(|e| (e.id, e.rank)).collect();
        assert_eq!(ids, vec![("B0AAAAAAAA".to_string(), 1), ("B0BBBBBBBB".to_string(), 2)]);
    }

    #[test]
    fn test_category_links_are_navigation_only_and_deduplicated() {
        let parser = ListingParser::new().unwrap();
        let links = parser.category_links(&listing_page(), "zg_bs_nav", BASE);

        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.amazon.ae/gp/bestsellers/electronics",
                "https://www.amazon.ae/gp/bestsellers/kitchen",
            ]
        );
        assert_eq!(links[1].name, "Home & Kitchen");
    }

    #[test]
    fn test_pagination_prefers_page_links() {
        let parser = ListingParser::new().unwrap();
        let urls = parser.pagination_urls(&listing_page(), "https://www.amazon.ae/gp/bestsellers/electronics", BASE, 3);
        assert_eq!(
            urls,
            vec!["https://www.amazon.ae/gp/bestsellers/electronics/ref=zg_bs_pg_2?ie=UTF8&pg=2"]
        );
    }

    #[test]
    fn test_pagination_synthesized_when_missing() {
        let parser = ListingParser::new().unwrap();
        let html = Html::parse_document("<html><body></body></html>");

        let urls = parser.pagination_urls(&html, "https://www.amazon.ae/gp/bestsellers/toys", BASE, 3);
        assert_eq!(
            urls,
            vec![
                "https://www.amazon.ae/gp/bestsellers/toys?pg=2",
                "https://www.amazon.ae/gp/bestsellers/toys?pg=3",
            ]
        );

        let with_query = parser.pagination_urls(&html, "https://www.amazon.ae/gp/new?x=1", BASE, 2);
        assert_eq!(with_query, vec!["https://www.amazon.ae/gp/new?x=1&pg=2"]);

        assert!(parser.pagination_urls(&html, "https://www.amazon.ae/gp/new", BASE, 1).is_empty());
    }
}
