//! Enrichment generator
//!
//! Turns a scraped product into review content per locale and social posts
//! per platform. Generation never fails from the caller's point of view:
//! backend errors and unparseable answers resolve to deterministic fallback
//! content built from the product itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::prompts::{review_prompt, social_prompt};
use crate::application::review_parser::{default_scores, overall_of, parse_review};
use crate::domain::{
    ContentOrigin, EnrichedContent, EnrichmentFailure, Locale, ReviewSections, ScrapedProduct, SocialPlatform,
    TextGenerator,
};

/// Score given to every category in fallback content
pub const FALLBACK_SCORE: f64 = 80.0;

pub struct EnrichmentGenerator {
    generator: Arc<dyn TextGenerator>,
    /// One backend call at a time
    lock: Mutex<()>,
    max_title_chars: usize,
}

impl EnrichmentGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, max_title_chars: usize) -> Self {
        Self {
            generator,
            lock: Mutex::new(()),
            max_title_chars,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, EnrichmentFailure> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();
        let result = self.generator.complete(prompt).await;
        debug!("Generator call finished in {:.1}s", started.elapsed().as_secs_f64());
        result
    }

    /// Review content for one locale. Always returns complete content.
    pub async fn generate(&self, product: &ScrapedProduct, locale: Locale) -> EnrichedContent {
        let prompt = review_prompt(product, locale);

        let response = match self.call(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ Generator failed for {} ({}): {} - using fallback", product.id, locale, e);
                return self.fallback_content(product, locale);
            }
        };

        let parsed = match parse_review(&response) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("⚠️ Unusable review for {} ({}): {} - using fallback", product.id, locale, e);
                return self.fallback_content(product, locale);
            }
        };

        if parsed.scores_defaulted {
            debug!("Scores missing or invalid for {}, using defaults", product.id);
        }

        let fallback = fallback_sections(product);
        let found = parsed.found;
        let mut sections = parsed.sections;
        if !found.summary {
            sections.summary = fallback.summary;
        }
        if !found.detailed_description {
            sections.detailed_description = fallback.detailed_description;
        }
        if !found.target_audience {
            sections.target_audience = fallback.target_audience;
        }
        if !found.use_cases {
            sections.use_cases = fallback.use_cases;
        }
        if !found.pros {
            sections.pros = fallback.pros;
        }
        if !found.cons {
            sections.cons = fallback.cons;
        }
        if !found.verdict {
            sections.verdict = fallback.verdict;
        }

        info!(
            "✍️ Generated {} review for {} (score {})",
            locale, product.id, parsed.overall_score
        );
        EnrichedContent {
            locale,
            titles: self.titles(product),
            sections,
            overall_score: parsed.overall_score,
            origin: ContentOrigin::Generated,
        }
    }

    /// One post for `platform`; falls back to a fixed template.
    pub async fn generate_social(&self, product: &ScrapedProduct, platform: SocialPlatform) -> String {
        match self.call(&social_prompt(product, platform)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("⚠️ Empty {} post for {} - using template", platform, product.id);
                fallback_social(product, platform)
            }
            Err(e) => {
                warn!("⚠️ {} post for {} failed: {} - using template", platform, product.id, e);
                fallback_social(product, platform)
            }
        }
    }

    /// Deterministic content built only from product fields
    #[must_use]
    pub fn fallback_content(&self, product: &ScrapedProduct, locale: Locale) -> EnrichedContent {
        let sections = fallback_sections(product);
        EnrichedContent {
            locale,
            titles: self.titles(product),
            overall_score: overall_of(&sections.scores),
            sections,
            origin: ContentOrigin::Fallback,
        }
    }

    fn titles(&self, product: &ScrapedProduct) -> BTreeMap<Locale, String> {
        let title: String = product.title.chars().take(self.max_title_chars).collect();
        BTreeMap::from([(Locale::En, title.clone()), (Locale::Ar, title)])
    }
}

/// Flat description text stored with the record
#[must_use]
pub fn render_description(content: &EnrichedContent) -> String {
    content.to_description()
}

fn fallback_sections(product: &ScrapedProduct) -> ReviewSections {
    let category = product.category.as_deref().unwrap_or("general");
    ReviewSections {
        summary: format!("A quality product from the {category} category."),
        detailed_description: product.raw_description.clone(),
        target_audience: "General consumers".to_string(),
        use_cases: "Daily use".to_string(),
        pros: vec!["Quality construction".to_string(), "Good value".to_string()],
        cons: vec!["Limited information available".to_string()],
        scores: default_scores(FALLBACK_SCORE),
        verdict: format!("{} is a solid choice for those seeking a reliable product.", product.title),
    }
}

fn discount_line(product: &ScrapedProduct) -> Option<String> {
    product
        .price
        .discount_percent
        .filter(|d| *d > 0.0)
        .map(|d| format!("🔥 Save {d:.0}% today!"))
}

/// Template post used when the generator gives nothing usable
#[must_use]
pub fn fallback_social(product: &ScrapedProduct, platform: SocialPlatform) -> String {
    let title = &product.title;
    let price = product.price.display_current();
    let discount = discount_line(product).map(|line| format!("\n{line}")).unwrap_or_default();

    match platform {
        SocialPlatform::Instagram => format!(
            "✨ Check out this amazing product! ✨\n\n{title}\n\n💰 Best Price: {price}{discount}\n\n\
             🛒 Shop now! Link in bio!\n\n#Dubai #UAE #Shopping #Deals #OnlineShopping"
        ),
        SocialPlatform::Facebook => format!(
            "Looking for something new? 👀\n\n{title}\n\n💰 Price: {price}{discount}\n\n\
             Tell us what you think in the comments and share with a friend who needs this!\n\n\
             #UAEDeals #DubaiShopping #OnlineShopping"
        ),
        SocialPlatform::Twitter => {
            let short: String = title.chars().take(120).collect();
            format!("🛒 {short}\n💰 {price}{discount}\n\n#UAE #Deals")
        }
        SocialPlatform::Linkedin => format!(
            "Product spotlight: {title}\n\nAvailable now at {price}.{discount}\n\n\
             A practical pick for everyday work and home use.\n\n#Productivity #UAE #Ecommerce"
        ),
    }
}
