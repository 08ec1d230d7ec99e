//! Prompt templates sent to the text generator.

use crate::domain::{Locale, ScrapedProduct, SocialPlatform};

/// Feature text is cut to this many characters in social prompts
const SOCIAL_FEATURE_CHARS: usize = 500;

fn price_text(product: &ScrapedProduct, missing: &str) -> String {
    let currency = if product.price.currency.is_empty() {
        "AED"
    } else {
        product.price.currency.as_str()
    };
    match product.price.current {
        Some(value) => format!("{value:.2} {currency}"),
        None => format!("{missing} {currency}"),
    }
}

/// Review prompt in the requested locale.
///
/// The section layout matches what [`super::review_parser::parse_review`]
/// expects.
#[must_use]
pub fn review_prompt(product: &ScrapedProduct, locale: Locale) -> String {
    let title = &product.title;
    let brand = product.brand_or_default();
    let category = product.category_or_default();
    let features = &product.raw_description;
    let price = price_text(product, "N/A");

    match locale {
        Locale::En => format!(
            "You are a professional product reviewer for the UAE market. Write a detailed, honest review \
that helps a shopper decide whether to buy this product.

Product: {title}
Brand: {brand}
Category: {category}
Features: {features}
Price: {price}

Answer in EXACTLY this format:

[Summary: 2-3 sentences on the key value and who should buy it]

###DETAILED_DESC###
[4-5 paragraphs on features, specifications, build quality and performance]

###TARGET_AUDIENCE###
[2-3 buyer profiles that benefit most]

###USE_CASES###
[3-4 practical scenarios]

###PROS###
- [Specific, measurable strength]
- [Strength]
- [Strength]
- [Strength]
- [Strength]

###CONS###
- [Fair, constructive weakness]
- [Weakness]
- [Weakness]

###SCORES###
{{\"Quality\": 90, \"Value for Money\": 88, \"Performance\": 90, \"Durability\": 87, \"Features\": 89}}

###VERDICT###
[3-4 sentences with a recommendation in the UAE market context]

Scores are out of 100 and must reflect the product. Output only the review."
        ),
        Locale::Ar => format!(
            "أنت خبير في مراجعة المنتجات للسوق الإماراتي. اكتب مراجعة احترافية وصادقة لهذا المنتج باللغة العربية.

المنتج: {title}
العلامة التجارية: {brand}
الفئة: {category}
المواصفات: {features}
السعر: {price}

استخدم هذا التنسيق بالضبط:

[ملخص من 2-3 جمل]

###DETAILED_DESC###
[وصف تفصيلي في 4-5 فقرات]

###TARGET_AUDIENCE###
[من يناسبه هذا المنتج]

###USE_CASES###
[3-4 سيناريوهات استخدام]

###PROS###
- [ميزة محددة]
- [ميزة]
- [ميزة]

###CONS###
- [عيب بنقد بناء]
- [عيب]

###SCORES###
{{\"الجودة\": 85, \"القيمة مقابل المال\": 90, \"الأداء\": 88, \"المتانة\": 87, \"الميزات\": 89}}

###VERDICT###
[فقرة ختامية بالتوصية]

اكتب المراجعة فقط."
        ),
    }
}

/// Post prompt for one social platform
#[must_use]
pub fn social_prompt(product: &ScrapedProduct, platform: SocialPlatform) -> String {
    let title = &product.title;
    let features: String = product.raw_description.chars().take(SOCIAL_FEATURE_CHARS).collect();
    let price = price_text(product, "Check Link");

    match platform {
        SocialPlatform::Instagram => format!(
            "Write an energetic Instagram caption for this product.

Product: {title}
Features: {features}
Price: {price}

Open with an emoji headline and a one-line hook, then a \"Why You'll Love It\" list of 4-5 \
emoji bullets, a call to action pointing to the link in bio, the price if it is a good deal, \
and 15-20 hashtags such as #DubaiShopping #UAEDeals #SmartShopping.
Output plain text only."
        ),
        SocialPlatform::Facebook => format!(
            "Write a Facebook post for this product that invites comments and shares.

Product: {title}
Features: {features}
Price: {price}

Start with a question, give 2-3 short paragraphs on the benefits, list 3-5 key features, \
end with a clear call to action and 5-8 hashtags. Keep it conversational."
        ),
        SocialPlatform::Twitter => format!(
            "Write a thread of 3 tweets about this product.

Product: {title}
Price: {price}

Tweet 1: hook and main benefit. Tweet 2: top 3 features. Tweet 3: price and call to action.
Each tweet stays under 280 characters and carries relevant hashtags."
        ),
        SocialPlatform::Linkedin => format!(
            "Write a professional LinkedIn post about this product.

Product: {title}
Features: {features}
Price: {price}

Cover the professional benefits, productivity gains and value for money in 2-3 paragraphs \
with a few professional hashtags."
        ),
    }
}
