//! Generated review and social content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Output language of generated content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ar,
}

impl Locale {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Social network a post is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Instagram,
    Facebook,
    Twitter,
    Linkedin,
}

impl SocialPlatform {
    pub const ALL: [Self; 4] = [Self::Instagram, Self::Facebook, Self::Twitter, Self::Linkedin];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The sections of a long-form review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSections {
    pub summary: String,
    pub detailed_description: String,
    pub target_audience: String,
    pub use_cases: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub verdict: String,
}

/// Whether content came back from the generator or from the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    Generated,
    Fallback,
}

/// Review content for one product in one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContent {
    pub locale: Locale,
    pub titles: BTreeMap<Locale, String>,
    pub sections: ReviewSections,
    pub overall_score: u8,
    pub origin: ContentOrigin,
}

impl EnrichedContent {
    /// Flat description text stored next to the record.
    ///
    /// Pros, cons and scores keep their `###` markers so the text can be split
    /// back into sections by readers of the stored description.
    #[must_use]
    pub fn to_description(&self) -> String {
        let s = &self.sections;
        let mut out = s.summary.clone();

        if !s.detailed_description.is_empty() {
            out.push_str("\n\n");
            out.push_str(&s.detailed_description);
        }
        if !s.target_audience.is_empty() {
            out.push_str("\n\n👥 Target Audience: ");
            out.push_str(&s.target_audience);
        }
        if !s.use_cases.is_empty() {
            out.push_str("\n\n📋 Use Cases:\n");
            out.push_str(&s.use_cases);
        }
        if !s.pros.is_empty() {
            out.push_str("\n\n###PROS###\n");
            out.push_str(&bullets(&s.pros));
        }
        if !s.cons.is_empty() {
            out.push_str("\n\n###CONS###\n");
            out.push_str(&bullets(&s.cons));
        }
        if !s.scores.is_empty() {
            out.push_str("\n\n###SCORES###\n");
            out.push_str(&serde_json::to_string(&s.scores).unwrap_or_default());
        }
        if !s.verdict.is_empty() {
            out.push_str("\n\n🎯 Expert Verdict:\n");
            out.push_str(&s.verdict);
        }
        out
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.titles.get(&self.locale).map(String::as_str)
    }
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}
