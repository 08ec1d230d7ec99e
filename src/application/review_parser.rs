//! Parser for delimiter-sectioned review text returned by the generator.
//!
//! The expected shape is a free-text summary followed by `###NAME###`
//! sections. Section names are matched by prefix against a fixed vocabulary;
//! anything the parser cannot place is dropped rather than guessed at.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::ReviewSections;

const DELIMITER: &str = "###";

/// Score categories used when the response carries no usable scores
pub const SCORE_CATEGORIES: [&str; 5] = ["Quality", "Value for Money", "Performance", "Durability", "Features"];

/// Score assigned to every category when the scores section is unusable
pub const DEFAULT_SECTION_SCORE: f64 = 85.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewParseError {
    #[error("response is blank")]
    Blank,

    #[error("response contains no section delimiter")]
    NoDelimiter,

    #[error("response contains no recognised section")]
    NoSections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    DetailedDesc,
    TargetAudience,
    UseCases,
    Pros,
    Cons,
    Scores,
    Verdict,
}

impl Section {
    const VOCABULARY: [(&'static str, Self); 7] = [
        ("DETAILED_DESC", Self::DetailedDesc),
        ("TARGET_AUDIENCE", Self::TargetAudience),
        ("USE_CASES", Self::UseCases),
        ("PROS", Self::Pros),
        ("CONS", Self::Cons),
        ("SCORES", Self::Scores),
        ("VERDICT", Self::Verdict),
    ];

    /// Match a chunk against the vocabulary, returning the section and the
    /// text that follows its name.
    fn match_prefix(chunk: &str) -> Option<(Self, &str)> {
        Self::VOCABULARY
            .iter()
            .find_map(|(name, section)| chunk.strip_prefix(name).map(|rest| (*section, rest)))
    }
}

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub sections: ReviewSections,
    pub overall_score: u8,
    /// True when the scores came from the default table
    pub scores_defaulted: bool,
    /// Sections that were present in the response
    pub found: SectionPresence,
}

/// Which optional sections the response actually contained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionPresence {
    pub summary: bool,
    pub detailed_description: bool,
    pub target_audience: bool,
    pub use_cases: bool,
    pub pros: bool,
    pub cons: bool,
    pub verdict: bool,
}

#[derive(Default)]
struct Accumulator {
    sections: ReviewSections,
    found: SectionPresence,
    scores_text: Option<String>,
    matched_any: bool,
}

impl Accumulator {
    fn flush(&mut self, section: Section, pieces: &[&str]) {
        let content = pieces.join("\n").trim().to_string();
        let found = &mut self.found;
        let s = &mut self.sections;
        match section {
            Section::DetailedDesc => {
                s.detailed_description = content;
                found.detailed_description = !s.detailed_description.is_empty();
            }
            Section::TargetAudience => {
                s.target_audience = content;
                found.target_audience = !s.target_audience.is_empty();
            }
            Section::UseCases => {
                s.use_cases = content;
                found.use_cases = !s.use_cases.is_empty();
            }
            Section::Pros => {
                s.pros = bullet_items(&content);
                found.pros = !s.pros.is_empty();
            }
            Section::Cons => {
                s.cons = bullet_items(&content);
                found.cons = !s.cons.is_empty();
            }
            Section::Scores => self.scores_text = Some(content),
            Section::Verdict => {
                s.verdict = content;
                found.verdict = !s.verdict.is_empty();
            }
        }
    }
}

/// Parse a sectioned review response.
///
/// Never panics; any input either parses or yields a [`ReviewParseError`].
pub fn parse_review(response: &str) -> Result<ParsedReview, ReviewParseError> {
    if response.trim().is_empty() {
        return Err(ReviewParseError::Blank);
    }
    if !response.contains(DELIMITER) {
        return Err(ReviewParseError::NoDelimiter);
    }

    let mut parts = response.split(DELIMITER);
    let mut acc = Accumulator::default();

    if let Some(head) = parts.next() {
        let head = head.trim();
        if !head.starts_with('[') {
            acc.sections.summary = head.to_string();
            acc.found.summary = !head.is_empty();
        }
    }

    let mut current: Option<Section> = None;
    let mut pieces: Vec<&str> = Vec::new();

    for chunk in parts.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some((section, rest)) = Section::match_prefix(chunk) {
            if let Some(previous) = current.take() {
                acc.flush(previous, &pieces);
            }
            acc.matched_any = true;
            current = Some(section);
            pieces.clear();
            let rest = rest.trim();
            if !rest.is_empty() {
                pieces.push(rest);
            }
        } else if current.is_some() && !chunk.starts_with('[') {
            pieces.push(chunk);
        }
    }
    if let Some(last) = current {
        acc.flush(last, &pieces);
    }

    if !acc.matched_any {
        return Err(ReviewParseError::NoSections);
    }

    let (scores, scores_defaulted) = match acc.scores_text.as_deref().and_then(parse_scores) {
        Some(scores) => (scores, false),
        None => (default_scores(DEFAULT_SECTION_SCORE), true),
    };
    let overall_score = overall_of(&scores);
    acc.sections.scores = scores;

    Ok(ParsedReview {
        sections: acc.sections,
        overall_score,
        scores_defaulted,
        found: acc.found,
    })
}

/// Keep only bulleted lines, with the marker removed
fn bullet_items(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-').or_else(|| line.strip_prefix('•')))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse the inline object between the first `{` and the last `}`.
///
/// Returns `None` unless every value is numeric and at least one is present.
/// Values are clamped to `0..=100`.
pub fn parse_scores(text: &str) -> Option<BTreeMap<String, f64>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text[start..=end]).ok()?;
    if raw.is_empty() {
        return None;
    }

    raw.into_iter()
        .map(|(name, value)| {
            let score = value.as_f64().filter(|v| v.is_finite())?;
            Some((name, score.clamp(0.0, 100.0)))
        })
        .collect()
}

#[must_use]
pub fn default_scores(value: f64) -> BTreeMap<String, f64> {
    SCORE_CATEGORIES.iter().map(|name| ((*name).to_string(), value)).collect()
}

/// Rounded mean of the scores, 0 for an empty map
#[must_use]
pub fn overall_of(scores: &BTreeMap<String, f64>) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let mean = scores.values().sum::<f64>() / scores.len() as f64;
    mean.round().clamp(0.0, 100.0) as u8
}
