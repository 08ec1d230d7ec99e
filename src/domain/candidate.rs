//! Candidate products discovered on listing pages and their priority ranking.
//!
//! A candidate is keyed by its stable product id. When the same id shows up
//! from several sources only the best-scoring observation is kept; scores are
//! never summed and observations are never merged field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rank bonus bands.
///
/// The bonus decays linearly inside two bands: `top_band_max` down to
/// `tail_band_max` across ranks `1..=top_band_end`, then `tail_band_max`
/// down to zero across `top_band_end+1..=tail_band_end`. Ranks past the tail
/// band earn nothing. Unknown ranks earn a flat `unknown_rank_bonus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankBonusConfig {
    pub top_band_end: u32,
    pub top_band_max: f64,
    pub tail_band_end: u32,
    pub tail_band_max: f64,
    pub unknown_rank_bonus: f64,
}

impl Default for RankBonusConfig {
    fn default() -> Self {
        Self {
            top_band_end: 10,
            top_band_max: 50.0,
            tail_band_end: 50,
            tail_band_max: 5.0,
            unknown_rank_bonus: 10.0,
        }
    }
}

impl RankBonusConfig {
    /// Bonus for a 1-based rank; `None` (or 0) means the rank is unknown.
    #[must_use]
    pub fn bonus(&self, rank: Option<u32>) -> f64 {
        let Some(rank) = rank.filter(|r| *r > 0) else {
            return self.unknown_rank_bonus;
        };

        if rank <= self.top_band_end {
            let span = f64::from(self.top_band_end.max(1));
            self.top_band_max * (1.0 - f64::from(rank - 1) / span)
        } else if rank <= self.tail_band_end {
            let span = f64::from((self.tail_band_end - self.top_band_end).max(1));
            self.tail_band_max * (1.0 - f64::from(rank - self.top_band_end) / span)
        } else {
            0.0
        }
    }

    /// `source_weight + bonus(rank)`
    #[must_use]
    pub fn priority_score(&self, source_weight: f64, rank: Option<u32>) -> f64 {
        source_weight + self.bonus(rank)
    }
}

/// A discovered product reference that has not been scraped yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProduct {
    pub id: String,
    pub canonical_url: String,
    pub discovery_source: String,
    /// 1-based position in the listing it was found in
    pub rank_in_source: Option<u32>,
    pub priority_score: f64,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub listing_price: Option<String>,
    #[serde(default)]
    pub listing_rating: Option<String>,
}

impl CandidateProduct {
    /// Build a candidate and compute its priority from the source weight and rank.
    #[must_use]
    pub fn observed(
        id: impl Into<String>,
        canonical_url: impl Into<String>,
        source: impl Into<String>,
        source_weight: f64,
        rank: Option<u32>,
        bands: &RankBonusConfig,
    ) -> Self {
        Self {
            id: id.into(),
            canonical_url: canonical_url.into(),
            discovery_source: source.into(),
            rank_in_source: rank,
            priority_score: bands.priority_score(source_weight, rank),
            first_seen_at: Utc::now(),
            category: String::new(),
            title: String::new(),
            listing_price: None,
            listing_rating: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_listing_details(mut self, price: Option<String>, rating: Option<String>) -> Self {
        self.listing_price = price;
        self.listing_rating = rating;
        self
    }
}

/// Result of [`CandidateSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Upgraded,
    Kept,
}

/// Deduplicated candidate collection keyed by product id.
///
/// Each id keeps the slot of its first discovery so that equal scores come
/// out in first-discovered order.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    slots: HashMap<String, usize>,
    entries: Vec<CandidateProduct>,
}

impl CandidateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent, replace only when the new score is strictly greater.
    pub fn add(&mut self, candidate: CandidateProduct) -> AddOutcome {
        match self.slots.get(&candidate.id) {
            None => {
                self.slots.insert(candidate.id.clone(), self.entries.len());
                self.entries.push(candidate);
                AddOutcome::Inserted
            }
            Some(&slot) => {
                if candidate.priority_score > self.entries[slot].priority_score {
                    self.entries[slot] = candidate;
                    AddOutcome::Upgraded
                } else {
                    AddOutcome::Kept
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CandidateProduct> {
        self.slots.get(id).map(|&slot| &self.entries[slot])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates sorted by priority, highest first; ties keep discovery order.
    #[must_use]
    pub fn ranked(&self) -> Vec<CandidateProduct> {
        let mut ranked = self.entries.clone();
        sort_by_priority(&mut ranked);
        ranked
    }

    #[must_use]
    pub fn into_ranked(self) -> Vec<CandidateProduct> {
        let mut ranked = self.entries;
        sort_by_priority(&mut ranked);
        ranked
    }
}

/// Stable descending sort on `priority_score`.
pub fn sort_by_priority(candidates: &mut [CandidateProduct]) {
    candidates.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
}
