//! Heuristic relevance scoring.
//!
//! `HeuristicRanker` is a fixed, transparent formula, not a trained model.
//! For a note and a query it adds up:
//!
//! - per matching term: `term_weight * (1 + ln tf) * idf`, where
//!   `idf = ln(1 + (N - df + 0.5) / (df + 0.5))` over the indexed notes;
//! - per matching term found in the title: `title_boost`;
//! - per requested tag the note carries: `tag_boost`;
//! - per query term that is a word of one of the note's tags: `tag_boost`;
//! - per prefix expansion of the trailing query word the note contains:
//!   `prefix_factor * term_weight * (1 + ln tf) * idf`, plus
//!   `prefix_factor * tag_boost` when only a tag word carries the prefix;
//! - per quoted phrase the note contains: `phrase_boost`;
//! - `recency_boost * 0.5^(age / half_life)`, with age measured against the
//!   newest note in the index rather than the wall clock.
//!
//! Given the same index state the score is bit-for-bit reproducible. The
//! weights come from [`RankingConfig`].

use crate::config::RankingConfig;
use crate::index::IndexState;
use crate::types::NoteId;
use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Query-side inputs to the ranker.
#[derive(Debug, Clone)]
pub struct RankInput<'a> {
    /// Normalized, de-duplicated query terms
    pub terms: &'a [String],

    /// Normalized requested tags
    pub tags: &'a [String],

    /// Indexed terms the trailing query word expanded to, excluding `terms`
    pub expansions: &'a [String],

    /// The trailing query word, when it may be a prefix
    pub prefix: Option<&'a str>,

    /// Count only title occurrences
    pub title_only: bool,

    /// Number of quoted phrases this note contains
    pub matched_phrases: usize,

    /// Age reference for the recency bonus
    pub reference_time: DateTime<Utc>,
}

/// Per-component contributions to a score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub terms: f64,
    pub title: f64,
    pub tags: f64,
    pub tag_text: f64,
    pub prefix: f64,
    pub phrases: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    /// Sum of all components
    pub fn total(&self) -> f64 {
        self.terms + self.title + self.tags + self.tag_text + self.prefix + self.phrases + self.recency
    }
}

/// Deterministic weighted-sum scorer.
#[derive(Debug, Clone, Default)]
pub struct HeuristicRanker {
    weights: RankingConfig,
}

impl HeuristicRanker {
    /// Create a ranker with the given weights
    pub fn new(weights: RankingConfig) -> Self {
        HeuristicRanker { weights }
    }

    /// The active weights
    pub fn weights(&self) -> &RankingConfig {
        &self.weights
    }

    /// Score a note against a query.
    pub fn score(&self, state: &IndexState, note_id: NoteId, input: &RankInput<'_>) -> f64 {
        self.explain(state, note_id, input).total()
    }

    /// Score a note and report how each component contributed.
    pub fn explain(&self, state: &IndexState, note_id: NoteId, input: &RankInput<'_>) -> ScoreBreakdown {
        let weights = &self.weights;
        let mut breakdown = ScoreBreakdown::default();

        for term in input.terms {
            let Some(posting) = state.inverted().posting(term, note_id) else {
                continue;
            };
            let tf = if input.title_only {
                posting.title_frequency
            } else {
                posting.frequency
            };
            if tf == 0 {
                continue;
            }

            breakdown.terms += weights.term_weight * (1.0 + f64::from(tf).ln()) * state.idf(term);
            if posting.in_title() {
                breakdown.title += weights.title_boost;
            }
        }

        for term in input.expansions {
            let Some(posting) = state.inverted().posting(term, note_id) else {
                continue;
            };
            let tf = if input.title_only {
                posting.title_frequency
            } else {
                posting.frequency
            };
            if tf > 0 {
                breakdown.prefix += weights.prefix_factor
                    * weights.term_weight
                    * (1.0 + f64::from(tf).ln())
                    * state.idf(term);
            }
        }

        if !input.title_only {
            let tags = state.tags();
            let tag_words = input
                .terms
                .iter()
                .filter(|term| tags.has_tag_word(note_id, |word| word == term.as_str()))
                .count();
            breakdown.tag_text = weights.tag_boost * tag_words as f64;

            if let Some(prefix) = input.prefix {
                if tags.has_tag_word(note_id, |word| word != prefix && word.starts_with(prefix)) {
                    breakdown.prefix += weights.prefix_factor * weights.tag_boost;
                }
            }
        }

        let tags_present = input
            .tags
            .iter()
            .filter(|tag| state.tags().has_tag(note_id, tag))
            .count();
        breakdown.tags = weights.tag_boost * tags_present as f64;

        breakdown.phrases = weights.phrase_boost * input.matched_phrases as f64;

        if let Some(meta) = state.note_meta(note_id) {
            breakdown.recency = self.recency(meta.modified, input.reference_time);
        }

        breakdown
    }

    /// Recency bonus for a note modified at `modified`.
    pub fn recency(&self, modified: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
        let age_days = (reference - modified).num_seconds().max(0) as f64 / SECONDS_PER_DAY;
        self.weights.recency_boost * 0.5f64.powf(age_days / self.weights.recency_half_life_days)
    }
}

/// Inverse document frequency, smoothed so it stays positive.
pub fn idf(total_notes: usize, document_frequency: usize) -> f64 {
    let n = total_notes as f64;
    let df = document_frequency as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}
