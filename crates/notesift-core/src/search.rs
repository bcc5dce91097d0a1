//! Ranked search and typeahead over a [`NoteIndex`].
//!
//! A search runs entirely in memory against one consistent index state:
//!
//! 1. parse the query and merge the structured filters;
//! 2. collect every note with a posting for any query term (OR), or with a
//!    tag containing a query term as a word;
//! 3. expand the trailing query word to at most `prefix_scan_limit` indexed
//!    terms and tag words it prefixes, and add their notes too;
//! 4. intersect with the note set of every required tag (AND);
//! 5. drop notes that miss a quoted phrase;
//! 6. score each candidate with the [`HeuristicRanker`], in parallel via
//!    Rayon once the candidate set is large;
//! 7. sort by score, then newest first, then by note id, and truncate.
//!
//! No I/O happens on this path.

use crate::config::{Config, SearchConfig};
use crate::index::{IndexState, NoteIndex};
use crate::query::{parse_query, ParsedQuery, SearchFilters};
use crate::ranker::{HeuristicRanker, RankInput};
use crate::tags::normalize_tag;
use crate::tokenizer::fold;
use crate::types::{Field, NoteId};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Where a query term matched inside a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub term: String,
    pub field: Field,

    /// Word positions within the field
    pub positions: Vec<u32>,
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub note_id: NoteId,

    /// Relevance score (higher is more relevant)
    pub score: f64,

    pub modified: DateTime<Utc>,
    pub highlights: Vec<Highlight>,
}

/// Kind of a typeahead suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Tag,
    Term,
}

/// A typeahead suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,

    /// Notes carrying the tag or containing the term
    pub note_count: usize,
}

/// Query engine over a shared index.
pub struct QueryEngine {
    index: Arc<NoteIndex>,
    ranker: HeuristicRanker,
    config: SearchConfig,
}

impl QueryEngine {
    /// Create an engine over `index` using the search and ranking settings.
    pub fn new(index: Arc<NoteIndex>, config: &Config) -> Self {
        QueryEngine {
            index,
            ranker: HeuristicRanker::new(config.ranking.clone()),
            config: config.search.clone(),
        }
    }

    /// The index this engine reads
    pub fn index(&self) -> &Arc<NoteIndex> {
        &self.index
    }

    /// The ranker in use
    pub fn ranker(&self) -> &HeuristicRanker {
        &self.ranker
    }

    /// Search for notes.
    ///
    /// Returns at most `limit` hits, best first. An empty query or one that
    /// reduces to no terms yields no hits, as does a required tag nobody
    /// carries.
    #[instrument(skip(self, filters), fields(tags = filters.tags.len()))]
    pub fn search(&self, query: &str, filters: &SearchFilters, limit: usize) -> Vec<SearchHit> {
        let mut parsed = parse_query(query, self.index.tokenizer());
        parsed.merge(filters);
        self.search_parsed(&parsed, limit)
    }

    /// Search with an already parsed query.
    pub fn search_parsed(&self, query: &ParsedQuery, limit: usize) -> Vec<SearchHit> {
        if limit == 0 || query.is_empty() {
            return Vec::new();
        }

        let start = Instant::now();
        let guard = self.index.read();
        let state: &IndexState = &guard;

        let expansions = self.expansions(state, query);
        let candidates = self.candidates(state, query, &expansions);
        let candidate_count = candidates.len();

        let input = RankInput {
            terms: &query.terms,
            tags: &query.tags,
            expansions: &expansions,
            prefix: query.prefix.as_deref(),
            title_only: query.title_only,
            matched_phrases: query.phrases.len(),
            reference_time: state.reference_time(),
        };

        let score = |note_id: NoteId| {
            let modified = state
                .note_meta(note_id)
                .map_or(DateTime::<Utc>::UNIX_EPOCH, |meta| meta.modified);
            (note_id, self.ranker.score(state, note_id, &input), modified)
        };

        let mut scored: Vec<(NoteId, f64, DateTime<Utc>)> =
            if candidate_count >= self.config.parallel_threshold {
                candidates.par_iter().map(|id| score(*id)).collect()
            } else {
                candidates.iter().map(|id| score(*id)).collect()
            };

        scored.sort_by(compare_hits);
        scored.truncate(limit);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(note_id, score, modified)| SearchHit {
                note_id,
                score,
                modified,
                highlights: highlights(state, query, &expansions, note_id),
            })
            .collect();
        drop(guard);

        let elapsed = start.elapsed();
        debug!(
            candidates = candidate_count,
            hits = hits.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Search complete"
        );
        if elapsed > Duration::from_millis(self.config.latency_budget_ms) {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.latency_budget_ms,
                candidates = candidate_count,
                "Search exceeded latency budget"
            );
        }

        hits
    }

    /// Typeahead suggestions for a prefix: matching tags first, then terms.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<Suggestion> {
        let prefix = prefix.trim();
        if limit == 0 || prefix.is_empty() {
            return Vec::new();
        }

        let scan = self.config.prefix_scan_limit.max(limit);
        let state = self.index.read();

        let mut tags: Vec<Suggestion> = normalize_tag(prefix)
            .map(|tag_prefix| {
                state
                    .tags()
                    .prefix_lookup(&tag_prefix, scan)
                    .into_iter()
                    .map(|(tag, count)| Suggestion {
                        text: tag.to_string(),
                        kind: SuggestionKind::Tag,
                        note_count: count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        tags.sort_by(compare_suggestions);

        let term_prefix = fold(prefix.trim_start_matches('#'));
        let mut terms: Vec<Suggestion> = state
            .inverted()
            .prefix_lookup(&term_prefix, scan)
            .into_iter()
            .filter(|term| !tags.iter().any(|tag| tag.text == *term))
            .map(|term| Suggestion {
                text: term.to_string(),
                kind: SuggestionKind::Term,
                note_count: state.inverted().document_frequency(term),
            })
            .collect();
        terms.sort_by(compare_suggestions);

        tags.into_iter().chain(terms).take(limit).collect()
    }

    /// Indexed terms the trailing word prefixes, other than the query terms.
    fn expansions(&self, state: &IndexState, query: &ParsedQuery) -> Vec<String> {
        let Some(prefix) = query.prefix.as_deref() else {
            return Vec::new();
        };
        state
            .inverted()
            .prefix_lookup(prefix, self.config.prefix_scan_limit)
            .into_iter()
            .filter(|term| !query.terms.iter().any(|t| t.as_str() == *term))
            .map(str::to_string)
            .collect()
    }

    fn candidates(
        &self,
        state: &IndexState,
        query: &ParsedQuery,
        expansions: &[String],
    ) -> Vec<NoteId> {
        let required = match required_notes(state, &query.tags) {
            Some(required) => required,
            None => return Vec::new(),
        };

        let mut candidates = BTreeSet::new();
        for term in query.terms.iter().chain(expansions) {
            for posting in state.inverted().lookup(term) {
                if query.title_only && !posting.in_title() {
                    continue;
                }
                candidates.insert(posting.note_id);
            }
        }

        if !query.title_only {
            let tags = state.tags();
            for term in &query.terms {
                candidates.extend(tags.notes_with_word(term));
            }
            if let Some(prefix) = query.prefix.as_deref() {
                for word in tags.word_prefix_lookup(prefix, self.config.prefix_scan_limit) {
                    candidates.extend(tags.notes_with_word(word));
                }
            }
        }

        candidates
            .into_iter()
            .filter(|note_id| {
                required
                    .as_ref()
                    .map_or(true, |notes| notes.contains(note_id))
            })
            .filter(|note_id| {
                query
                    .phrases
                    .iter()
                    .all(|phrase| phrase.matches(state, *note_id, query.title_only))
            })
            .collect()
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("index", &self.index)
            .field("ranker", &self.ranker)
            .finish()
    }
}

/// Intersection of the note sets of all required tags.
///
/// `Some(None)` means no tag filter; `None` means the intersection is empty.
fn required_notes(state: &IndexState, tags: &[String]) -> Option<Option<BTreeSet<NoteId>>> {
    if tags.is_empty() {
        return Some(None);
    }

    let mut sets = Vec::with_capacity(tags.len());
    for tag in tags {
        sets.push(state.tags().note_set(tag)?);
    }
    sets.sort_by_key(|set| set.len());

    let (smallest, rest) = sets.split_first()?;
    let required: BTreeSet<NoteId> = smallest
        .iter()
        .filter(|id| rest.iter().all(|set| set.contains(*id)))
        .copied()
        .collect();

    if required.is_empty() {
        None
    } else {
        Some(Some(required))
    }
}

fn highlights(
    state: &IndexState,
    query: &ParsedQuery,
    expansions: &[String],
    note_id: NoteId,
) -> Vec<Highlight> {
    let body_start = state
        .note_meta(note_id)
        .map_or(u32::MAX, |meta| meta.body_start);

    let mut highlights = Vec::new();
    for term in query.terms.iter().chain(expansions) {
        let Some(posting) = state.inverted().posting(term, note_id) else {
            continue;
        };
        let (title, body): (Vec<u32>, Vec<u32>) =
            posting.positions.iter().copied().partition(|&p| p < body_start);

        if !title.is_empty() {
            highlights.push(Highlight {
                term: term.clone(),
                field: Field::Title,
                positions: title,
            });
        }
        if !body.is_empty() && !query.title_only {
            highlights.push(Highlight {
                term: term.clone(),
                field: Field::Body,
                positions: body.into_iter().map(|p| p - body_start).collect(),
            });
        }
    }

    if query.title_only {
        return highlights;
    }
    let tags = state.tags();
    for term in &query.terms {
        let positions = tags.tag_positions(note_id, |word| word == term.as_str());
        if !positions.is_empty() {
            highlights.push(Highlight {
                term: term.clone(),
                field: Field::Tag,
                positions,
            });
        }
    }
    if let Some(prefix) = query.prefix.as_deref() {
        let positions = tags.tag_positions(note_id, |word| word != prefix && word.starts_with(prefix));
        if !positions.is_empty() {
            highlights.push(Highlight {
                term: prefix.to_string(),
                field: Field::Tag,
                positions,
            });
        }
    }
    highlights
}

fn compare_hits(a: &(NoteId, f64, DateTime<Utc>), b: &(NoteId, f64, DateTime<Utc>)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.2.cmp(&a.2))
        .then_with(|| a.0.cmp(&b.0))
}

fn compare_suggestions(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.note_count
        .cmp(&a.note_count)
        .then_with(|| a.text.cmp(&b.text))
}
