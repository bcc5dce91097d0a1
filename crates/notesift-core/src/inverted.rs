//! Term → postings map.
//!
//! Terms live in a `BTreeMap`, which gives ordered prefix scans for
//! typeahead. Each posting list is kept sorted by note id with at most one
//! posting per note. A forward map from note to its terms makes removal
//! proportional to the size of the note rather than the vocabulary.
//!
//! Title tokens come first in the position stream; body positions start one
//! slot after the last title word, so a phrase never spans the two fields.

use crate::error::Result;
use crate::tokenizer::Tokenizer;
use crate::types::NoteId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Occurrences of one term in one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub note_id: NoteId,

    /// Occurrences in title and body together
    pub frequency: u32,

    /// Occurrences in the title
    pub title_frequency: u32,

    /// Ascending word positions
    pub positions: Vec<u32>,
}

impl Posting {
    fn new(note_id: NoteId) -> Self {
        Posting {
            note_id,
            frequency: 0,
            title_frequency: 0,
            positions: Vec::new(),
        }
    }

    /// True if the term occurs in the note's title
    pub fn in_title(&self) -> bool {
        self.title_frequency > 0
    }

    /// Check for an occurrence at an exact position
    pub fn has_position(&self, position: u32) -> bool {
        self.positions.binary_search(&position).is_ok()
    }
}

/// A note's title and body, validated and tokenized but not yet applied.
///
/// Produced without touching the index so that the expensive part of an
/// update can run outside any lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedNote {
    pub note_id: NoteId,

    /// First body position
    pub body_start: u32,

    /// One posting per distinct term
    pub postings: BTreeMap<String, Posting>,
}

impl AnalyzedNote {
    /// Validate and tokenize a note.
    ///
    /// Fails with `InvalidInput` if either field is rejected.
    pub fn analyze(tokenizer: &Tokenizer, note_id: NoteId, title: &str, body: &str) -> Result<Self> {
        tokenizer.validate_field("title", title)?;
        tokenizer.validate_field("body", body)?;

        let mut postings: BTreeMap<String, Posting> = BTreeMap::new();

        let mut title_tokens = tokenizer.tokenize(title);
        for token in title_tokens.by_ref() {
            let posting = postings
                .entry(token.term)
                .or_insert_with(|| Posting::new(note_id));
            posting.frequency += 1;
            posting.title_frequency += 1;
            posting.positions.push(token.position);
        }

        let body_start = title_tokens.position() + 1;
        for token in tokenizer.tokenize(body) {
            let posting = postings
                .entry(token.term)
                .or_insert_with(|| Posting::new(note_id));
            posting.frequency += 1;
            posting.positions.push(body_start + token.position);
        }

        Ok(AnalyzedNote {
            note_id,
            body_start,
            postings,
        })
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

/// The inverted index proper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    /// Term → postings sorted by note id
    terms: BTreeMap<String, Vec<Posting>>,

    /// Note → its distinct terms
    note_terms: HashMap<NoteId, Vec<String>>,
}

impl InvertedIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all postings of a note with freshly tokenized title and body.
    ///
    /// Input is validated before anything is touched, so a rejected note
    /// leaves the index exactly as it was.
    pub fn upsert(&mut self, tokenizer: &Tokenizer, note_id: NoteId, title: &str, body: &str) -> Result<()> {
        let analyzed = AnalyzedNote::analyze(tokenizer, note_id, title, body)?;
        self.apply(analyzed);
        Ok(())
    }

    /// Insert an already analyzed note, removing its previous postings first.
    pub fn apply(&mut self, analyzed: AnalyzedNote) {
        let note_id = analyzed.note_id;
        self.remove(note_id);

        let mut note_terms = Vec::with_capacity(analyzed.postings.len());
        for (term, posting) in analyzed.postings {
            let list = self.terms.entry(term.clone()).or_default();
            match list.binary_search_by_key(&note_id, |p| p.note_id) {
                Ok(idx) => list[idx] = posting,
                Err(idx) => list.insert(idx, posting),
            }
            note_terms.push(term);
        }

        if !note_terms.is_empty() {
            self.note_terms.insert(note_id, note_terms);
        }
    }

    /// Delete every posting of a note.
    ///
    /// Returns false if the note had no postings.
    pub fn remove(&mut self, note_id: NoteId) -> bool {
        let Some(terms) = self.note_terms.remove(&note_id) else {
            return false;
        };

        for term in terms {
            if let Some(list) = self.terms.get_mut(&term) {
                if let Ok(idx) = list.binary_search_by_key(&note_id, |p| p.note_id) {
                    list.remove(idx);
                }
                if list.is_empty() {
                    self.terms.remove(&term);
                }
            }
        }
        true
    }

    /// All postings for an exact normalized term, ordered by note id.
    pub fn lookup(&self, term: &str) -> &[Posting] {
        self.terms.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The posting of one term in one note
    pub fn posting(&self, term: &str, note_id: NoteId) -> Option<&Posting> {
        let list = self.terms.get(term)?;
        list.binary_search_by_key(&note_id, |p| p.note_id)
            .ok()
            .map(|idx| &list[idx])
    }

    /// Number of notes containing a term
    pub fn document_frequency(&self, term: &str) -> usize {
        self.terms.get(term).map_or(0, Vec::len)
    }

    /// Terms starting with `prefix`, in lexicographic order, at most `limit`.
    pub fn prefix_lookup(&self, prefix: &str, limit: usize) -> Vec<&str> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(term, _)| term.as_str())
            .take_while(|term| term.starts_with(prefix))
            .take(limit)
            .collect()
    }

    /// Distinct terms of a note
    pub fn terms_for_note(&self, note_id: NoteId) -> &[String] {
        self.note_terms
            .get(&note_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check whether a note has any posting
    pub fn contains_note(&self, note_id: NoteId) -> bool {
        self.note_terms.contains_key(&note_id)
    }

    /// Number of notes with at least one posting
    pub fn note_count(&self) -> usize {
        self.note_terms.len()
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Total number of postings
    pub fn posting_count(&self) -> usize {
        self.terms.values().map(Vec::len).sum()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.terms.clear();
        self.note_terms.clear();
    }
}
