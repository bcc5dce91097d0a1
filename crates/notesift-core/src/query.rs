//! Query parsing.
//!
//! # Query Syntax
//!
//! - `word` - free-text term; a note matching any term is a candidate
//! - `"exact phrase"` - the note must contain these words in this order
//! - `tag:name` or `#name` - the note must carry the tag
//! - `title:` or `intitle:` - match terms in titles only
//! - `title:word` - shorthand for `title: word`
//!
//! The last word also matches as a prefix (`dock` finds `docker`) unless
//! the query ends in whitespace, a closing quote, or an operator.
//!
//! Terms are OR'ed, tag filters are AND'ed. Query text goes through the same
//! [`Tokenizer`] as note text, so stop words and short words drop out of the
//! term list while keeping their slot inside a phrase.

use crate::index::IndexState;
use crate::tags::normalize_tag;
use crate::tokenizer::{is_boundary, Tokenizer};
use crate::types::NoteId;

/// Structured filters passed alongside the query text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Tags every result must carry
    pub tags: Vec<String>,

    /// Match terms in titles only
    pub title_only: bool,
}

impl SearchFilters {
    /// No filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Restrict matching to titles
    pub fn title_only(mut self, title_only: bool) -> Self {
        self.title_only = title_only;
        self
    }
}

/// A quoted phrase: terms and their offsets from the first term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub terms: Vec<(String, u32)>,
}

impl Phrase {
    fn from_tokens(tokenizer: &Tokenizer, text: &str) -> Option<Self> {
        let mut tokens = tokenizer.tokenize(text).peekable();
        let first = tokens.peek()?.position;
        let terms: Vec<(String, u32)> = tokens.map(|t| (t.term, t.position - first)).collect();
        Some(Phrase { terms })
    }

    /// Check whether a note contains the phrase.
    ///
    /// All words of a match must fall inside one field.
    pub fn matches(&self, state: &IndexState, note_id: NoteId, title_only: bool) -> bool {
        let Some(((first, _), rest)) = self.terms.split_first() else {
            return false;
        };
        let Some(anchor) = state.inverted().posting(first, note_id) else {
            return false;
        };
        let rest: Vec<_> = match rest
            .iter()
            .map(|(term, offset)| state.inverted().posting(term, note_id).map(|p| (p, *offset)))
            .collect::<Option<Vec<_>>>()
        {
            Some(rest) => rest,
            None => return false,
        };

        let body_start = state
            .note_meta(note_id)
            .map_or(u32::MAX, |meta| meta.body_start);
        let span = self.terms.last().map_or(0, |(_, offset)| *offset);

        anchor.positions.iter().any(|&start| {
            let in_title = start < body_start;
            if title_only && !in_title {
                return false;
            }
            if in_title != (start + span < body_start) {
                return false;
            }
            rest.iter()
                .all(|(posting, offset)| posting.has_position(start + offset))
        })
    }
}

/// A parsed query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Distinct normalized terms, in query order
    pub terms: Vec<String>,

    /// Quoted phrases of two or more terms
    pub phrases: Vec<Phrase>,

    /// Distinct normalized required tags
    pub tags: Vec<String>,

    pub title_only: bool,

    /// Trailing word still being typed; also one of `terms`
    pub prefix: Option<String>,
}

impl ParsedQuery {
    /// True if the query has no terms to match
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Fold structured filters into the parsed query
    pub fn merge(&mut self, filters: &SearchFilters) {
        for tag in &filters.tags {
            self.push_tag(tag);
        }
        self.title_only |= filters.title_only;
    }

    fn push_term(&mut self, term: String) {
        if !self.terms.contains(&term) {
            self.terms.push(term);
        }
    }

    fn push_tag(&mut self, tag: &str) {
        if let Some(tag) = normalize_tag(tag) {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    fn push_words(&mut self, tokenizer: &Tokenizer, text: &str) {
        for token in tokenizer.tokenize(text) {
            self.push_term(token.term);
        }
    }
}

/// Parse a query string.
///
/// Never fails: anything that is not a recognized operator is treated as
/// text, and an unterminated quote runs to the end of the input.
pub fn parse_query(input: &str, tokenizer: &Tokenizer) -> ParsedQuery {
    let mut query = ParsedQuery::default();

    // Odd segments are inside quotes.
    for (i, segment) in input.split('"').enumerate() {
        if i % 2 == 1 {
            if let Some(phrase) = Phrase::from_tokens(tokenizer, segment) {
                for (term, _) in &phrase.terms {
                    query.push_term(term.clone());
                }
                if phrase.terms.len() > 1 {
                    query.phrases.push(phrase);
                }
            }
            continue;
        }

        for part in segment.split_whitespace() {
            if let Some(tag) = part.strip_prefix("tag:") {
                query.push_tag(tag);
            } else if let Some(tag) = part.strip_prefix('#').filter(|t| !t.is_empty()) {
                query.push_tag(tag);
            } else if let Some(rest) = part
                .strip_prefix("title:")
                .or_else(|| part.strip_prefix("intitle:"))
            {
                query.title_only = true;
                query.push_words(tokenizer, rest);
            } else {
                query.push_words(tokenizer, part);
            }
        }
    }

    query.prefix = trailing_word(input, tokenizer);
    query
}

/// The normalized last word of `input` if it can still grow.
fn trailing_word(input: &str, tokenizer: &Tokenizer) -> Option<String> {
    if !input.chars().next_back().is_some_and(|c| !is_boundary(c)) {
        return None;
    }
    if input.matches('"').count() % 2 == 1 {
        return None;
    }

    let part = input.split_whitespace().next_back()?;
    if part.starts_with("tag:") || part.starts_with('#') {
        return None;
    }
    let part = part
        .strip_prefix("title:")
        .or_else(|| part.strip_prefix("intitle:"))
        .unwrap_or(part);
    let word = part.split(is_boundary).next_back()?;

    tokenizer
        .normalize(word)
        .filter(|term| !tokenizer.is_stop_word(term))
}
