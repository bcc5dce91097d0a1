//! Term extraction for note text.
//!
//! Text is split on whitespace and punctuation. Underscores inside a word are
//! kept, so `snake_case` identifiers from code blocks survive, while leading
//! and trailing underscores (markdown emphasis) are stripped. Every word is
//! lowercased and diacritics-folded.
//!
//! Positions are 0-based word indices. Stop words and words outside the
//! length bounds are not emitted, but they still occupy a position, so the
//! gaps they leave are visible to phrase matching.

use crate::config::TokenizerConfig;
use crate::error::{NoteSiftError, Result};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A normalized term and the word position it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

/// Configured tokenizer shared by the indexer and the query parser.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_term_len: usize,
    max_term_len: usize,
    max_field_bytes: usize,
    stop_words: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl Tokenizer {
    /// Build a tokenizer from configuration.
    ///
    /// Stop words are normalized the same way as indexed text.
    pub fn new(config: &TokenizerConfig) -> Self {
        let stop_words = config
            .stop_words
            .iter()
            .map(|w| fold(w))
            .filter(|w| !w.is_empty())
            .collect();
        Tokenizer {
            min_term_len: config.min_term_len,
            max_term_len: config.max_term_len,
            max_field_bytes: config.max_field_bytes,
            stop_words,
        }
    }

    /// Tokenize text lazily.
    ///
    /// The returned iterator is `Clone`, so a sequence can be replayed; two
    /// calls on the same text always yield the same tokens.
    pub fn tokenize<'a>(&'a self, text: &'a str) -> Tokens<'a> {
        Tokens {
            tokenizer: self,
            words: text.split(is_boundary as fn(char) -> bool),
            position: 0,
        }
    }

    /// Normalize a single word into a term, if it is long enough to index.
    ///
    /// Stop words are returned too; use [`Tokenizer::is_stop_word`] to check.
    pub fn normalize(&self, word: &str) -> Option<String> {
        let term = fold(word.trim_matches('_'));
        let len = term.chars().count();
        if len < self.min_term_len || len > self.max_term_len {
            return None;
        }
        Some(term)
    }

    /// Check whether a normalized term is a stop word
    pub fn is_stop_word(&self, term: &str) -> bool {
        self.stop_words.contains(term)
    }

    /// Reject text the indexer must not accept.
    ///
    /// Control characters other than tab and line breaks mark the input as
    /// binary rather than note text.
    pub fn validate_field(&self, field: &str, text: &str) -> Result<()> {
        if text.len() > self.max_field_bytes {
            return Err(NoteSiftError::invalid_input(
                field,
                format!(
                    "{} bytes exceeds the {} byte limit",
                    text.len(),
                    self.max_field_bytes
                ),
            ));
        }
        if let Some(c) = text
            .chars()
            .find(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
        {
            return Err(NoteSiftError::invalid_input(
                field,
                format!("contains control character U+{:04X}", c as u32),
            ));
        }
        Ok(())
    }

    /// Checksum of the settings that shape the term stream.
    ///
    /// Index state built with a different fingerprint is not comparable.
    pub fn fingerprint(&self) -> u32 {
        let mut stop_words: Vec<&str> = self.stop_words.iter().map(String::as_str).collect();
        stop_words.sort_unstable();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(self.min_term_len as u64).to_le_bytes());
        hasher.update(&(self.max_term_len as u64).to_le_bytes());
        for word in stop_words {
            hasher.update(word.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }
}

/// Lazy token sequence produced by [`Tokenizer::tokenize`].
#[derive(Clone)]
pub struct Tokens<'a> {
    tokenizer: &'a Tokenizer,
    words: std::str::Split<'a, fn(char) -> bool>,
    position: u32,
}

impl<'a> Tokens<'a> {
    /// Number of word positions consumed so far
    pub fn position(&self) -> u32 {
        self.position
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let word = self.words.next()?.trim_matches('_');
            if word.is_empty() {
                continue;
            }

            let position = self.position;
            self.position += 1;

            match self.tokenizer.normalize(word) {
                Some(term) if !self.tokenizer.is_stop_word(&term) => {
                    return Some(Token { term, position })
                }
                _ => continue,
            }
        }
    }
}

impl std::fmt::Debug for Tokens<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokens")
            .field("position", &self.position)
            .finish()
    }
}

/// Lowercase and strip diacritics (`Café` → `cafe`).
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn is_boundary(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_')
}
