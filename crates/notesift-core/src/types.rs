//! Core data types for notesift.
//!
//! The note store owns notes; everything here is either the inbound shape of
//! a note or a piece of derived index state that can be thrown away and
//! rebuilt at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable note identifier assigned by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(pub i64);

impl NoteId {
    /// Create a new note ID
    pub fn new(id: i64) -> Self {
        NoteId(id)
    }

    /// Get the raw ID value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NoteId {
    fn from(id: i64) -> Self {
        NoteId(id)
    }
}

/// A note as handed over by the storage layer.
///
/// `tags` is an ordered set: order is preserved as given, duplicates are
/// dropped by [`Note::with_tags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Markdown source
    pub body: String,
    pub tags: Vec<String>,
    pub modified: DateTime<Utc>,
}

impl Note {
    /// Create a note with no tags, modified at the Unix epoch.
    pub fn new(id: NoteId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Note {
            id,
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            modified: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Set the tags, keeping first occurrence order and dropping duplicates
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    /// Set the last-modified timestamp
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }
}

/// Which part of a note a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Title,
    Body,
    /// Positions index the note's tags in sorted order
    Tag,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Title => write!(f, "title"),
            Field::Body => write!(f, "body"),
            Field::Tag => write!(f, "tag"),
        }
    }
}

/// Statistics about the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of indexed notes
    pub notes: u64,

    /// Number of distinct terms
    pub terms: u64,

    /// Total postings across all terms
    pub postings: u64,

    /// Number of distinct tags
    pub tags: u64,

    /// Modification counter at the time the stats were taken
    pub generation: u64,

    /// When the index was last changed
    pub last_updated: Option<DateTime<Utc>>,

    /// Snapshot format version
    pub version: u32,
}

impl IndexStats {
    /// Current snapshot format version
    pub const CURRENT_VERSION: u32 = 2;

    /// Create new empty stats
    pub fn new() -> Self {
        IndexStats {
            version: Self::CURRENT_VERSION,
            ..Default::default()
        }
    }
}
