//! Shared, explicitly owned note index.
//!
//! `NoteIndex` is the handle the query engine and the sync adapter share
//! (usually as `Arc<NoteIndex>`). It holds one [`IndexState`]: the inverted
//! index, the tag index, and a little metadata per note.
//!
//! ## Concurrency
//!
//! - Writers tokenize outside any lock, then apply the prepared change under
//!   a single coarse write lock. A reader therefore never sees a note half
//!   removed and half re-inserted.
//! - Readers take the read lock for the duration of a query and see one
//!   consistent state throughout.
//! - A rebuild fills a fresh `IndexState` off to the side. Writes that land
//!   while it runs go to the live state and are also journaled; on commit the
//!   journal is replayed onto the fresh state and the two are swapped under
//!   the write lock. Dropping an uncommitted [`RebuildSession`] discards the
//!   fresh state and leaves the live one untouched.
//!
//! Lock order is always state, then journal.

use crate::config::Config;
use crate::error::{NoteSiftError, Result};
use crate::inverted::{AnalyzedNote, InvertedIndex, Posting};
use crate::ranker;
use crate::tags::{normalize_tag, TagDelta, TagIndex};
use crate::tokenizer::{fold, Tokenizer};
use crate::types::{IndexStats, Note, NoteId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Per-note data kept alongside the postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    /// Last-modified timestamp from the note store
    pub modified: DateTime<Utc>,

    /// First body position; smaller positions belong to the title
    pub body_start: u32,
}

/// A prepared index change, replayable onto any `IndexState`.
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    Upsert {
        analyzed: AnalyzedNote,
        /// `None` keeps the current tags
        tags: Option<Vec<String>>,
        /// `None` keeps the current timestamp
        modified: Option<DateTime<Utc>>,
    },
    Remove(NoteId),
    SetTags(NoteId, Vec<String>),
    Attach(NoteId, String),
    Detach(NoteId, String),
}

/// Everything derived from the note store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexState {
    inverted: InvertedIndex,
    tags: TagIndex,
    notes: HashMap<NoteId, NoteMeta>,

    /// term → idf, filled lazily by readers, cleared on every mutation
    #[serde(skip)]
    idf_cache: DashMap<String, f64>,
}

impl PartialEq for IndexState {
    fn eq(&self, other: &Self) -> bool {
        self.inverted == other.inverted && self.tags == other.tags && self.notes == other.notes
    }
}

impl IndexState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// The inverted index
    pub fn inverted(&self) -> &InvertedIndex {
        &self.inverted
    }

    /// The tag index
    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    /// Metadata of an indexed note
    pub fn note_meta(&self, note_id: NoteId) -> Option<&NoteMeta> {
        self.notes.get(&note_id)
    }

    /// Number of indexed notes
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Check whether a note is indexed
    pub fn contains_note(&self, note_id: NoteId) -> bool {
        self.notes.contains_key(&note_id)
    }

    /// Inverse document frequency of a term, cached until the next mutation.
    pub fn idf(&self, term: &str) -> f64 {
        if let Some(cached) = self.idf_cache.get(term) {
            return *cached;
        }
        let value = ranker::idf(self.notes.len(), self.inverted.document_frequency(term));
        self.idf_cache.insert(term.to_string(), value);
        value
    }

    /// Timestamp of the most recently modified note.
    ///
    /// Recency is measured against this, keeping scores independent of the
    /// wall clock.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.notes
            .values()
            .map(|meta| meta.modified)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub(crate) fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Upsert {
                analyzed,
                tags,
                modified,
            } => self.upsert(analyzed, tags, modified),
            Mutation::Remove(note_id) => {
                self.remove(note_id);
            }
            Mutation::SetTags(note_id, tags) => {
                self.set_tags(note_id, &tags);
            }
            Mutation::Attach(note_id, tag) => {
                self.attach(note_id, &tag);
            }
            Mutation::Detach(note_id, tag) => {
                self.detach(note_id, &tag);
            }
        }
    }

    fn upsert(
        &mut self,
        analyzed: AnalyzedNote,
        tags: Option<Vec<String>>,
        modified: Option<DateTime<Utc>>,
    ) {
        let note_id = analyzed.note_id;
        let modified = modified
            .or_else(|| self.notes.get(&note_id).map(|meta| meta.modified))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        self.notes.insert(
            note_id,
            NoteMeta {
                modified,
                body_start: analyzed.body_start,
            },
        );
        self.inverted.apply(analyzed);
        if let Some(tags) = tags {
            self.tags.set_tags(note_id, &tags);
        }
        self.idf_cache.clear();
    }

    fn remove(&mut self, note_id: NoteId) -> bool {
        let had_meta = self.notes.remove(&note_id).is_some();
        let had_postings = self.inverted.remove(note_id);
        let had_tags = self.tags.remove_note(note_id);
        self.idf_cache.clear();
        had_meta || had_postings || had_tags
    }

    fn set_tags(&mut self, note_id: NoteId, tags: &[String]) -> TagDelta {
        self.tags.set_tags(note_id, tags)
    }

    fn attach(&mut self, note_id: NoteId, tag: &str) -> bool {
        self.tags.attach(note_id, tag)
    }

    fn detach(&mut self, note_id: NoteId, tag: &str) -> bool {
        self.tags.detach(note_id, tag)
    }
}

/// The shared index handle.
///
/// ## Example
///
/// ```rust
/// use notesift_core::{Note, NoteId, NoteIndex};
///
/// let index = NoteIndex::default();
/// index
///     .upsert_note(&Note::new(NoteId(1), "Rust", "ownership and borrowing").with_tags(["lang"]))
///     .unwrap();
///
/// assert_eq!(index.lookup("ownership").len(), 1);
/// assert!(index.notes_for_tag("lang").contains(&NoteId(1)));
/// ```
pub struct NoteIndex {
    /// The live state
    state: RwLock<IndexState>,

    /// Mutations applied while a rebuild is running
    journal: Mutex<Option<Vec<Mutation>>>,

    /// Shared with the query parser so notes and queries normalize alike
    tokenizer: Tokenizer,

    /// Incremented on every visible change
    generation: AtomicU64,

    /// When the state last changed
    last_updated: RwLock<Option<DateTime<Utc>>>,

    /// Note-count ceiling the latency budget is sized for
    max_notes: usize,
}

impl Default for NoteIndex {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl NoteIndex {
    /// Create an empty index.
    pub fn new(config: &Config) -> Self {
        Self::from_state(config, IndexState::new())
    }

    /// Create an index around an existing state (e.g. loaded from a snapshot).
    pub fn from_state(config: &Config, state: IndexState) -> Self {
        NoteIndex {
            state: RwLock::new(state),
            journal: Mutex::new(None),
            tokenizer: Tokenizer::new(&config.tokenizer),
            generation: AtomicU64::new(0),
            last_updated: RwLock::new(None),
            max_notes: config.search.max_notes,
        }
    }

    /// The tokenizer notes are indexed with
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Lock the live state for reading.
    ///
    /// Writers wait while the guard is held, so keep it for one query at most.
    pub fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read()
    }

    /// Get the current generation (modification counter).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get the number of indexed notes.
    pub fn len(&self) -> usize {
        self.state.read().note_count()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current index statistics.
    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            notes: state.note_count() as u64,
            terms: state.inverted.term_count() as u64,
            postings: state.inverted.posting_count() as u64,
            tags: state.tags.tag_count() as u64,
            generation: self.generation(),
            last_updated: *self.last_updated.read(),
            version: IndexStats::CURRENT_VERSION,
        }
    }

    /// Index a note: replaces its postings, tags and timestamp.
    ///
    /// A rejected note fails with `InvalidInput` and leaves the index as it
    /// was.
    #[instrument(skip(self, note), fields(note_id = %note.id))]
    pub fn upsert_note(&self, note: &Note) -> Result<()> {
        let mutation = self.analyze(note)?;
        self.mutate(mutation);
        Ok(())
    }

    /// Re-index only the text of a note, keeping its tags and timestamp.
    pub fn upsert(&self, note_id: NoteId, title: &str, body: &str) -> Result<()> {
        let analyzed = AnalyzedNote::analyze(&self.tokenizer, note_id, title, body)
            .map_err(|e| {
                warn!(note_id = %note_id, error = %e, "Rejected note text");
                e
            })?;
        self.mutate(Mutation::Upsert {
            analyzed,
            tags: None,
            modified: None,
        });
        Ok(())
    }

    /// Remove a note's postings, tags and metadata. Idempotent.
    #[instrument(skip(self))]
    pub fn remove(&self, note_id: NoteId) -> bool {
        let mut state = self.state.write();
        self.record(Mutation::Remove(note_id));
        let removed = state.remove(note_id);
        drop(state);

        if removed {
            self.touch();
        }
        removed
    }

    /// Replace the full tag set of a note.
    pub fn set_tags<I, S>(&self, note_id: NoteId, tags: I) -> TagDelta
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();

        let mut state = self.state.write();
        self.record(Mutation::SetTags(note_id, tags.clone()));
        let delta = state.set_tags(note_id, &tags);
        drop(state);

        if !delta.is_empty() {
            debug!(note_id = %note_id, added = delta.added.len(), removed = delta.removed.len(), "Tags updated");
            self.touch();
        }
        delta
    }

    /// Attach one tag to a note
    pub fn attach(&self, note_id: NoteId, tag: &str) -> bool {
        let mut state = self.state.write();
        self.record(Mutation::Attach(note_id, tag.to_string()));
        let changed = state.attach(note_id, tag);
        drop(state);

        if changed {
            self.touch();
        }
        changed
    }

    /// Detach one tag from a note; detaching an absent tag is a no-op
    pub fn detach(&self, note_id: NoteId, tag: &str) -> bool {
        let mut state = self.state.write();
        self.record(Mutation::Detach(note_id, tag.to_string()));
        let changed = state.detach(note_id, tag);
        drop(state);

        if changed {
            self.touch();
        }
        changed
    }

    /// Postings for a term, ordered by note id; empty if the term is absent.
    pub fn lookup(&self, term: &str) -> Vec<Posting> {
        self.state.read().inverted.lookup(&fold(term)).to_vec()
    }

    /// Indexed terms starting with `prefix`, at most `limit`.
    pub fn prefix_lookup(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.state
            .read()
            .inverted
            .prefix_lookup(&fold(prefix), limit)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Notes currently carrying a tag
    pub fn notes_for_tag(&self, tag: &str) -> BTreeSet<NoteId> {
        self.state.read().tags.notes_for_tag(tag)
    }

    /// Clone the live state
    pub fn snapshot(&self) -> IndexState {
        self.state.read().clone()
    }

    /// Clear the entire index.
    pub fn clear(&self) {
        let mut state = self.state.write();
        let note_ids: Vec<NoteId> = state.notes.keys().copied().collect();
        for note_id in note_ids {
            self.record(Mutation::Remove(note_id));
        }
        *state = IndexState::new();
        drop(state);
        self.touch();
    }

    /// Start a full rebuild.
    ///
    /// Fails with `RebuildInProgress` if another session is open.
    pub fn begin_rebuild(&self) -> Result<RebuildSession<'_>> {
        let mut journal = self.journal.lock();
        if journal.is_some() {
            return Err(NoteSiftError::RebuildInProgress);
        }
        *journal = Some(Vec::new());
        drop(journal);

        info!("Index rebuild started");
        Ok(RebuildSession {
            index: self,
            fresh: IndexState::new(),
            committed: false,
        })
    }

    /// Check whether a rebuild session is open
    pub fn is_rebuilding(&self) -> bool {
        self.journal.lock().is_some()
    }

    pub(crate) fn analyze(&self, note: &Note) -> Result<Mutation> {
        let analyzed = AnalyzedNote::analyze(&self.tokenizer, note.id, &note.title, &note.body)
            .map_err(|e| {
                warn!(note_id = %note.id, error = %e, "Rejected note");
                e
            })?;
        let tags = note
            .tags
            .iter()
            .filter_map(|t| normalize_tag(t))
            .collect();

        Ok(Mutation::Upsert {
            analyzed,
            tags: Some(tags),
            modified: Some(note.modified),
        })
    }

    fn mutate(&self, mutation: Mutation) {
        let note_id = match &mutation {
            Mutation::Upsert { analyzed, .. } => {
                debug!(note_id = %analyzed.note_id, terms = analyzed.term_count(), "Indexing note");
                Some(analyzed.note_id)
            }
            _ => None,
        };

        let mut state = self.state.write();
        self.record(mutation.clone());
        let before = state.note_count();
        state.apply(mutation);
        let after = state.note_count();
        drop(state);

        if after > self.max_notes && before <= self.max_notes {
            warn!(
                notes = after,
                ceiling = self.max_notes,
                note_id = ?note_id,
                "Index exceeds the configured note ceiling; search latency may exceed budget"
            );
        }
        self.touch();
    }

    /// Journal a mutation if a rebuild is running. Call with the state write
    /// lock held.
    fn record(&self, mutation: Mutation) {
        if let Some(journal) = self.journal.lock().as_mut() {
            journal.push(mutation);
        }
    }

    fn touch(&self) {
        *self.last_updated.write() = Some(Utc::now());
        self.generation.fetch_add(1, Ordering::Release);
    }
}

impl std::fmt::Debug for NoteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteIndex")
            .field("note_count", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

/// An open rebuild.
///
/// Notes go into a fresh state that no reader can see until
/// [`RebuildSession::commit`]. Dropping the session without committing
/// abandons the rebuild.
pub struct RebuildSession<'a> {
    index: &'a NoteIndex,
    fresh: IndexState,
    committed: bool,
}

impl RebuildSession<'_> {
    /// Add a note to the fresh state.
    pub fn index_note(&mut self, note: &Note) -> Result<()> {
        let mutation = self.index.analyze(note)?;
        self.fresh.apply(mutation);
        Ok(())
    }

    /// Notes in the fresh state so far
    pub fn note_count(&self) -> usize {
        self.fresh.note_count()
    }

    /// Replay journaled writes onto the fresh state and make it live.
    ///
    /// Returns the number of replayed mutations.
    pub fn commit(mut self) -> usize {
        let mut fresh = std::mem::take(&mut self.fresh);

        let mut state = self.index.state.write();
        let journal = self.index.journal.lock().take().unwrap_or_default();
        let replayed = journal.len();
        for mutation in journal {
            fresh.apply(mutation);
        }
        let previous = std::mem::replace(&mut *state, fresh);
        let notes = state.note_count();
        drop(state);
        drop(previous);

        self.committed = true;
        self.index.touch();

        info!(notes, replayed, "Index rebuild committed");
        replayed
    }
}

impl Drop for RebuildSession<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.index.journal.lock().take();
            info!(
                discarded = self.fresh.note_count(),
                "Index rebuild abandoned; previous state remains live"
            );
        }
    }
}
