//! # notesift SQLite Note Store
//!
//! The storage collaborator for notesift. Notes live in a single `notes`
//! table; this crate reads them out as core [`Note`](notesift_core::Note)s
//! for a full rebuild and, when a
//! [`NoteEventHandler`](notesift_core::NoteEventHandler) is attached, reports
//! every write so the index can follow along incrementally.
//!
//! - `store.rs`: Connection handling, schema and note CRUD
//! - `rows.rs`: Row decoding (comma-separated tags, ISO timestamps)
//! - `samples.rs`: The starter notes for an empty database

mod rows;
mod samples;
mod store;

/// Error types specific to the note store
pub mod error;

pub use error::{Result, StoreError};
pub use rows::{join_tags, parse_timestamp, split_tags};
pub use samples::{SampleNote, SAMPLE_NOTES};
pub use store::SqliteNoteStore;
