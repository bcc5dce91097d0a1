//! # notesift Core Library
//!
//! This crate provides the indexing and ranked search engine behind notesift.
//! It knows nothing about where notes live: the storage layer pushes changes
//! in through the [`sync`] module and hands over every note for a rebuild.
//!
//! ## Architecture
//!
//! - **Tokenizer** (`tokenizer`): Text to normalized terms with positions
//! - **Inverted Index** (`inverted`): Term to postings, with prefix scans
//! - **Tag Index** (`tags`): Tag to note set
//! - **Index** (`index`): The shared, lock-protected index handle
//! - **Ranker** (`ranker`): Deterministic heuristic scoring
//! - **Query** (`query`, `search`): Query parsing, search and suggestions
//! - **Sync** (`sync`): Note store events and background rebuilds
//! - **Snapshot** (`snapshot`): Optional on-disk cache of the index
//! - **Worker** (`worker`): Background search for search-as-you-type
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust
//! use notesift_core::{Config, Note, NoteId, NoteIndex, QueryEngine, SearchFilters};
//! use std::sync::Arc;
//!
//! let index = Arc::new(NoteIndex::default());
//! index
//!     .upsert_note(
//!         &Note::new(NoteId(1), "Python FastAPI Quick Start", "pip install fastapi uvicorn")
//!             .with_tags(["python", "api"]),
//!     )
//!     .unwrap();
//!
//! let engine = QueryEngine::new(Arc::clone(&index), &Config::default());
//! let hits = engine.search("fastapi", &SearchFilters::new().with_tag("python"), 10);
//! assert_eq!(hits[0].note_id, NoteId(1));
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod inverted;
pub mod query;
pub mod ranker;
pub mod search;
pub mod snapshot;
pub mod sync;
pub mod tags;
pub mod tokenizer;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{NoteSiftError, Result};
pub use index::{IndexState, NoteIndex};
pub use query::{parse_query, ParsedQuery, SearchFilters};
pub use ranker::HeuristicRanker;
pub use search::{Highlight, QueryEngine, SearchHit, Suggestion, SuggestionKind};
pub use snapshot::SnapshotStore;
pub use sync::{
    CancellationToken, ChannelEventHandler, NoteEvent, NoteEventHandler, NoteSource, RebuildHandle,
    RebuildReport, SyncAdapter,
};
pub use tokenizer::{Token, Tokenizer};
pub use types::{Field, IndexStats, Note, NoteId};
pub use worker::{SearchOutcome, SearchWorker};
