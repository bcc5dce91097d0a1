//! Error types for notesift core operations.
//!
//! Library-level failures are modelled with `thiserror`; the storage and CLI
//! crates wrap them in `anyhow` at their boundaries.
//!
//! Absence is never an error here: looking up an unknown term, tag or note
//! yields an empty result.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using NoteSiftError
pub type Result<T> = std::result::Result<T, NoteSiftError>;

/// Core error types for notesift operations.
#[derive(Error, Debug)]
pub enum NoteSiftError {
    // === Indexing Errors ===
    /// Text handed to the indexer was rejected; the index is unchanged
    #[error("invalid input in {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    // === Rebuild Errors ===
    /// Note iteration failed; the previous index state keeps serving queries
    #[error("index rebuild failed: {reason}")]
    RebuildFailed { reason: String },

    /// Another rebuild already owns the rebuild journal
    #[error("an index rebuild is already in progress")]
    RebuildInProgress,

    /// The rebuild was cancelled by the caller; the previous state is intact
    #[error("index rebuild cancelled")]
    Cancelled,

    // === Snapshot Errors ===
    /// The snapshot file is missing
    #[error("snapshot not found at {path}")]
    SnapshotNotFound { path: PathBuf },

    /// The snapshot file exists but is unreadable
    #[error("snapshot is corrupted: {reason}")]
    SnapshotCorrupted { reason: String },

    /// The snapshot was written by a newer format version
    #[error("snapshot version mismatch: found {found}, expected {expected}")]
    SnapshotVersionMismatch { found: u32, expected: u32 },

    /// The snapshot was built with different tokenizer settings
    #[error("snapshot is stale: {reason}")]
    SnapshotStale { reason: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    // === Internal Errors ===
    /// Internal error that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl NoteSiftError {
    /// Returns true if the index should be rebuilt from the note store
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            NoteSiftError::SnapshotNotFound { .. }
                | NoteSiftError::SnapshotCorrupted { .. }
                | NoteSiftError::SnapshotVersionMismatch { .. }
                | NoteSiftError::SnapshotStale { .. }
        )
    }

    /// Returns true for a caller-requested cancellation.
    ///
    /// Cancellation is a normal termination: the index is stale but valid.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NoteSiftError::Cancelled)
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        NoteSiftError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a rebuild failure
    pub fn rebuild_failed(reason: impl Into<String>) -> Self {
        NoteSiftError::RebuildFailed {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        NoteSiftError::Serialization(reason.into())
    }
}

impl From<bincode::Error> for NoteSiftError {
    fn from(err: bincode::Error) -> Self {
        NoteSiftError::Serialization(err.to_string())
    }
}
