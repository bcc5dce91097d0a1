//! Error types for the SQLite note store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors specific to note store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or initialize the database file
    #[error("failed to open notes database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the note store
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::from(rusqlite::Error::InvalidQuery);
        assert!(err.to_string().starts_with("sqlite error:"));
    }

    #[test]
    fn test_open_error_keeps_source() {
        let err = StoreError::Open {
            path: PathBuf::from("/nowhere/notes.db"),
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(err.to_string().contains("/nowhere/notes.db"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
