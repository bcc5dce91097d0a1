//! Application state management.

use notesift_core::{
    CancellationToken, Config, NoteIndex, RebuildReport, SnapshotStore, SyncAdapter,
};
use notesift_store_sqlite::SqliteNoteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The note index
    pub index: Arc<NoteIndex>,

    /// Snapshot cache
    pub snapshots: SnapshotStore,

    /// The notes database
    pub store: SqliteNoteStore,
}

impl App {
    /// Open the notes database with an empty index.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let snapshots =
            SnapshotStore::new(config.snapshot_dir()?).with_compression(config.snapshot.compress);
        let store = SqliteNoteStore::open(config.database_path()?)?;
        let index = Arc::new(NoteIndex::new(&config));

        Ok(App {
            config,
            index,
            snapshots,
            store,
        })
    }

    /// Open the database and bring the index up to date.
    ///
    /// Uses the snapshot when it is readable and current, otherwise rebuilds
    /// from the database and refreshes the snapshot.
    pub fn load(config: Config) -> anyhow::Result<Self> {
        let mut app = Self::new(config)?;

        if app.config.snapshot.enabled {
            match app.snapshots.load(app.index.tokenizer()) {
                Ok(state) => {
                    app.index = Arc::new(NoteIndex::from_state(&app.config, state));
                    info!(notes = app.index.len(), "Application initialized from snapshot");
                    return Ok(app);
                }
                Err(e) if e.requires_rebuild() => {
                    info!(reason = %e, "Snapshot unusable, rebuilding from database");
                }
                Err(e) => return Err(e.into()),
            }
        }

        app.rebuild()?;
        Ok(app)
    }

    /// Rebuild the index from the database and, if enabled, save a snapshot.
    pub fn rebuild(&self) -> anyhow::Result<RebuildReport> {
        let adapter = SyncAdapter::new(Arc::clone(&self.index));
        let report = adapter.rebuild(&self.store, &CancellationToken::new())?;

        if self.config.snapshot.enabled {
            if let Err(e) = self.snapshots.save(&self.index) {
                warn!(error = %e, "Failed to save snapshot");
            }
        }
        Ok(report)
    }

    /// Where the notes database lives
    pub fn database_path(&self) -> Option<PathBuf> {
        self.store.path().map(|p| p.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.general.data_dir = Some(dir.path().join("cache"));
        config.general.database_path = Some(dir.path().join("notes.db"));
        config
    }

    #[test]
    fn test_load_rebuilds_then_uses_snapshot() {
        let dir = TempDir::new().unwrap();

        let app = App::load(config(&dir)).unwrap();
        assert!(app.index.is_empty());
        app.store.seed_sample_notes().unwrap();
        let report = app.rebuild().unwrap();
        assert_eq!(report.notes_indexed, 5);
        assert!(app.snapshots.exists());

        let reloaded = App::load(config(&dir)).unwrap();
        assert_eq!(reloaded.index.len(), 5);
        assert_eq!(reloaded.index.snapshot(), app.index.snapshot());
    }

    #[test]
    fn test_load_without_snapshots() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.snapshot.enabled = false;

        let app = App::new(config.clone()).unwrap();
        app.store.seed_sample_notes().unwrap();
        drop(app);

        let app = App::load(config).unwrap();
        assert_eq!(app.index.len(), 5);
        assert!(!app.snapshots.exists());
    }
}
