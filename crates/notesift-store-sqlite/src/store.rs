//! The SQLite-backed note store.

use crate::error::{Result, StoreError};
use crate::rows::{join_tags, note_from_row, split_tags, NOTE_COLUMNS};
use crate::samples::SAMPLE_NOTES;
use chrono::Utc;
use notesift_core::{Note, NoteEventHandler, NoteId, NoteSource};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT DEFAULT '',
        created_at TEXT,
        updated_at TEXT
    );";

/// Title given to a note saved without one
const UNTITLED: &str = "Untitled";

/// Notes table in a single SQLite database.
///
/// Writes go straight to the database. If an event handler is attached, each
/// successful write is reported to it after the connection lock is released.
pub struct SqliteNoteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    events: Option<Arc<dyn NoteEventHandler>>,
}

impl SqliteNoteStore {
    /// Open (or create) the database at `path` and make sure the table exists.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Opened notes database");
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteNoteStore {
            conn: Mutex::new(conn),
            path,
            events: None,
        })
    }

    /// Report every subsequent write to `handler`.
    pub fn with_events(mut self, handler: Arc<dyn NoteEventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    /// Database file, or `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert a new note and return it with its assigned id.
    ///
    /// A blank title is stored as "Untitled".
    pub fn insert_note<S: AsRef<str>>(&self, title: &str, content: &str, tags: &[S]) -> Result<Note> {
        let title = clean_title(title);
        let tags = join_tags(tags);
        let now = Utc::now();
        let stamp = now.to_rfc3339();

        let id = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO notes (title, content, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![title, content, tags, stamp],
            )?;
            conn.last_insert_rowid()
        };

        let note = Note::new(NoteId(id), title, content)
            .with_tags(split_tags(&tags))
            .with_modified(now);
        debug!(note_id = %note.id, "Inserted note");

        if let Some(events) = &self.events {
            events.on_note_created(note.clone());
        }
        Ok(note)
    }

    /// Replace a note's title, content and tags.
    ///
    /// Returns `None` when no note has that id.
    pub fn update_note<S: AsRef<str>>(
        &self,
        id: NoteId,
        title: &str,
        content: &str,
        tags: &[S],
    ) -> Result<Option<Note>> {
        let title = clean_title(title);
        let tags = join_tags(tags);
        let now = Utc::now();

        let changed = self.conn.lock().execute(
            "UPDATE notes SET title = ?1, content = ?2, tags = ?3, updated_at = ?4 WHERE id = ?5",
            params![title, content, tags, now.to_rfc3339(), id.as_i64()],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let note = Note::new(id, title, content)
            .with_tags(split_tags(&tags))
            .with_modified(now);
        debug!(note_id = %id, "Updated note");

        if let Some(events) = &self.events {
            events.on_note_updated(note.clone());
        }
        Ok(Some(note))
    }

    /// Delete a note. Returns `false` when no note has that id.
    pub fn delete_note(&self, id: NoteId) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM notes WHERE id = ?1", params![id.as_i64()])?;
        if changed == 0 {
            return Ok(false);
        }

        debug!(note_id = %id, "Deleted note");
        if let Some(events) = &self.events {
            events.on_note_deleted(id);
        }
        Ok(true)
    }

    /// Fetch a single note.
    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let conn = self.conn.lock();
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id.as_i64()],
                note_from_row,
            )
            .optional()?;
        Ok(note)
    }

    /// Every note, most recently updated first.
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        self.select_notes("ORDER BY updated_at DESC, id ASC")
    }

    /// Number of stored notes.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(id) FROM notes", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Insert the starter notes if the table is empty.
    ///
    /// Returns how many notes were inserted.
    pub fn seed_sample_notes(&self) -> Result<usize> {
        if self.count()? > 0 {
            return Ok(0);
        }
        for sample in SAMPLE_NOTES {
            self.insert_note(sample.title, sample.content, &split_tags(sample.tags))?;
        }
        info!(notes = SAMPLE_NOTES.len(), "Seeded sample notes");
        Ok(SAMPLE_NOTES.len())
    }

    fn select_notes(&self, order: &str) -> Result<Vec<Note>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes {order}"))?;

        let notes = stmt
            .query_map([], note_from_row)?
            .filter_map(|r| r.map_err(|e| warn!("Skipping malformed note row: {e}")).ok())
            .collect();
        Ok(notes)
    }
}

impl NoteSource for SqliteNoteStore {
    fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>> {
        let notes = self.select_notes("ORDER BY id ASC")?;
        debug!(notes = notes.len(), "Read notes for rebuild");
        Ok(Box::new(notes.into_iter().map(Ok)))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

impl fmt::Debug for SqliteNoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteNoteStore")
            .field("path", &self.path)
            .field("events", &self.events.is_some())
            .finish()
    }
}

fn clean_title(title: &str) -> &str {
    match title.trim() {
        "" => UNTITLED,
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use notesift_core::{
        CancellationToken, ChannelEventHandler, Config, NoteEvent, NoteIndex, QueryEngine,
        SearchFilters, SyncAdapter,
    };
    use tempfile::TempDir;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    fn store() -> SqliteNoteStore {
        init_tracing();
        SqliteNoteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let note = store
            .insert_note("Rust Ownership", "borrow checker notes", &["rust", "memory"])
            .unwrap();

        let loaded = store.get_note(note.id).unwrap().unwrap();
        assert_eq!(loaded, note);
        assert_eq!(loaded.tags, vec!["rust", "memory"]);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_blank_title_becomes_untitled() {
        let store = store();
        let note = store.insert_note("   ", "body", &[] as &[&str]).unwrap();
        assert_eq!(note.title, "Untitled");
    }

    #[test]
    fn test_update_and_delete() {
        let store = store();
        let note = store.insert_note("Draft", "first", &["a"]).unwrap();

        let updated = store
            .update_note(note.id, "Final", "second", &["b", "b", "c"])
            .unwrap()
            .unwrap();
        assert_eq!(updated.tags, vec!["b", "c"]);
        assert!(updated.modified >= note.modified);
        assert_eq!(store.get_note(note.id).unwrap().unwrap().title, "Final");

        assert!(store.delete_note(note.id).unwrap());
        assert!(!store.delete_note(note.id).unwrap());
        assert!(store.get_note(note.id).unwrap().is_none());
        assert!(store
            .update_note(note.id, "Gone", "", &[] as &[&str])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let store = store();
        assert_eq!(store.seed_sample_notes().unwrap(), SAMPLE_NOTES.len());
        assert_eq!(store.seed_sample_notes().unwrap(), 0);
        assert_eq!(store.count().unwrap(), SAMPLE_NOTES.len());

        let git = store
            .list_notes()
            .unwrap()
            .into_iter()
            .find(|n| n.title == "Git Best Practices")
            .unwrap();
        assert_eq!(git.tags, vec!["git", "version control", "workflow", "best practices"]);
    }

    #[test]
    fn test_legacy_rows() {
        let store = store();
        store
            .conn
            .lock()
            .execute_batch(
                "INSERT INTO notes (title, content, tags, created_at, updated_at)
                 VALUES ('Naive', 'x', ' sql ,database,, sql', '2023-05-01T10:00:00.250000', NULL);
                 INSERT INTO notes (title, content, tags, created_at, updated_at)
                 VALUES ('Bare', 'y', NULL, NULL, 'garbage');",
            )
            .unwrap();

        let notes: Vec<Note> = store
            .iterate_all_notes()
            .unwrap()
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(notes.len(), 2);

        assert_eq!(notes[0].tags, vec!["sql", "database"]);
        assert_eq!(
            notes[0].modified.timestamp(),
            Utc.with_ymd_and_hms(2023, 5, 1, 10, 0, 0).unwrap().timestamp()
        );
        assert!(notes[1].tags.is_empty());
        assert_eq!(notes[1].modified, chrono::DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_writes_emit_events() {
        let (handler, rx) = ChannelEventHandler::new();
        let store = store().with_events(Arc::new(handler));

        let note = store.insert_note("A", "alpha", &["x"]).unwrap();
        store.update_note(note.id, "A2", "beta", &["y"]).unwrap();
        store.delete_note(note.id).unwrap();
        store.delete_note(note.id).unwrap();

        let events: Vec<NoteEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], NoteEvent::Created(n) if n.id == note.id));
        assert!(matches!(&events[1], NoteEvent::Updated(n) if n.title == "A2"));
        assert!(matches!(events[2], NoteEvent::Deleted(id) if id == note.id));
    }

    #[test]
    fn test_rebuild_and_follow_writes() {
        let index = Arc::new(NoteIndex::default());
        let adapter = SyncAdapter::new(Arc::clone(&index));
        let store = store().with_events(Arc::new(adapter.clone()));
        store.seed_sample_notes().unwrap();

        let fresh = Arc::new(NoteIndex::default());
        let report = SyncAdapter::new(Arc::clone(&fresh))
            .rebuild(&store, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.notes_indexed, SAMPLE_NOTES.len());
        assert_eq!(fresh.snapshot(), index.snapshot());

        let engine = QueryEngine::new(Arc::clone(&index), &Config::default());
        let hits = engine.search("docker", &SearchFilters::new().with_tag("devops"), 10);
        assert_eq!(hits.len(), 1);

        let added = store.insert_note("Kubernetes pods", "kubectl apply", &["devops"]).unwrap();
        let hits = engine.search("kubectl", &SearchFilters::new(), 10);
        assert_eq!(hits[0].note_id, added.id);
    }

    #[test]
    fn test_sample_notes_found_by_tag_words_and_prefixes() {
        let store = store();
        store.seed_sample_notes().unwrap();
        let index = Arc::new(NoteIndex::default());
        SyncAdapter::new(Arc::clone(&index))
            .rebuild(&store, &CancellationToken::new())
            .unwrap();
        let engine = QueryEngine::new(index, &Config::default());

        let title_of = |query: &str| -> Vec<String> {
            engine
                .search(query, &SearchFilters::new(), 10)
                .into_iter()
                .map(|hit| store.get_note(hit.note_id).unwrap().unwrap().title)
                .collect()
        };

        for query in ["devops", "containers", "dock", "compo", "netw"] {
            assert_eq!(title_of(query), vec!["Docker Compose Setup"], "query {query:?}");
        }
        assert_eq!(title_of("api"), vec!["Python FastAPI Quick Start"]);
        assert_eq!(title_of("control"), vec!["Git Best Practices"]);
    }

    #[test]
    fn test_reopen_file() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("notes.db");

        let id = {
            let store = SqliteNoteStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.insert_note("Persisted", "on disk", &["io"]).unwrap().id
        };

        let store = SqliteNoteStore::open(&path).unwrap();
        assert_eq!(store.get_note(id).unwrap().unwrap().title, "Persisted");
        assert_eq!(store.seed_sample_notes().unwrap(), 0);
    }
}
