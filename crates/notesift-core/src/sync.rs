//! Boundary with the note store.
//!
//! The store pushes [`NoteEvent`]s as notes are created, edited and deleted,
//! and exposes every note through [`NoteSource`] for full rebuilds. The
//! [`SyncAdapter`] turns both into index updates.
//!
//! ## Rebuild
//!
//! [`SyncAdapter::rebuild`] streams every note into a fresh index state while
//! queries keep reading the previous one. Events that arrive in the meantime
//! are applied immediately and replayed onto the fresh state before it goes
//! live. A rebuild that is cancelled or whose source fails leaves the
//! previous state in place.

use crate::error::{NoteSiftError, Result};
use crate::index::NoteIndex;
use crate::types::{Note, NoteId};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Something that can enumerate every note, e.g. the notes database.
pub trait NoteSource: Send + Sync {
    /// Iterate every note in the store.
    ///
    /// Errors, whether opening the iteration or reading a single note, abort
    /// the rebuild.
    fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

impl NoteSource for Vec<Note> {
    fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// A change in the note store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    Created(Note),
    Updated(Note),
    Deleted(NoteId),
}

impl NoteEvent {
    /// The affected note
    pub fn note_id(&self) -> NoteId {
        match self {
            NoteEvent::Created(note) | NoteEvent::Updated(note) => note.id,
            NoteEvent::Deleted(id) => *id,
        }
    }
}

/// Receiver of note store changes.
///
/// The store calls these as notes change. Implementations must not block
/// the caller for long.
pub trait NoteEventHandler: Send + Sync {
    fn on_note_created(&self, note: Note);
    fn on_note_updated(&self, note: Note);
    fn on_note_deleted(&self, note_id: NoteId);
}

/// A handler that forwards events over a channel to a consumer thread
pub struct ChannelEventHandler {
    sender: Sender<NoteEvent>,
}

impl ChannelEventHandler {
    /// Create a new channel-based handler
    pub fn new() -> (Self, Receiver<NoteEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelEventHandler { sender }, receiver)
    }
}

impl NoteEventHandler for ChannelEventHandler {
    fn on_note_created(&self, note: Note) {
        let _ = self.sender.send(NoteEvent::Created(note));
    }

    fn on_note_updated(&self, note: Note) {
        let _ = self.sender.send(NoteEvent::Updated(note));
    }

    fn on_note_deleted(&self, note_id: NoteId) {
        let _ = self.sender.send(NoteEvent::Deleted(note_id));
    }
}

/// Cooperative cancellation flag shared with a running rebuild.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the rebuild stops before its next note
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Outcome of a completed rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Notes now in the index
    pub notes_indexed: usize,

    /// Notes rejected as invalid input
    pub notes_skipped: usize,

    /// Live writes replayed onto the fresh state
    pub events_replayed: usize,

    pub elapsed: Duration,
}

/// Feeds note store changes into a shared index.
#[derive(Debug, Clone)]
pub struct SyncAdapter {
    index: Arc<NoteIndex>,
}

impl SyncAdapter {
    pub fn new(index: Arc<NoteIndex>) -> Self {
        SyncAdapter { index }
    }

    /// The index being maintained
    pub fn index(&self) -> &Arc<NoteIndex> {
        &self.index
    }

    /// Apply one event.
    ///
    /// A note rejected as invalid fails with `InvalidInput`; the index keeps
    /// whatever it had for that note.
    pub fn apply(&self, event: &NoteEvent) -> Result<()> {
        match event {
            NoteEvent::Created(note) | NoteEvent::Updated(note) => self.index.upsert_note(note),
            NoteEvent::Deleted(note_id) => {
                self.index.remove(*note_id);
                Ok(())
            }
        }
    }

    /// Apply every event already queued on `receiver` without blocking.
    ///
    /// Returns the number of events applied.
    pub fn drain(&self, receiver: &Receiver<NoteEvent>) -> usize {
        let mut applied = 0;
        for event in receiver.try_iter() {
            if self.apply_logged(&event) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply events until every sender is dropped.
    pub fn run(&self, receiver: Receiver<NoteEvent>) {
        for event in receiver.iter() {
            self.apply_logged(&event);
        }
        debug!("Note event channel closed");
    }

    /// Rebuild the index from every note in `source`.
    ///
    /// - `RebuildFailed` if the source fails; the previous state stays live.
    /// - `Cancelled` if `cancel` fires first; the previous state stays live.
    /// - `RebuildInProgress` if another rebuild is running.
    ///
    /// Notes rejected as invalid input are skipped and counted.
    #[instrument(skip(self, source, cancel), fields(source = source.name()))]
    pub fn rebuild(&self, source: &dyn NoteSource, cancel: &CancellationToken) -> Result<RebuildReport> {
        let start = Instant::now();
        let mut session = self.index.begin_rebuild()?;

        let notes = source
            .iterate_all_notes()
            .map_err(|e| failed(source, e))?;

        let mut notes_skipped = 0;
        for item in notes {
            if cancel.is_cancelled() {
                info!(indexed = session.note_count(), "Rebuild cancelled");
                return Err(NoteSiftError::Cancelled);
            }

            let note = item.map_err(|e| failed(source, e))?;
            match session.index_note(&note) {
                Ok(()) => {}
                Err(NoteSiftError::InvalidInput { field, reason }) => {
                    warn!(note_id = %note.id, field = %field, reason = %reason, "Skipping invalid note");
                    notes_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if cancel.is_cancelled() {
            info!(indexed = session.note_count(), "Rebuild cancelled");
            return Err(NoteSiftError::Cancelled);
        }

        let notes_indexed = session.note_count();
        let events_replayed = session.commit();
        let report = RebuildReport {
            notes_indexed,
            notes_skipped,
            events_replayed,
            elapsed: start.elapsed(),
        };

        info!(
            notes = report.notes_indexed,
            skipped = report.notes_skipped,
            replayed = report.events_replayed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Rebuild complete"
        );
        Ok(report)
    }

    /// Run [`SyncAdapter::rebuild`] on a background thread.
    ///
    /// Queries keep being served from the current state until the rebuild
    /// commits.
    pub fn spawn_rebuild(&self, source: Arc<dyn NoteSource>) -> Result<RebuildHandle> {
        let token = CancellationToken::new();
        let adapter = self.clone();
        let thread_token = token.clone();

        let thread = thread::Builder::new()
            .name("notesift-rebuild".to_string())
            .spawn(move || adapter.rebuild(source.as_ref(), &thread_token))?;

        Ok(RebuildHandle {
            token,
            thread: Some(thread),
        })
    }

    fn apply_logged(&self, event: &NoteEvent) -> bool {
        match self.apply(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(note_id = %event.note_id(), error = %e, "Failed to apply note event");
                false
            }
        }
    }
}

impl NoteEventHandler for SyncAdapter {
    fn on_note_created(&self, note: Note) {
        self.apply_logged(&NoteEvent::Created(note));
    }

    fn on_note_updated(&self, note: Note) {
        self.apply_logged(&NoteEvent::Updated(note));
    }

    fn on_note_deleted(&self, note_id: NoteId) {
        self.apply_logged(&NoteEvent::Deleted(note_id));
    }
}

fn failed(source: &dyn NoteSource, err: anyhow::Error) -> NoteSiftError {
    warn!(source = source.name(), error = %err, "Note source failed; keeping previous index");
    NoteSiftError::rebuild_failed(format!("{err:#}"))
}

/// Handle for a background rebuild.
///
/// Dropping the handle cancels the rebuild and waits for the thread to stop.
pub struct RebuildHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<Result<RebuildReport>>>,
}

impl RebuildHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A token that cancels this rebuild
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Check whether the rebuild thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the rebuild to end and return its outcome.
    pub fn wait(mut self) -> Result<RebuildReport> {
        self.join()
    }

    fn join(&mut self) -> Result<RebuildReport> {
        let Some(thread) = self.thread.take() else {
            return Err(NoteSiftError::Internal("rebuild already joined".to_string()));
        };
        thread
            .join()
            .map_err(|_| NoteSiftError::Internal("rebuild thread panicked".to_string()))?
    }
}

impl Drop for RebuildHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.token.cancel();
            let _ = self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::{TimeZone, Utc};

    fn note(id: i64, title: &str, body: &str, tags: &[&str]) -> Note {
        Note::new(NoteId(id), title, body)
            .with_tags(tags.iter().copied())
            .with_modified(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn adapter() -> SyncAdapter {
        SyncAdapter::new(Arc::new(NoteIndex::new(&Config::default())))
    }

    /// Yields its notes, then fails.
    struct FailingSource(Vec<Note>);

    impl NoteSource for FailingSource {
        fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>> {
            let notes = self.0.iter().cloned().map(Ok);
            Ok(Box::new(notes.chain(std::iter::once(Err(anyhow::anyhow!("disk I/O error"))))))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Cancels the given token after yielding `after` notes.
    struct CancellingSource {
        notes: Vec<Note>,
        after: usize,
        token: CancellationToken,
    }

    impl NoteSource for CancellingSource {
        fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>> {
            Ok(Box::new(self.notes.iter().enumerate().map(|(i, n)| {
                if i + 1 == self.after {
                    self.token.cancel();
                }
                Ok(n.clone())
            })))
        }

        fn name(&self) -> &str {
            "cancelling"
        }
    }

    #[test]
    fn test_events_maintain_index() {
        let adapter = adapter();
        adapter
            .apply(&NoteEvent::Created(note(1, "Git", "rebase tips", &["git"])))
            .unwrap();
        adapter
            .apply(&NoteEvent::Updated(note(1, "Git", "merge tips", &["vcs"])))
            .unwrap();

        let index = adapter.index();
        assert!(index.lookup("rebase").is_empty());
        assert_eq!(index.lookup("merge").len(), 1);
        assert!(index.notes_for_tag("git").is_empty());

        adapter.apply(&NoteEvent::Deleted(NoteId(1))).unwrap();
        assert!(index.is_empty());
        assert!(index.notes_for_tag("vcs").is_empty());
    }

    #[test]
    fn test_invalid_event_is_rejected() {
        let adapter = adapter();
        let err = adapter
            .apply(&NoteEvent::Created(note(1, "bad\u{1b}title", "", &[])))
            .unwrap_err();
        assert!(matches!(err, NoteSiftError::InvalidInput { .. }));
        assert!(adapter.index().is_empty());
    }

    #[test]
    fn test_channel_handler_and_drain() {
        let adapter = adapter();
        let (handler, receiver) = ChannelEventHandler::new();

        handler.on_note_created(note(1, "Docker", "compose", &[]));
        handler.on_note_created(note(2, "Bad", "\u{0}", &[]));
        handler.on_note_deleted(NoteId(3));

        assert_eq!(adapter.drain(&receiver), 2);
        assert_eq!(adapter.index().len(), 1);
        assert_eq!(adapter.drain(&receiver), 0);
    }

    #[test]
    fn test_run_until_disconnected() {
        let adapter = adapter();
        let (handler, receiver) = ChannelEventHandler::new();

        let consumer = {
            let adapter = adapter.clone();
            thread::spawn(move || adapter.run(receiver))
        };
        handler.on_note_created(note(1, "SQL", "indexes", &[]));
        handler.on_note_updated(note(1, "SQL", "joins", &[]));
        drop(handler);
        consumer.join().unwrap();

        assert_eq!(adapter.index().lookup("joins").len(), 1);
    }

    #[test]
    fn test_adapter_as_handler() {
        let adapter = adapter();
        let handler: &dyn NoteEventHandler = &adapter;
        handler.on_note_created(note(1, "React", "hooks", &["frontend"]));
        handler.on_note_deleted(NoteId(1));
        assert!(adapter.index().is_empty());
    }

    #[test]
    fn test_rebuild_replaces_state() {
        let adapter = adapter();
        adapter
            .apply(&NoteEvent::Created(note(9, "Stale", "gone", &[])))
            .unwrap();

        let source = vec![note(1, "Python", "fastapi", &["python"]), note(2, "React", "hooks", &[])];
        let report = adapter.rebuild(&source, &CancellationToken::new()).unwrap();

        assert_eq!(report.notes_indexed, 2);
        assert_eq!(report.notes_skipped, 0);
        assert!(adapter.index().lookup("gone").is_empty());
        assert_eq!(adapter.index().lookup("fastapi").len(), 1);
    }

    #[test]
    fn test_rebuild_skips_invalid_notes() {
        let adapter = adapter();
        let source = vec![note(1, "Fine", "text", &[]), note(2, "Broken", "\u{0}", &[])];
        let report = adapter.rebuild(&source, &CancellationToken::new()).unwrap();

        assert_eq!(report.notes_indexed, 1);
        assert_eq!(report.notes_skipped, 1);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_state() {
        let adapter = adapter();
        adapter
            .apply(&NoteEvent::Created(note(1, "Live", "still here", &[])))
            .unwrap();
        let before = adapter.index().snapshot();

        let source = FailingSource(vec![note(2, "New", "partial", &[])]);
        let err = adapter.rebuild(&source, &CancellationToken::new()).unwrap_err();

        match err {
            NoteSiftError::RebuildFailed { reason } => assert!(reason.contains("disk I/O error")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(adapter.index().snapshot(), before);
        assert!(!adapter.index().is_rebuilding());
    }

    #[test]
    fn test_cancelled_rebuild_keeps_previous_state() {
        let adapter = adapter();
        adapter
            .apply(&NoteEvent::Created(note(1, "Live", "content", &[])))
            .unwrap();
        let before = adapter.index().snapshot();

        let token = CancellationToken::new();
        let source = CancellingSource {
            notes: (10..20).map(|i| note(i, "Other", "words", &[])).collect(),
            after: 3,
            token: token.clone(),
        };

        let err = adapter.rebuild(&source, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(adapter.index().snapshot(), before);

        // The next rebuild may start.
        adapter.rebuild(&Vec::<Note>::new(), &CancellationToken::new()).unwrap();
        assert!(adapter.index().is_empty());
    }

    #[test]
    fn test_spawned_rebuild() {
        let adapter = adapter();
        let source: Arc<dyn NoteSource> = Arc::new(vec![note(1, "Docker", "compose", &["devops"])]);

        let handle = adapter.spawn_rebuild(source).unwrap();
        let report = handle.wait().unwrap();

        assert_eq!(report.notes_indexed, 1);
        assert!(adapter.index().notes_for_tag("devops").contains(&NoteId(1)));
    }

    #[test]
    fn test_cancelled_token_before_start() {
        let adapter = adapter();
        let token = CancellationToken::new();
        token.cancel();

        let source = vec![note(1, "A", "b", &[])];
        assert!(adapter.rebuild(&source, &token).unwrap_err().is_cancelled());
        assert!(adapter.index().is_empty());
    }
}
