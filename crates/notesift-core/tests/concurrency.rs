//! Readers, writers and background rebuilds sharing one index.

use crossbeam_channel::{bounded, Sender};
use notesift_core::{
    Config, Field, Note, NoteId, NoteIndex, NoteSiftError, NoteSource, QueryEngine, SearchFilters,
    SyncAdapter,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn fillers(count: i64) -> Vec<Note> {
    (2..count + 2)
        .map(|i| Note::new(NoteId(i), format!("filler {i}"), "padding text for the rebuild"))
        .collect()
}

/// Hands out its notes slowly, signalling once iteration has begun.
struct SlowSource {
    notes: Vec<Note>,
    started: Sender<()>,
}

impl NoteSource for SlowSource {
    fn iterate_all_notes(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Note>> + '_>> {
        let _ = self.started.send(());
        Ok(Box::new(self.notes.iter().cloned().map(|note| {
            thread::sleep(Duration::from_millis(1));
            Ok(note)
        })))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn slow_rebuild_fixture() -> (Arc<NoteIndex>, SyncAdapter, Arc<SlowSource>, crossbeam_channel::Receiver<()>) {
    let index = Arc::new(NoteIndex::default());
    index
        .upsert_note(&Note::new(NoteId(1), "Kept", "served while rebuilding"))
        .unwrap();
    let adapter = SyncAdapter::new(Arc::clone(&index));
    let (started, started_rx) = bounded(1);
    let source = Arc::new(SlowSource {
        notes: fillers(5_000),
        started,
    });
    (index, adapter, source, started_rx)
}

fn kept_ids(index: &Arc<NoteIndex>) -> Vec<i64> {
    QueryEngine::new(Arc::clone(index), &Config::default())
        .search("served", &SearchFilters::new(), 10)
        .into_iter()
        .map(|h| h.note_id.0)
        .collect()
}

#[test]
fn readers_never_see_half_applied_writes() {
    init_tracing();

    let index = Arc::new(NoteIndex::default());
    let first = Note::new(NoteId(1), "", "alpha apple");
    let second = Note::new(NoteId(1), "", "beta banana");
    index.upsert_note(&first).unwrap();

    let mut source = fillers(2_000);
    source.push(first.clone());
    let source: Arc<dyn NoteSource> = Arc::new(source);

    let adapter = SyncAdapter::new(Arc::clone(&index));
    let stop = AtomicBool::new(false);

    let report = thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = QueryEngine::new(Arc::clone(&index), &Config::default());
                let index = &index;
                let stop = &stop;
                scope.spawn(move || {
                    let whole = [
                        BTreeSet::from(["alpha", "apple"]),
                        BTreeSet::from(["beta", "banana"]),
                    ];
                    let mut generation = index.generation();
                    while !stop.load(Ordering::Acquire) {
                        let hits = engine.search("alpha apple beta banana", &SearchFilters::new(), 10);
                        let hit = hits
                            .iter()
                            .find(|h| h.note_id == NoteId(1))
                            .expect("note 1 is always indexed");
                        let terms: BTreeSet<&str> = hit
                            .highlights
                            .iter()
                            .filter(|h| h.field == Field::Body)
                            .map(|h| h.term.as_str())
                            .collect();
                        assert!(whole.contains(&terms), "partial write observed: {terms:?}");

                        let now = index.generation();
                        assert!(now >= generation);
                        generation = now;
                    }
                })
            })
            .collect();

        let rebuild = adapter.spawn_rebuild(Arc::clone(&source)).unwrap();
        for i in 0..300 {
            let note = if i % 2 == 0 { &second } else { &first };
            index.upsert_note(note).unwrap();
        }
        let report = rebuild.wait();

        stop.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
        report
    });

    let report = report.unwrap();
    assert_eq!(report.notes_indexed, 2_001);
    assert_eq!(index.len(), 2_001);
    assert!(!index.is_rebuilding());

    // The last write was `first`; it must survive the swap.
    assert!(index.lookup("apple").iter().any(|p| p.note_id == NoteId(1)));
    assert!(index.lookup("banana").is_empty());
}

#[test]
fn cancelled_rebuild_keeps_previous_state() {
    init_tracing();
    let (index, adapter, source, started) = slow_rebuild_fixture();

    let handle = adapter.spawn_rebuild(source).unwrap();
    started.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(index.is_rebuilding());
    assert_eq!(kept_ids(&index), vec![1]);

    handle.cancel();
    assert!(matches!(handle.wait(), Err(NoteSiftError::Cancelled)));

    assert!(!index.is_rebuilding());
    assert_eq!(index.len(), 1);
    assert_eq!(kept_ids(&index), vec![1]);
}

#[test]
fn dropping_the_handle_abandons_the_rebuild() {
    init_tracing();
    let (index, adapter, source, started) = slow_rebuild_fixture();

    let handle = adapter.spawn_rebuild(source).unwrap();
    started.recv_timeout(Duration::from_secs(10)).unwrap();
    let token = handle.token();
    drop(handle);

    assert!(token.is_cancelled());
    assert!(!index.is_rebuilding());
    assert_eq!(index.len(), 1);
    assert_eq!(kept_ids(&index), vec![1]);

    let report = adapter
        .rebuild(&fillers(3), &notesift_core::CancellationToken::new())
        .unwrap();
    assert_eq!(report.notes_indexed, 3);
    assert_eq!(index.len(), 3);
}
