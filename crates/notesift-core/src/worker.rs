//! Background search worker for search-as-you-type.
//!
//! Requests are numbered as they are submitted. The worker skips any request
//! that has already been superseded by a newer one, and
//! [`SearchWorker::poll_latest`] only ever hands back a result newer than the
//! last one returned, so a slow query never overwrites a fresher answer.

use crate::error::Result;
use crate::query::SearchFilters;
use crate::search::{QueryEngine, SearchHit};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

struct SearchRequest {
    id: u64,
    query: String,
    filters: SearchFilters,
    limit: usize,
}

/// A completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Id returned by [`SearchWorker::submit`]
    pub id: u64,
    pub hits: Vec<SearchHit>,
    pub took: Duration,
}

/// Serves searches on a dedicated thread.
pub struct SearchWorker {
    req_tx: Option<Sender<SearchRequest>>,
    done_rx: Receiver<SearchOutcome>,
    last_request_id: u64,
    latest_applied_id: u64,
    thread: Option<JoinHandle<()>>,
}

impl SearchWorker {
    /// Spawn the worker thread.
    pub fn new(engine: Arc<QueryEngine>) -> Result<Self> {
        let (req_tx, req_rx) = unbounded::<SearchRequest>();
        let (done_tx, done_rx) = unbounded::<SearchOutcome>();

        let thread = thread::Builder::new()
            .name("notesift-search".to_string())
            .spawn(move || serve(&engine, &req_rx, &done_tx))?;

        Ok(SearchWorker {
            req_tx: Some(req_tx),
            done_rx,
            last_request_id: 0,
            latest_applied_id: 0,
            thread: Some(thread),
        })
    }

    /// Queue a search and return its id.
    pub fn submit(&mut self, query: impl Into<String>, filters: SearchFilters, limit: usize) -> u64 {
        self.last_request_id = self.last_request_id.wrapping_add(1);
        let id = self.last_request_id;

        if let Some(tx) = &self.req_tx {
            let _ = tx.send(SearchRequest {
                id,
                query: query.into(),
                filters,
                limit,
            });
        }
        id
    }

    /// Id of the most recently submitted request
    pub fn last_request_id(&self) -> u64 {
        self.last_request_id
    }

    /// Newest completed result not yet returned, without blocking.
    pub fn poll_latest(&mut self) -> Option<SearchOutcome> {
        let mut newest: Option<SearchOutcome> = None;
        while let Ok(done) = self.done_rx.try_recv() {
            newest = self.keep_newer(newest, done);
        }
        self.accept(newest)
    }

    /// Block until the most recently submitted request completes.
    ///
    /// Returns `None` on timeout.
    pub fn wait_latest(&mut self, timeout: Duration) -> Option<SearchOutcome> {
        let target = self.last_request_id;
        let deadline = Instant::now() + timeout;
        let mut newest: Option<SearchOutcome> = None;

        while newest.as_ref().map_or(true, |done| done.id < target) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(done) => newest = self.keep_newer(newest, done),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.accept(newest.filter(|done| done.id >= target))
    }

    fn keep_newer(&self, current: Option<SearchOutcome>, done: SearchOutcome) -> Option<SearchOutcome> {
        match current {
            Some(current) if current.id >= done.id => Some(current),
            _ if done.id > self.latest_applied_id => Some(done),
            current => current,
        }
    }

    fn accept(&mut self, outcome: Option<SearchOutcome>) -> Option<SearchOutcome> {
        let outcome = outcome?;
        self.latest_applied_id = outcome.id;
        Some(outcome)
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.req_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(engine: &QueryEngine, requests: &Receiver<SearchRequest>, done: &Sender<SearchOutcome>) {
    while let Ok(mut request) = requests.recv() {
        // Only the newest queued request is worth running.
        for newer in requests.try_iter() {
            debug!(skipped = request.id, "Superseded search request");
            request = newer;
        }

        let start = Instant::now();
        let hits = engine.search(&request.query, &request.filters, request.limit);
        let outcome = SearchOutcome {
            id: request.id,
            hits,
            took: start.elapsed(),
        };
        if done.send(outcome).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::NoteIndex;
    use crate::types::{Note, NoteId};

    fn engine() -> Arc<QueryEngine> {
        let index = Arc::new(NoteIndex::default());
        index
            .upsert_note(&Note::new(NoteId(1), "React Hooks Cheat Sheet", "useState useEffect"))
            .unwrap();
        index
            .upsert_note(&Note::new(NoteId(2), "Python FastAPI Quick Start", "async endpoints"))
            .unwrap();
        Arc::new(QueryEngine::new(index, &Config::default()))
    }

    #[test]
    fn test_wait_latest_returns_newest() {
        let mut worker = SearchWorker::new(engine()).unwrap();

        worker.submit("react", SearchFilters::new(), 10);
        worker.submit("re", SearchFilters::new(), 10);
        let id = worker.submit("fastapi", SearchFilters::new(), 10);

        let outcome = worker.wait_latest(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.id, id);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].note_id, NoteId(2));
    }

    #[test]
    fn test_poll_never_goes_backwards() {
        let mut worker = SearchWorker::new(engine()).unwrap();

        worker.submit("react", SearchFilters::new(), 10);
        let first = worker.wait_latest(Duration::from_secs(5)).unwrap();
        assert_eq!(first.id, 1);

        // Nothing new has completed.
        assert!(worker.poll_latest().is_none());

        worker.submit("hooks", SearchFilters::new(), 10);
        let second = worker.wait_latest(Duration::from_secs(5)).unwrap();
        assert_eq!(second.id, 2);
        assert!(worker.poll_latest().is_none());
    }

    #[test]
    fn test_request_ids_increase() {
        let mut worker = SearchWorker::new(engine()).unwrap();
        let a = worker.submit("a", SearchFilters::new(), 1);
        let b = worker.submit("b", SearchFilters::new(), 1);
        assert!(b > a);
        assert_eq!(worker.last_request_id(), b);
    }
}
