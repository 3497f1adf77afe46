//! Single-worker FIFO processing queue.
//!
//! Items move `pending → processing → {completed | failed}`; a failed item
//! goes back to `pending` on retry. One background thread takes the oldest
//! pending item, runs the pipeline and records the outcome. While there is
//! nothing to do it blocks on a condition variable.
//!
//! Items live in an arena behind one mutex and are replaced wholesale on
//! every change, so readers only ever see complete snapshots.

pub mod item;

pub use item::*;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::events::ProcessingEvents;
use crate::pipeline::processor::{validate_input, DocumentPipeline};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No queue item with id {0}")]
    NotFound(Uuid),

    #[error("Item {0} is being processed")]
    ItemBusy(Uuid),

    #[error("Item {0} has not failed")]
    NotFailed(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What `add_file` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(Uuid),
    /// The path was already queued; nothing changed.
    AlreadyQueued(Uuid),
}

impl AddOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Added(id) | Self::AlreadyQueued(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items completed since the queue was created. Never decreases.
    pub processed_total: u64,
    /// Failed runs since the queue was created. Never decreases.
    pub failed_total: u64,
}

/// Receives every item snapshot after it changed.
///
/// Called from the worker thread and from the caller's thread, never with
/// the queue lock held.
pub trait QueueListener: Send + Sync {
    fn on_item_changed(&self, item: &QueueItem);
}

// ──────────────────────────────────────────────
// Shared state
// ──────────────────────────────────────────────

#[derive(Default)]
struct State {
    items: HashMap<Uuid, Arc<QueueItem>>,
    order: Vec<Uuid>,
    active: bool,
    shutdown: bool,
    in_flight: Option<Uuid>,
    processed_total: u64,
    failed_total: u64,
}

impl State {
    fn next_pending(&self) -> Option<Uuid> {
        self.order.iter().copied().find(|id| {
            self.items
                .get(id)
                .is_some_and(|item| item.status == ItemStatus::Pending)
        })
    }

    fn has_pending(&self) -> bool {
        self.next_pending().is_some()
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_none() && (!self.active || !self.has_pending())
    }

    /// Apply `change` to a copy of the item and swap it in.
    fn update<F>(&mut self, id: Uuid, change: F) -> Option<Arc<QueueItem>>
    where
        F: FnOnce(&mut QueueItem),
    {
        let current = self.items.get(&id)?;
        let mut next = QueueItem::clone(current);
        change(&mut next);
        let next = Arc::new(next);
        self.items.insert(id, Arc::clone(&next));
        Some(next)
    }

    fn remove(&mut self, id: Uuid) -> Option<Arc<QueueItem>> {
        let removed = self.items.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(removed)
    }
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when work may be available or on shutdown.
    work: Condvar,
    /// Signalled whenever an item finishes or the queue stops.
    idle: Condvar,
    pipeline: Arc<dyn DocumentPipeline>,
    listener: Option<Arc<dyn QueueListener>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, item: &QueueItem) {
        if let Some(listener) = &self.listener {
            listener.on_item_changed(item);
        }
    }

    /// Update the in-flight item only; events for anything else are dropped.
    fn update_in_flight<F>(&self, id: Uuid, change: F)
    where
        F: FnOnce(&mut QueueItem),
    {
        let snapshot = {
            let mut state = self.lock();
            if state.in_flight != Some(id) {
                return;
            }
            state.update(id, change)
        };
        if let Some(item) = snapshot {
            self.notify(&item);
        }
    }
}

/// Routes orchestrator events to one queue item.
struct ItemEvents<'a> {
    shared: &'a Shared,
    id: Uuid,
}

impl ProcessingEvents for ItemEvents<'_> {
    fn on_status(&self, message: &str, progress: f32) {
        self.shared
            .update_in_flight(self.id, |item| item.set_progress(message, progress));
    }

    fn on_log(&self, message: &str) {
        self.shared
            .update_in_flight(self.id, |item| item.push_log(message));
    }

    fn on_preview(&self, path: &Path) {
        self.shared
            .update_in_flight(self.id, |item| item.previews.push(path.to_path_buf()));
    }
}

// ──────────────────────────────────────────────
// ProcessingQueue
// ──────────────────────────────────────────────

/// FIFO queue processed by one background worker.
///
/// The worker thread is spawned on the first `start` and lives until the
/// queue is dropped; `stop` only pauses it.
pub struct ProcessingQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingQueue {
    pub fn new(pipeline: Arc<dyn DocumentPipeline>) -> Self {
        Self::build(pipeline, None)
    }

    pub fn with_listener(
        pipeline: Arc<dyn DocumentPipeline>,
        listener: Arc<dyn QueueListener>,
    ) -> Self {
        Self::build(pipeline, Some(listener))
    }

    fn build(
        pipeline: Arc<dyn DocumentPipeline>,
        listener: Option<Arc<dyn QueueListener>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                work: Condvar::new(),
                idle: Condvar::new(),
                pipeline,
                listener,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Validate and enqueue `path`. A path already in the queue is not
    /// added again; its existing id is returned.
    pub fn add_file(&self, path: &Path) -> Result<AddOutcome, QueueError> {
        validate_input(path).map_err(QueueError::InvalidInput)?;
        let key = normalize(path);

        let item = {
            let mut state = self.shared.lock();
            if let Some(existing) = state.items.values().find(|i| i.source_path == key) {
                tracing::debug!(id = %existing.id, path = %key.display(), "Already queued");
                return Ok(AddOutcome::AlreadyQueued(existing.id));
            }
            let item = Arc::new(QueueItem::new(key));
            state.order.push(item.id);
            state.items.insert(item.id, Arc::clone(&item));
            item
        };

        tracing::info!(id = %item.id, path = %item.source_path.display(), "Queued document");
        self.shared.work.notify_all();
        self.shared.notify(&item);
        Ok(AddOutcome::Added(item.id))
    }

    /// `add_file` for each path, in order.
    pub fn add_files<I, P>(&self, paths: I) -> Vec<Result<AddOutcome, QueueError>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .map(|p| self.add_file(p.as_ref()))
            .collect()
    }

    /// Begin (or resume) processing pending items.
    pub fn start(&self) -> Result<(), QueueError> {
        {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            if worker.is_none() {
                let shared = Arc::clone(&self.shared);
                let handle = std::thread::Builder::new()
                    .name("docsort-worker".into())
                    .spawn(move || worker_loop(&shared))?;
                *worker = Some(handle);
            }
        }
        self.shared.lock().active = true;
        self.shared.work.notify_all();
        tracing::info!("Queue started");
        Ok(())
    }

    /// Stop taking new items. The item in flight finishes and is recorded.
    /// Returns immediately.
    pub fn stop(&self) {
        self.shared.lock().active = false;
        self.shared.idle.notify_all();
        tracing::info!("Queue stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().active
    }

    /// Put a failed item back at the end of the queue.
    pub fn retry(&self, id: Uuid) -> Result<(), QueueError> {
        let item = {
            let mut state = self.shared.lock();
            let current = state.items.get(&id).ok_or(QueueError::NotFound(id))?;
            if !matches!(current.status, ItemStatus::Failed { .. }) {
                return Err(QueueError::NotFailed(id));
            }
            let item = state.update(id, reset_for_retry);
            move_to_back(&mut state, id);
            item
        };
        self.shared.work.notify_all();
        if let Some(item) = item {
            tracing::info!(id = %id, "Retrying document");
            self.shared.notify(&item);
        }
        Ok(())
    }

    /// Retry every failed item, keeping their relative order. Returns how many.
    pub fn retry_all_failed(&self) -> usize {
        let changed: Vec<Arc<QueueItem>> = {
            let mut state = self.shared.lock();
            let failed: Vec<Uuid> = state
                .order
                .iter()
                .copied()
                .filter(|id| {
                    state
                        .items
                        .get(id)
                        .is_some_and(|i| matches!(i.status, ItemStatus::Failed { .. }))
                })
                .collect();
            failed
                .into_iter()
                .filter_map(|id| {
                    let item = state.update(id, reset_for_retry);
                    move_to_back(&mut state, id);
                    item
                })
                .collect()
        };
        if !changed.is_empty() {
            self.shared.work.notify_all();
            tracing::info!(count = changed.len(), "Retrying failed documents");
        }
        for item in &changed {
            self.shared.notify(item);
        }
        changed.len()
    }

    /// Drop an item that is not being processed, with its preview files.
    pub fn remove(&self, id: Uuid) -> Result<(), QueueError> {
        let removed = {
            let mut state = self.shared.lock();
            let current = state.items.get(&id).ok_or(QueueError::NotFound(id))?;
            if current.status == ItemStatus::Processing {
                return Err(QueueError::ItemBusy(id));
            }
            state.remove(id)
        };
        if let Some(item) = removed {
            discard(item);
        }
        self.shared.idle.notify_all();
        Ok(())
    }

    /// Remove every completed item. Returns how many.
    pub fn clear_completed(&self) -> usize {
        self.remove_where(|item| item.status == ItemStatus::Completed)
    }

    /// Remove every item except the one being processed. Returns how many.
    pub fn clear(&self) -> usize {
        self.remove_where(|item| item.status != ItemStatus::Processing)
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QueueItem) -> bool,
    {
        let removed: Vec<Arc<QueueItem>> = {
            let mut state = self.shared.lock();
            let ids: Vec<Uuid> = state
                .order
                .iter()
                .copied()
                .filter(|id| state.items.get(id).is_some_and(|i| predicate(i.as_ref())))
                .collect();
            ids.into_iter().filter_map(|id| state.remove(id)).collect()
        };
        let count = removed.len();
        removed.into_iter().for_each(discard);
        self.shared.idle.notify_all();
        count
    }

    /// Snapshots in queue order.
    pub fn items(&self) -> Vec<Arc<QueueItem>> {
        let state = self.shared.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<QueueItem>> {
        self.shared.lock().items.get(&id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        let mut stats = QueueStats {
            processed_total: state.processed_total,
            failed_total: state.failed_total,
            ..QueueStats::default()
        };
        for item in state.items.values() {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }

    /// Block until nothing is in flight and, while running, nothing is
    /// pending. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while !state.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.shared.idle.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl Drop for ProcessingQueue {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.active = false;
            state.shutdown = true;
        }
        self.shared.work.notify_all();
        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle {
            let _ = h.join();
        }

        let items: Vec<_> = {
            let mut state = self.shared.lock();
            state.order.clear();
            state.items.drain().map(|(_, item)| item).collect()
        };
        for item in items {
            discard(item);
        }
    }
}

// ──────────────────────────────────────────────
// Worker
// ──────────────────────────────────────────────

fn worker_loop(shared: &Shared) {
    tracing::info!("Queue worker started");
    while let Some((id, path)) = next_job(shared) {
        run_job(shared, id, &path);
    }
    tracing::info!("Queue worker shutting down");
}

/// Block until an item can start, mark it processing and return it.
/// `None` on shutdown.
fn next_job(shared: &Shared) -> Option<(Uuid, PathBuf)> {
    let (started, path) = {
        let mut state = shared.lock();
        let id = loop {
            if state.shutdown {
                return None;
            }
            if state.active {
                if let Some(id) = state.next_pending() {
                    break id;
                }
            }
            state = shared.work.wait(state).unwrap_or_else(PoisonError::into_inner);
        };
        state.in_flight = Some(id);
        let started = state.update(id, |item| {
            item.status = ItemStatus::Processing;
            item.started_at = Some(Utc::now());
        })?;
        let path = started.source_path.clone();
        (started, path)
    };
    shared.notify(&started);
    Some((started.id, path))
}

fn run_job(shared: &Shared, id: Uuid, path: &Path) {
    let events = ItemEvents { shared, id };
    let outcome = catch_unwind(AssertUnwindSafe(|| shared.pipeline.process(path, &events)));

    let outcome = match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(id = %id, path = %path.display(), panic = %message, "Pipeline panicked");
            Err(format!("internal error: {message}"))
        }
    };

    let finished = {
        let mut state = shared.lock();
        state.in_flight = None;
        match &outcome {
            Ok(_) => state.processed_total += 1,
            Err(_) => state.failed_total += 1,
        }
        state.update(id, move |item| {
            item.finished_at = Some(Utc::now());
            match outcome {
                Ok(result) => {
                    item.status = ItemStatus::Completed;
                    item.set_progress("Done", 1.0);
                    item.result = Some(result);
                }
                Err(error) => {
                    item.push_log(&format!("Error: {error}"));
                    item.status = ItemStatus::Failed { error };
                }
            }
        })
    };
    shared.idle.notify_all();

    if let Some(item) = finished {
        tracing::info!(id = %id, status = item.status.as_str(), "Queue item finished");
        shared.notify(&item);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn reset_for_retry(item: &mut QueueItem) {
    item.remove_previews();
    item.reset();
}

fn move_to_back(state: &mut State, id: Uuid) {
    state.order.retain(|other| *other != id);
    state.order.push(id);
}

fn discard(item: Arc<QueueItem>) {
    let mut item = Arc::unwrap_or_clone(item);
    item.remove_previews();
}

/// Absolute, symlink-free form when resolvable, for duplicate detection.
fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::{Document, OcrRecommendation};
    use crate::pipeline::classification::{Classification, ClassificationComponents};
    use crate::pipeline::processor::{OcrSummary, ProcessingError, ProcessingResult};

    const WAIT: Duration = Duration::from_secs(10);

    fn fake_result(path: &Path) -> ProcessingResult {
        let components = ClassificationComponents::fallback("2025-01-01");
        ProcessingResult {
            document: Document::new(path.to_path_buf()),
            new_path: path.with_file_name("done.pdf"),
            file_name: "done.pdf".into(),
            confidence: 0.5,
            page_count: 1,
            ocr: OcrSummary {
                recommendation: OcrRecommendation::NoExistingText,
                reason: String::new(),
                score_a: 0.0,
                score_b: 0.0,
            },
            classification: Classification::from_parts(components, "UNKNOWN", String::new()),
            preview_path: None,
        }
    }

    /// Test pipeline driven by the file name:
    /// `fail*` fails until retried once, `panic*` panics, `gate*` waits for
    /// `open()`; anything else succeeds.
    #[derive(Default)]
    struct StubPipeline {
        seen: Mutex<Vec<String>>,
        fail_budget: AtomicUsize,
        gate: Mutex<bool>,
        gate_cv: Condvar,
        preview_dir: Option<PathBuf>,
    }

    impl StubPipeline {
        fn failing_once() -> Self {
            Self {
                fail_budget: AtomicUsize::new(1),
                ..Self::default()
            }
        }

        fn open(&self) {
            *self.gate.lock().unwrap() = true;
            self.gate_cv.notify_all();
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl DocumentPipeline for StubPipeline {
        fn process(
            &self,
            path: &Path,
            events: &dyn ProcessingEvents,
        ) -> Result<ProcessingResult, ProcessingError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.seen.lock().unwrap().push(name.clone());
            events.on_status("Running OCR", 0.1);
            events.on_log(&format!("working on {name}"));

            if let Some(dir) = &self.preview_dir {
                let preview = dir.join(format!("{name}.png"));
                std::fs::write(&preview, b"png").unwrap();
                events.on_preview(&preview);
            }
            if name.starts_with("gate") {
                let mut open = self.gate.lock().unwrap();
                while !*open {
                    open = self.gate_cv.wait(open).unwrap();
                }
            }
            if name.starts_with("panic") {
                panic!("stub exploded");
            }
            if name.starts_with("fail")
                && self
                    .fail_budget
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(ProcessingError::InputRejected("stub failure".into()));
            }
            Ok(fake_result(path))
        }
    }

    fn pdfs(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| {
                let p = dir.join(n);
                std::fs::write(&p, b"%PDF").unwrap();
                p
            })
            .collect()
    }

    fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + WAIT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn status_of(queue: &ProcessingQueue, id: Uuid) -> ItemStatus {
        queue.get(id).unwrap().status.clone()
    }

    #[test]
    fn duplicate_add_returns_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));

        let first = queue.add_file(&files[0]).unwrap();
        let again = queue.add_file(&files[0]).unwrap();
        assert!(matches!(first, AddOutcome::Added(_)));
        assert_eq!(again, AddOutcome::AlreadyQueued(first.id()));

        // Same file through a different spelling of the path
        let dotted = dir.path().join(".").join("a.pdf");
        assert_eq!(queue.add_file(&dotted).unwrap().id(), first.id());
        assert_eq!(queue.items().len(), 1);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"x").unwrap();
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));

        for path in [txt, dir.path().join("missing.pdf"), dir.path().to_path_buf()] {
            assert!(matches!(
                queue.add_file(&path),
                Err(QueueError::InvalidInput(_))
            ));
        }
        assert!(queue.items().is_empty());
    }

    #[test]
    fn processes_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["c.pdf", "a.pdf", "b.pdf"]);
        let stub = Arc::new(StubPipeline::default());
        let queue = ProcessingQueue::new(stub.clone());
        queue.add_files(&files);

        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        assert_eq!(stub.seen(), vec!["c.pdf", "a.pdf", "b.pdf"]);
        let stats = queue.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.processed_total, 3);
        assert_eq!(stats.failed_total, 0);
        for item in queue.items() {
            assert_eq!(item.progress, 1.0);
            assert!(item.result.is_some());
            assert!(item.finished_at >= item.started_at);
        }
    }

    #[test]
    fn nothing_runs_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let stub = Arc::new(StubPipeline::default());
        let queue = ProcessingQueue::new(stub.clone());
        let id = queue.add_file(&files[0]).unwrap().id();

        assert!(!queue.is_running());
        assert!(queue.wait_idle(Duration::from_millis(10)));
        assert_eq!(status_of(&queue, id), ItemStatus::Pending);
        assert!(stub.seen().is_empty());
    }

    #[test]
    fn events_update_the_item() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));
        let id = queue.add_file(&files[0]).unwrap().id();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        let item = queue.get(id).unwrap();
        assert!(item.log.iter().any(|l| l.message == "working on a.pdf"));
        assert_eq!(item.current_step, "Done");
    }

    #[test]
    fn failure_then_retry_completes() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["fail.pdf", "ok.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::failing_once()));
        let ids: Vec<Uuid> = queue
            .add_files(&files)
            .into_iter()
            .map(|r| r.unwrap().id())
            .collect();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        match status_of(&queue, ids[0]) {
            ItemStatus::Failed { error } => assert!(error.contains("stub failure"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(status_of(&queue, ids[1]), ItemStatus::Completed);

        queue.retry(ids[0]).unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(status_of(&queue, ids[0]), ItemStatus::Completed);

        let stats = queue.stats();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.failed_total, 1);
        assert_eq!(stats.processed_total, 2);
        // Retried item moved behind the rest
        assert_eq!(queue.items().last().unwrap().id, ids[0]);
    }

    #[test]
    fn retry_rejects_non_failed_items() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));
        let id = queue.add_file(&files[0]).unwrap().id();

        assert!(matches!(queue.retry(id), Err(QueueError::NotFailed(_))));
        assert!(matches!(
            queue.retry(Uuid::new_v4()),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn retry_waits_for_start_when_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["fail.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::failing_once()));
        let id = queue.add_file(&files[0]).unwrap().id();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));
        queue.stop();

        assert_eq!(queue.retry_all_failed(), 1);
        let item = queue.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.log.is_empty());
        assert_eq!(item.progress, 0.0);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(status_of(&queue, id), ItemStatus::Pending);

        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(status_of(&queue, id), ItemStatus::Completed);
    }

    #[test]
    fn panic_is_recorded_and_worker_survives() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["panic.pdf", "next.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));
        let ids: Vec<Uuid> = queue
            .add_files(&files)
            .into_iter()
            .map(|r| r.unwrap().id())
            .collect();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        match status_of(&queue, ids[0]) {
            ItemStatus::Failed { error } => assert!(error.contains("stub exploded"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(status_of(&queue, ids[1]), ItemStatus::Completed);
    }

    #[test]
    fn stop_lets_in_flight_item_finish() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["gate.pdf", "after.pdf"]);
        let stub = Arc::new(StubPipeline::default());
        let queue = ProcessingQueue::new(stub.clone());
        let ids: Vec<Uuid> = queue
            .add_files(&files)
            .into_iter()
            .map(|r| r.unwrap().id())
            .collect();
        queue.start().unwrap();
        wait_until(|| status_of(&queue, ids[0]) == ItemStatus::Processing);

        queue.stop();
        assert!(!queue.is_running());
        assert!(matches!(queue.remove(ids[0]), Err(QueueError::ItemBusy(_))));

        stub.open();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(status_of(&queue, ids[0]), ItemStatus::Completed);
        assert_eq!(status_of(&queue, ids[1]), ItemStatus::Pending);
        assert_eq!(stub.seen(), vec!["gate.pdf"]);

        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(status_of(&queue, ids[1]), ItemStatus::Completed);
    }

    #[test]
    fn files_added_while_running_are_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["gate.pdf", "late.pdf"]);
        let stub = Arc::new(StubPipeline::default());
        let queue = ProcessingQueue::new(stub.clone());
        let first = queue.add_file(&files[0]).unwrap().id();
        queue.start().unwrap();
        wait_until(|| status_of(&queue, first) == ItemStatus::Processing);

        let late = queue.add_file(&files[1]).unwrap().id();
        stub.open();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(status_of(&queue, late), ItemStatus::Completed);
        assert_eq!(stub.seen(), vec!["gate.pdf", "late.pdf"]);
    }

    #[test]
    fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf", "b.pdf", "c.pdf"]);
        let queue = ProcessingQueue::new(Arc::new(StubPipeline::default()));
        let ids: Vec<Uuid> = queue
            .add_files(&files[..2])
            .into_iter()
            .map(|r| r.unwrap().id())
            .collect();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));
        queue.stop();
        let pending = queue.add_file(&files[2]).unwrap().id();

        queue.remove(ids[0]).unwrap();
        assert!(queue.get(ids[0]).is_none());
        assert!(matches!(queue.remove(ids[0]), Err(QueueError::NotFound(_))));

        assert_eq!(queue.clear_completed(), 1);
        assert_eq!(queue.items().len(), 1);
        assert_eq!(queue.items()[0].id, pending);

        assert_eq!(queue.clear(), 1);
        assert!(queue.items().is_empty());
        // Totals survive removal
        assert_eq!(queue.stats().processed_total, 2);
    }

    #[test]
    fn removing_an_item_deletes_its_previews() {
        let dir = tempfile::tempdir().unwrap();
        let previews = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let stub = StubPipeline {
            preview_dir: Some(previews.path().to_path_buf()),
            ..StubPipeline::default()
        };
        let queue = ProcessingQueue::new(Arc::new(stub));
        let id = queue.add_file(&files[0]).unwrap().id();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        let preview = queue.get(id).unwrap().previews[0].clone();
        assert!(preview.exists());
        queue.remove(id).unwrap();
        assert!(!preview.exists());
    }

    #[test]
    fn dropping_the_queue_deletes_remaining_previews() {
        let dir = tempfile::tempdir().unwrap();
        let previews = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf", "b.pdf"]);
        let stub = StubPipeline {
            preview_dir: Some(previews.path().to_path_buf()),
            ..StubPipeline::default()
        };
        let queue = ProcessingQueue::new(Arc::new(stub));
        queue.add_files(&files);
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        let written: Vec<PathBuf> = queue
            .items()
            .iter()
            .flat_map(|item| item.previews.clone())
            .collect();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));

        drop(queue);
        assert!(written.iter().all(|p| !p.exists()));
    }

    #[test]
    fn listener_sees_every_transition() {
        #[derive(Default)]
        struct Collect(Mutex<Vec<String>>);
        impl QueueListener for Collect {
            fn on_item_changed(&self, item: &QueueItem) {
                self.0.lock().unwrap().push(item.status.as_str().to_string());
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let files = pdfs(dir.path(), &["a.pdf"]);
        let listener = Arc::new(Collect::default());
        let queue =
            ProcessingQueue::with_listener(Arc::new(StubPipeline::default()), listener.clone());
        queue.add_file(&files[0]).unwrap();
        queue.start().unwrap();
        assert!(queue.wait_idle(WAIT));

        let seen = listener.0.lock().unwrap().clone();
        assert_eq!(seen.first().map(String::as_str), Some("pending"));
        assert_eq!(seen.last().map(String::as_str), Some("completed"));
        assert!(seen.iter().any(|s| s == "processing"));
    }
}
