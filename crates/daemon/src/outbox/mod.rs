// Durable outbound event queue for telemetry.
//
// Events are persisted to `<config-dir>/events-queue.json` as
// `[{id, payload, queuedAt, retryCount}]` before any delivery attempt. A flush
// sends every queued event once: delivered events are removed, failed ones
// stay with `retryCount + 1`. Delivery is at-least-once and runs off the
// commit path on a spawned task.
//
// The queue file is shared by every daemon of the user. Each read-modify-write
// holds an fs2 lock on `events-queue.lock`, and a flush settles events by id,
// so entries enqueued or trimmed while it was delivering are left alone.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::security::{create_private_dir, write_private_atomic};

pub const QUEUE_FILE: &str = "events-queue.json";
const LOCK_FILE: &str = "events-queue.lock";

// ── Constants ───────────────────────────────────────────────────────

const BASE_DELAY_MS: u64 = 250;
const MAX_DELAY_MS: u64 = 30_000;
/// Events failing this many flushes are dropped.
const MAX_ATTEMPTS: u32 = 8;
/// Oldest events are dropped beyond this many.
const MAX_QUEUED_EVENTS: usize = 1_000;
/// Flush rounds a spawned flusher makes before leaving failures for later.
const FLUSH_ROUNDS: u32 = 3;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ── Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEvent {
    /// Older queue files lack ids; one is assigned on first load.
    #[serde(default = "new_event_id")]
    pub id: String,
    pub payload: Value,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed(FlushReport),
    AlreadyFlushing,
    Empty,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("telemetry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telemetry endpoint returned HTTP {0}")]
    Status(u16),
}

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Destination for queued events.
pub trait EventSink: Send + Sync {
    fn deliver<'a>(&'a self, event: &'a QueuedEvent) -> DeliveryFuture<'a>;
}

// ── Backoff ─────────────────────────────────────────────────────────

/// Compute exponential backoff delay for a given attempt number (0-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(7);
    let delay_ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

// ── Queue operations ────────────────────────────────────────────────

#[derive(Debug)]
pub struct OutboxQueue {
    path: Option<PathBuf>,
    memory: Mutex<Vec<QueuedEvent>>,
    flushing: AtomicBool,
}

impl OutboxQueue {
    /// Queue persisted under `dir` (normally the global config directory).
    pub fn new(dir: &Path) -> Self {
        Self::with_path(Some(dir.join(QUEUE_FILE)))
    }

    /// Queue that keeps events only for the life of the process.
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self { path, memory: Mutex::new(Vec::new()), flushing: AtomicBool::new(false) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist `payload` for later delivery.
    pub fn enqueue(&self, payload: Value) {
        let event = QueuedEvent { id: new_event_id(), payload, queued_at: Utc::now(), retry_count: 0 };
        self.update(|queue| {
            queue.push(event);
            if queue.len() > MAX_QUEUED_EVENTS {
                let excess = queue.len() - MAX_QUEUED_EVENTS;
                queue.drain(..excess);
                warn!(dropped = excess, "telemetry queue full, dropping oldest events");
            }
        });
    }

    pub fn pending(&self) -> Vec<QueuedEvent> {
        let guard = self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &self.path {
            Some(path) => load_queue(path),
            None => guard.clone(),
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Attempt delivery of every queued event once.
    pub async fn flush(&self, sink: &dyn EventSink) -> FlushOutcome {
        if self.flushing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return FlushOutcome::AlreadyFlushing;
        }
        let _reset = FlushingGuard(&self.flushing);

        // Read through `update` so ids assigned to legacy entries are persisted
        // before delivery.
        let mut snapshot = Vec::new();
        self.update(|queue| snapshot = queue.clone());
        if snapshot.is_empty() {
            return FlushOutcome::Empty;
        }

        let mut report = FlushReport::default();
        let mut settled = HashSet::new();
        let mut retries = HashMap::new();
        for event in &snapshot {
            match sink.deliver(event).await {
                Ok(()) => {
                    report.delivered += 1;
                    settled.insert(event.id.clone());
                }
                Err(error) => {
                    let retry_count = event.retry_count + 1;
                    if retry_count >= MAX_ATTEMPTS {
                        warn!(error = %error, retries = retry_count, "dropping undeliverable telemetry event");
                        report.dropped += 1;
                        settled.insert(event.id.clone());
                    } else {
                        debug!(error = %error, retries = retry_count, "telemetry delivery failed, keeping event");
                        report.failed += 1;
                        retries.insert(event.id.clone(), retry_count);
                    }
                }
            }
        }

        self.update(|queue| {
            queue.retain(|event| !settled.contains(&event.id));
            for event in queue.iter_mut() {
                if let Some(retry_count) = retries.get(&event.id) {
                    event.retry_count = *retry_count;
                }
            }
        });

        FlushOutcome::Flushed(report)
    }

    /// Flush on a background task, retrying failures with backoff a few times.
    pub fn spawn_flush(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            for round in 0..FLUSH_ROUNDS {
                match queue.flush(sink.as_ref()).await {
                    FlushOutcome::Flushed(report) if report.failed > 0 => {
                        tokio::time::sleep(backoff_delay(round)).await;
                    }
                    _ => return,
                }
            }
        })
    }

    fn update(&self, mutate: impl FnOnce(&mut Vec<QueuedEvent>)) {
        let mut guard = self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &self.path {
            Some(path) => {
                let _lock = match lock_queue(path) {
                    Ok(lock) => Some(lock),
                    Err(error) => {
                        warn!(path = %path.display(), error = %error, "failed to lock telemetry queue");
                        None
                    }
                };
                let mut queue = load_queue(path);
                mutate(&mut queue);
                if let Err(error) = save_queue(path, &queue) {
                    warn!(path = %path.display(), error = %error, "failed to save telemetry queue");
                }
            }
            None => mutate(&mut guard),
        }
    }
}

struct FlushingGuard<'a>(&'a AtomicBool);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Exclusive lock on the file next to the queue, released when the handle
/// drops. The lock file itself is never removed.
fn lock_queue(path: &Path) -> std::io::Result<File> {
    let lock_path = path.with_file_name(LOCK_FILE);
    if let Some(dir) = lock_path.parent() {
        create_private_dir(dir)?;
    }
    let file = OpenOptions::new().create(true).truncate(false).read(true).write(true).open(&lock_path)?;
    file.lock_exclusive()?;
    Ok(file)
}

fn load_queue(path: &Path) -> Vec<QueuedEvent> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
            warn!(path = %path.display(), error = %error, "corrupt telemetry queue, starting empty");
            Vec::new()
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to read telemetry queue");
            Vec::new()
        }
    }
}

fn save_queue(path: &Path, queue: &[QueuedEvent]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        create_private_dir(dir)?;
    }
    let contents = serde_json::to_vec_pretty(queue).map_err(std::io::Error::other)?;
    write_private_atomic(path, &contents)
}

// ── HTTP sink ───────────────────────────────────────────────────────

/// Posts each event payload as JSON to a telemetry endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl EventSink for HttpEventSink {
    fn deliver<'a>(&'a self, event: &'a QueuedEvent) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self.client.post(&self.endpoint).json(event).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(DeliveryError::Status(status.as_u16()))
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Sink that fails the first `fail_first` deliveries and records the rest.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub fail_first: usize,
        pub attempts: AtomicUsize,
        pub delivered: Mutex<Vec<Value>>,
    }

    impl RecordingSink {
        pub(crate) fn failing(fail_first: usize) -> Self {
            Self { fail_first, ..Self::default() }
        }
    }

    impl EventSink for RecordingSink {
        fn deliver<'a>(&'a self, event: &'a QueuedEvent) -> DeliveryFuture<'a> {
            Box::pin(async move {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < self.fail_first {
                    return Err(DeliveryError::Status(503));
                }
                self.delivered.lock().unwrap().push(event.payload.clone());
                Ok(())
            })
        }
    }

    // ── Backoff ─────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(20), Duration::from_millis(30_000));
    }

    // ── Enqueue ─────────────────────────────────────────────────────

    #[test]
    fn enqueue_persists_wire_format() {
        let tmp = TempDir::new().unwrap();
        let queue = OutboxQueue::new(tmp.path());

        queue.enqueue(json!({ "type": "push", "branch": "feature" }));

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join(QUEUE_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw[0]["payload"]["type"], "push");
        assert_eq!(raw[0]["retryCount"], 0);
        assert!(raw[0]["queuedAt"].is_string());
        assert!(Uuid::parse_str(raw[0]["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn queue_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        OutboxQueue::new(tmp.path()).enqueue(json!({ "n": 1 }));

        let reopened = OutboxQueue::new(tmp.path());
        assert_eq!(reopened.pending().len(), 1);
    }

    #[test]
    fn queue_is_bounded() {
        let queue = OutboxQueue::in_memory();
        for n in 0..(MAX_QUEUED_EVENTS + 5) {
            queue.enqueue(json!({ "n": n }));
        }
        let pending = queue.pending();
        assert_eq!(pending.len(), MAX_QUEUED_EVENTS);
        assert_eq!(pending[0].payload["n"], 5);
    }

    // ── Flush ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn flush_removes_delivered_events() {
        let tmp = TempDir::new().unwrap();
        let queue = OutboxQueue::new(tmp.path());
        queue.enqueue(json!({ "n": 1 }));
        queue.enqueue(json!({ "n": 2 }));
        let sink = RecordingSink::default();

        let outcome = queue.flush(&sink).await;

        assert_eq!(
            outcome,
            FlushOutcome::Flushed(FlushReport { delivered: 2, failed: 0, dropped: 0 })
        );
        assert!(queue.pending().is_empty());
        assert_eq!(sink.delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_events_stay_with_incremented_retry_count() {
        let tmp = TempDir::new().unwrap();
        let queue = OutboxQueue::new(tmp.path());
        queue.enqueue(json!({ "n": 1 }));
        queue.enqueue(json!({ "n": 2 }));
        let sink = RecordingSink::failing(1);

        queue.flush(&sink).await;

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload["n"], 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn events_are_dropped_after_max_attempts() {
        let queue = OutboxQueue::in_memory();
        queue.enqueue(json!({ "n": 1 }));
        let sink = RecordingSink::failing(usize::MAX);

        for _ in 0..MAX_ATTEMPTS {
            queue.flush(&sink).await;
        }

        assert!(queue.pending().is_empty());
    }

    /// Succeeds on the first delivery after enqueueing `burst` new events into
    /// the same queue, then fails every later delivery.
    struct EnqueuingSink {
        queue: Arc<OutboxQueue>,
        burst: usize,
        calls: AtomicUsize,
    }

    impl EventSink for EnqueuingSink {
        fn deliver<'a>(&'a self, _event: &'a QueuedEvent) -> DeliveryFuture<'a> {
            Box::pin(async move {
                if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                    return Err(DeliveryError::Status(503));
                }
                for n in 0..self.burst {
                    self.queue.enqueue(json!({ "n": n }));
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn events_trimmed_during_flush_are_not_resurrected_or_misremoved() {
        let queue = Arc::new(OutboxQueue::in_memory());
        queue.enqueue(json!({ "name": "delivered" }));
        queue.enqueue(json!({ "name": "failing" }));
        let sink = EnqueuingSink { queue: Arc::clone(&queue), burst: MAX_QUEUED_EVENTS, calls: AtomicUsize::new(0) };

        let outcome = queue.flush(&sink).await;

        assert_eq!(outcome, FlushOutcome::Flushed(FlushReport { delivered: 1, failed: 1, dropped: 0 }));
        let pending = queue.pending();
        assert_eq!(pending.len(), MAX_QUEUED_EVENTS);
        assert_eq!(pending[0].payload["n"], 0);
        assert_eq!(pending[MAX_QUEUED_EVENTS - 1].payload["n"], MAX_QUEUED_EVENTS - 1);
        assert!(pending.iter().all(|event| event.payload.get("name").is_none()));
        assert!(pending.iter().all(|event| event.retry_count == 0));
    }

    #[tokio::test]
    async fn events_enqueued_during_flush_survive_it() {
        let tmp = TempDir::new().unwrap();
        let queue = Arc::new(OutboxQueue::new(tmp.path()));
        queue.enqueue(json!({ "name": "first" }));
        let sink = EnqueuingSink { queue: Arc::clone(&queue), burst: 2, calls: AtomicUsize::new(0) };

        queue.flush(&sink).await;

        let pending: Vec<Value> = queue.pending().into_iter().map(|event| event.payload).collect();
        assert_eq!(pending, vec![json!({ "n": 0 }), json!({ "n": 1 })]);
    }

    #[test]
    fn concurrent_writers_on_one_file_lose_nothing() {
        let tmp = TempDir::new().unwrap();
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let dir = tmp.path().to_path_buf();
                std::thread::spawn(move || {
                    let queue = OutboxQueue::new(&dir);
                    for n in 0..25 {
                        queue.enqueue(json!({ "writer": writer, "n": n }));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(OutboxQueue::new(tmp.path()).pending().len(), 100);
        assert!(tmp.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn legacy_entries_without_ids_are_flushed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(QUEUE_FILE),
            r#"[{"payload":{"n":1},"queuedAt":"2026-01-02T03:04:05Z","retryCount":2}]"#,
        )
        .unwrap();
        let queue = OutboxQueue::new(tmp.path());
        let sink = RecordingSink::default();

        queue.flush(&sink).await;

        assert!(queue.pending().is_empty());
        assert_eq!(sink.delivered.lock().unwrap().as_slice(), &[json!({ "n": 1 })]);
    }

    #[tokio::test]
    async fn empty_queue_flush_is_a_no_op() {
        let queue = OutboxQueue::in_memory();
        assert_eq!(queue.flush(&RecordingSink::default()).await, FlushOutcome::Empty);
        assert!(!queue.is_flushing());
    }

    #[tokio::test]
    async fn spawned_flush_retries_failures() {
        let queue = Arc::new(OutboxQueue::in_memory());
        queue.enqueue(json!({ "n": 1 }));
        let sink = Arc::new(RecordingSink::failing(1));

        queue.spawn_flush(sink.clone()).await.unwrap();

        assert!(queue.pending().is_empty());
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }
}
