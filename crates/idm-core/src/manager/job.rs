//! Live job: the runtime counterpart of a record while it downloads.

use crate::downloader::ChunkFetcher;
use crate::store::{DownloadRecord, DownloadStatus};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a job's cancellation was requested; decides the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelKind {
    Pause,
    Cancel,
}

const KIND_NONE: u8 = 0;
const KIND_PAUSE: u8 = 1;
const KIND_CANCEL: u8 = 2;

/// Created on admission, destroyed on terminal status. The registry and
/// the runner task share it through an `Arc`.
pub(crate) struct Job {
    pub id: i64,
    /// Live snapshot of the record; the stats loop and runner both write
    /// through short critical sections.
    record: Mutex<DownloadRecord>,
    /// Job-wide byte counter, bumped atomically by every chunk.
    pub downloaded: Arc<AtomicU64>,
    cancel: CancellationToken,
    cancel_kind: AtomicU8,
    pub client: reqwest::Client,
    started: Instant,
    fetchers: Mutex<Vec<Arc<ChunkFetcher>>>,
    /// Serializes store writes for this job so a stale stats row can never
    /// land after the terminal row.
    persist_gate: tokio::sync::Mutex<()>,
}

impl Job {
    pub fn new(record: DownloadRecord, client: reqwest::Client) -> Self {
        Self {
            id: record.id,
            record: Mutex::new(record),
            downloaded: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            cancel_kind: AtomicU8::new(KIND_NONE),
            client,
            started: Instant::now(),
            fetchers: Mutex::new(Vec::new()),
            persist_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Take the persist gate. Snapshot the record and write the row while
    /// holding it.
    pub async fn persist_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.persist_gate.lock().await
    }

    /// Parent cancellation token; chunk fetchers run under children of it.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record the intent (pause vs cancel) and fan the signal out. The
    /// first request wins; a later different kind does not override it.
    pub fn request_cancel(&self, kind: CancelKind) {
        let v = match kind {
            CancelKind::Pause => KIND_PAUSE,
            CancelKind::Cancel => KIND_CANCEL,
        };
        let _ = self.cancel_kind.compare_exchange(
            KIND_NONE,
            v,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.cancel.cancel();
    }

    pub fn cancel_kind(&self) -> Option<CancelKind> {
        match self.cancel_kind.load(Ordering::SeqCst) {
            KIND_PAUSE => Some(CancelKind::Pause),
            KIND_CANCEL => Some(CancelKind::Cancel),
            _ => None,
        }
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Mutate the live record and get the resulting snapshot.
    pub fn update_record<F: FnOnce(&mut DownloadRecord)>(&self, f: F) -> DownloadRecord {
        let mut record = self.record.lock().unwrap();
        f(&mut record);
        record.clone()
    }

    pub fn set_fetchers(&self, fetchers: Vec<Arc<ChunkFetcher>>) {
        *self.fetchers.lock().unwrap() = fetchers;
    }

    /// Sum of the per-chunk counters. Always equals the job-wide counter
    /// outside of a retry window.
    pub fn chunk_bytes_sum(&self) -> u64 {
        self.fetchers
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.bytes_downloaded())
            .sum()
    }

    /// Refresh progress and speed and return a snapshot, or `None` when the
    /// job is not (yet, or anymore) in `Downloading`.
    pub fn stats_snapshot(&self) -> Option<DownloadRecord> {
        let mut record = self.record.lock().unwrap();
        if record.status != DownloadStatus::Downloading {
            return None;
        }
        record.downloaded = self.downloaded.load(Ordering::Relaxed);
        if record.total_size > 0 {
            // 100.0 is reserved for Completed.
            record.progress =
                (record.downloaded as f64 / record.total_size as f64 * 100.0).min(99.9);
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            record.speed = (record.downloaded as f64 / elapsed) as u64;
        }
        Some(record.clone())
    }
}
