//! Download manager: the engine's public face.
//!
//! Owns the store handle, the queue, the config, the live-job registry,
//! and the event channel. Two cooperative 1-second loops drive it: the
//! admission loop fills spare concurrency from the queue, and the stats
//! loop derives progress and speed for every live job. Both loops operate
//! on snapshots and never hold the registry lock across I/O; both exit
//! once the manager is dropped.

mod job;
mod runner;

use crate::config::Config;
use crate::error::Error;
use crate::filename;
use crate::output::ensure_dir;
use crate::probe;
use crate::queue::Queue;
use crate::store::{DownloadRecord, DownloadStatus, Store};
use job::{CancelKind, Job};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct DownloadManager {
    store: Store,
    config: Config,
    queue: Queue,
    jobs: RwLock<HashMap<i64, Arc<Job>>>,
    events: broadcast::Sender<DownloadRecord>,
    client: reqwest::Client,
    /// Handle to the owning `Arc`, used to hand runner tasks a strong
    /// reference without keeping the manager alive from inside itself.
    self_handle: Weak<DownloadManager>,
}

impl DownloadManager {
    /// Build the engine: validate config, normalize rows stranded by a
    /// previous run, reload pending records into the queue, and spawn the
    /// background loops.
    pub async fn new(store: Store, config: Config) -> Result<Arc<Self>, Error> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(config.effective_user_agent())
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| Error::Validation(format!("http client: {}", e)))?;

        let interrupted = store.reset_interrupted().await?;
        if interrupted > 0 {
            tracing::info!(count = interrupted, "paused downloads interrupted by a previous run");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Arc::new_cyclic(|weak: &Weak<DownloadManager>| Self {
            store,
            config,
            queue: Queue::new(),
            jobs: RwLock::new(HashMap::new()),
            events,
            client,
            self_handle: weak.clone(),
        });
        manager.seed_queue().await?;
        manager.spawn_loops();
        Ok(manager)
    }

    /// Probe the origin, persist a new Pending record, and enqueue it.
    /// Fails on a malformed URL, an unusable directory, or a HEAD error.
    pub async fn add(&self, url: &str, path: impl AsRef<Path>) -> Result<DownloadRecord, Error> {
        let parsed = filename::validate_url(url)?;
        let dir = path.as_ref();
        ensure_dir(dir).map_err(|e| {
            Error::Validation(format!("download directory {}: {}", dir.display(), e))
        })?;

        let probed = probe::probe_origin(&self.client, url, self.config.timeout()).await?;
        let name = filename::derive_filename(&parsed, probed.content_disposition.as_deref());

        let mut record = DownloadRecord::new(url, dir, name);
        record.total_size = probed.content_length.unwrap_or(0);
        record.id = self.store.insert(&record).await?;

        self.queue.add(record.clone());
        self.emit(&record);
        tracing::info!(id = record.id, url, size = record.total_size, "download queued");
        Ok(record)
    }

    /// Launch a job for this record. Counters restart from zero; the
    /// transfer re-fetches the whole byte range (see DESIGN.md on resume).
    pub async fn start(&self, id: i64) -> Result<(), Error> {
        let mut record = self.store.get(id).await?.ok_or(Error::NotFound(id))?;
        record.downloaded = 0;
        record.speed = 0;
        record.progress = 0.0;

        let job = {
            let mut jobs = self.jobs.write().unwrap();
            if jobs.contains_key(&id) {
                return Err(Error::AlreadyRunning(id));
            }
            let job = Arc::new(Job::new(record, self.client.clone()));
            jobs.insert(id, Arc::clone(&job));
            job
        };
        // An explicit start must not leave a stale queue entry behind.
        self.queue.remove(id);

        // The upgrade only fails during teardown, when no caller is left
        // to observe the job.
        if let Some(manager) = self.self_handle.upgrade() {
            tokio::spawn(runner::execute(manager, job));
        } else {
            self.unregister(id);
        }
        Ok(())
    }

    /// Signal the live job to unwind and record the Paused state. The
    /// partial file stays on disk.
    pub async fn pause(&self, id: i64) -> Result<(), Error> {
        let job = self
            .jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))?;
        job.request_cancel(CancelKind::Pause);

        let bytes = job.bytes_downloaded();
        let record = job.update_record(|r| {
            r.status = DownloadStatus::Paused;
            r.speed = 0;
            r.downloaded = bytes;
        });
        {
            let _guard = job.persist_guard().await;
            self.store.update(&record).await?;
        }
        self.emit(&record);
        tracing::info!(id, downloaded = bytes, "download paused");
        Ok(())
    }

    /// Cancel the download whether or not it is live: signal the job if
    /// one exists, mark the record Cancelled, and unlink the partial file.
    pub async fn cancel(&self, id: i64) -> Result<(), Error> {
        if let Some(job) = self.jobs.read().unwrap().get(&id).cloned() {
            job.request_cancel(CancelKind::Cancel);
            job.update_record(|r| r.status = DownloadStatus::Cancelled);
        }
        self.queue.remove(id);

        let mut record = self.store.get(id).await?.ok_or(Error::NotFound(id))?;
        record.status = DownloadStatus::Cancelled;
        record.speed = 0;
        self.store.update(&record).await?;
        self.emit(&record);

        let target = record.target_path();
        if let Err(e) = tokio::fs::remove_file(&target).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(id, path = %target.display(), error = %e, "could not remove partial file");
            }
        }
        tracing::info!(id, "download cancelled");
        Ok(())
    }

    /// Drop the record entirely: cancel a live job, delete the row, and
    /// unlink a partial artifact. A completed artifact is left on disk.
    pub async fn remove(&self, id: i64) -> Result<(), Error> {
        if let Some(job) = self.jobs.read().unwrap().get(&id).cloned() {
            job.request_cancel(CancelKind::Cancel);
        }
        self.queue.remove(id);

        let record = self.store.get(id).await?.ok_or(Error::NotFound(id))?;
        if record.status != DownloadStatus::Completed {
            let _ = tokio::fs::remove_file(record.target_path()).await;
        }
        self.store.delete(id).await?;
        tracing::info!(id, "download removed");
        Ok(())
    }

    /// Every record ever added, newest first.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, Error> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<DownloadRecord, Error> {
        self.store.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// Event stream of whole-record snapshots, one per state change.
    /// A receiver that falls behind loses old events, never blocks the
    /// engine.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadRecord> {
        self.events.subscribe()
    }

    /// Callback-style subscription: `callback` runs on its own task for
    /// every event. Unordered, best-effort.
    pub fn subscribe_fn<F>(&self, callback: F)
    where
        F: Fn(DownloadRecord) + Send + 'static,
    {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(record) => callback(record),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of live jobs in the registry.
    pub fn active_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn emit(&self, record: &DownloadRecord) {
        let _ = self.events.send(record.clone());
    }

    pub(crate) fn unregister(&self, id: i64) {
        self.jobs.write().unwrap().remove(&id);
    }

    /// Pending rows from an earlier process re-enter the queue in creation
    /// order.
    async fn seed_queue(&self) -> Result<(), Error> {
        let mut records = self.store.list().await?;
        records.retain(|r| r.status == DownloadStatus::Pending);
        records.reverse();
        let n = records.len();
        for record in records {
            self.queue.add(record);
        }
        if n > 0 {
            tracing::info!(count = n, "requeued pending downloads");
        }
        Ok(())
    }

    fn spawn_loops(&self) {
        let weak = self.self_handle.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK_PERIOD);
            loop {
                tick.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                manager.admit_pending().await;
            }
        });

        let weak = self.self_handle.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK_PERIOD);
            loop {
                tick.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                manager.publish_stats().await;
            }
        });
    }

    /// Fill spare concurrency from the queue, oldest pending first.
    async fn admit_pending(&self) {
        while self.active_count() < self.config.max_concurrent_downloads {
            let Some(record) = self.queue.next() else { break };
            match self.start(record.id).await {
                Ok(()) => {}
                Err(Error::Store(e)) => {
                    // Transient store trouble: put the record back and let
                    // the next tick retry.
                    tracing::warn!(id = record.id, error = %e, "admission hit store error");
                    self.queue.add(record);
                    break;
                }
                Err(e) => {
                    tracing::warn!(id = record.id, error = %e, "admission skipped record");
                }
            }
        }
    }

    /// Refresh progress/speed for every live job, persist, and announce.
    async fn publish_stats(&self) {
        let jobs: Vec<Arc<Job>> = self.jobs.read().unwrap().values().cloned().collect();
        for job in jobs {
            let _guard = job.persist_guard().await;
            let Some(record) = job.stats_snapshot() else { continue };
            if let Err(e) = self.store.update(&record).await {
                tracing::warn!(id = record.id, error = %e, "stats persist failed; retrying next tick");
            }
            self.emit(&record);
        }
    }
}
