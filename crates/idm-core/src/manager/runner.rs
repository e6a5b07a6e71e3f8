//! Runs one download to its terminal state.
//!
//! Pipeline: mark Downloading → probe range support → pick ranged or
//! single-stream mode → transfer → persist and announce the terminal
//! state. Cancellation results in Paused or Cancelled, never Failed.

use super::job::{CancelKind, Job};
use super::DownloadManager;
use crate::downloader::{self, ChunkFetcher};
use crate::error::Error;
use crate::output::{ensure_dir, OutputFile};
use crate::probe;
use crate::retry::RetryPolicy;
use crate::store::db::now_utc;
use crate::store::DownloadStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(super) async fn execute(manager: Arc<DownloadManager>, job: Arc<Job>) {
    let outcome = transfer(&manager, &job).await;
    finalize(&manager, &job, outcome).await;
    manager.unregister(job.id);
}

async fn transfer(manager: &DownloadManager, job: &Job) -> Result<(), Error> {
    let config = manager.config();

    let record = job.update_record(|r| {
        r.status = DownloadStatus::Downloading;
        r.started_at = Some(now_utc());
        r.downloaded = 0;
        r.speed = 0;
        r.progress = 0.0;
        r.error = None;
    });
    // A store failure here aborts the job; admission must not run blind.
    manager.store().update(&record).await?;
    manager.emit(&record);

    let ranged = match probe::probe_origin(&job.client, &record.url, config.timeout()).await {
        Ok(p) => p.accept_ranges,
        Err(e) => {
            tracing::debug!(id = record.id, error = %e, "probe failed, using single stream");
            false
        }
    };

    ensure_dir(&record.path).map_err(Error::Write)?;
    let target = record.target_path();
    let cancel = job.token();

    if ranged && record.total_size > config.chunk_size_threshold {
        let chunk_count = record.effective_chunks();
        let output = OutputFile::create(&target, record.total_size).map_err(Error::Write)?;
        let fetchers: Vec<Arc<ChunkFetcher>> =
            downloader::plan_ranges(record.total_size, chunk_count)
                .into_iter()
                .map(|range| Arc::new(ChunkFetcher::new(range, output.clone())))
                .collect();
        job.set_fetchers(fetchers.clone());

        let share = if config.max_speed > 0 {
            (config.max_speed / chunk_count as u64).max(1)
        } else {
            0
        };
        let retry = RetryPolicy::with_retries(config.retry_attempts);
        tracing::debug!(
            id = record.id,
            chunks = fetchers.len(),
            total = record.total_size,
            "starting ranged transfer"
        );
        downloader::run_ranged(
            &job.client,
            &record.url,
            &fetchers,
            &job.downloaded,
            &cancel,
            share,
            &retry,
        )
        .await?;
    } else {
        tracing::debug!(id = record.id, "starting single-stream transfer");
        let output = OutputFile::create(&target, 0).map_err(Error::Write)?;
        downloader::download_single(
            &job.client,
            &record.url,
            &output,
            &job.downloaded,
            &cancel,
            config.max_speed,
        )
        .await?;
    }
    Ok(())
}

async fn finalize(manager: &DownloadManager, job: &Job, outcome: Result<(), Error>) {
    let bytes = job.downloaded.load(Ordering::Relaxed);
    let record = job.update_record(|r| {
        r.downloaded = bytes;
        r.speed = 0;
        match &outcome {
            Ok(()) => {
                r.status = DownloadStatus::Completed;
                r.progress = 100.0;
                r.completed_at = Some(now_utc());
                r.error = None;
            }
            Err(Error::Cancelled) => {
                r.status = match job.cancel_kind() {
                    Some(CancelKind::Cancel) => DownloadStatus::Cancelled,
                    _ => DownloadStatus::Paused,
                };
            }
            Err(e) => {
                r.status = DownloadStatus::Failed;
                r.error = Some(e.to_string());
            }
        }
        if r.status != DownloadStatus::Completed && r.total_size > 0 {
            r.progress = (r.downloaded as f64 / r.total_size as f64 * 100.0).min(99.9);
        }
    });

    // Cancel discards the partial artifact; pause and failure keep it.
    if record.status == DownloadStatus::Cancelled {
        let target = record.target_path();
        if let Err(e) = tokio::fs::remove_file(&target).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(id = record.id, error = %e, "could not remove cancelled file");
            }
        }
    }

    tracing::debug!(
        id = record.id,
        status = %record.status,
        downloaded = record.downloaded,
        chunk_bytes = job.chunk_bytes_sum(),
        "download finished"
    );

    {
        let _guard = job.persist_guard().await;
        if let Err(e) = manager.store().update(&record).await {
            tracing::error!(id = record.id, error = %e, "failed to persist terminal state");
        }
    }
    manager.emit(&record);
}
