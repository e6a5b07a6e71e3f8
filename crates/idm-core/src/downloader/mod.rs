//! Transfer engine: range planning, parallel chunk fetching, and the
//! single-stream fallback.
//!
//! A ranged transfer partitions `[0, total_size - 1]` into contiguous
//! inclusive ranges, spawns one fetcher task per range, and joins them.
//! The first chunk error wins; the remaining fetchers unwind through a
//! shared fan-out token. Cancellation of the parent job token always
//! surfaces as `ChunkError::Cancelled`, never as a failure.

mod chunk;
mod single;

pub use chunk::ChunkFetcher;
pub use single::download_single;

use crate::retry::RetryPolicy;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Read buffer for transfer loops.
pub(crate) const READ_BUF_SIZE: usize = 32 * 1024;

/// Error from one chunk (or the single-stream loop), classified for retry.
#[derive(Debug)]
pub enum ChunkError {
    /// Connect/read failure, non-success status, or a violated range
    /// contract. Retryable.
    Network(String),
    /// Local file I/O failure. Not retried.
    Write(std::io::Error),
    /// Cooperative cancellation. Not a failure.
    Cancelled,
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Network(msg) => write!(f, "{}", msg),
            ChunkError::Write(e) => write!(f, "write failed: {}", e),
            ChunkError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChunkError> for crate::error::Error {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::Network(msg) => crate::error::Error::Network(msg),
            ChunkError::Write(e) => crate::error::Error::Write(e),
            ChunkError::Cancelled => crate::error::Error::Cancelled,
        }
    }
}

/// A contiguous inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` header value: `bytes=start-end`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Partition `[0, total_size - 1]` into `chunks` contiguous ranges. The
/// last range absorbs the division remainder. `chunks` is capped at
/// `total_size` so no range is empty.
pub fn plan_ranges(total_size: u64, chunks: u32) -> Vec<ByteRange> {
    if total_size == 0 || chunks == 0 {
        return Vec::new();
    }
    let chunks = (chunks as u64).min(total_size);
    let base = total_size / chunks;

    (0..chunks)
        .map(|i| {
            let start = i * base;
            let end = if i == chunks - 1 {
                total_size - 1
            } else {
                start + base - 1
            };
            ByteRange { start, end }
        })
        .collect()
}

/// Run every fetcher to completion.
///
/// `job_downloaded` is the job-wide byte counter shared with the stats
/// loop. `share_bps` is the per-chunk bandwidth share (0 = unlimited).
/// Each fetcher retries network errors per `retry`; the first
/// non-cancellation error becomes the job outcome and cancels the rest.
pub async fn run_ranged(
    client: &reqwest::Client,
    url: &str,
    fetchers: &[Arc<ChunkFetcher>],
    job_downloaded: &Arc<AtomicU64>,
    cancel: &CancellationToken,
    share_bps: u64,
    retry: &RetryPolicy,
) -> Result<(), ChunkError> {
    let fan = cancel.child_token();
    let mut set = JoinSet::new();

    for fetcher in fetchers {
        let client = client.clone();
        let url = url.to_string();
        let fetcher = Arc::clone(fetcher);
        let counter = Arc::clone(job_downloaded);
        let token = fan.child_token();
        let retry = *retry;
        set.spawn(async move {
            chunk::fetch_with_retry(&client, &url, &fetcher, &counter, &token, share_bps, &retry)
                .await
        });
    }

    let mut first_err: Option<ChunkError> = None;
    while let Some(joined) = set.join_next().await {
        let result = joined
            .unwrap_or_else(|e| Err(ChunkError::Network(format!("chunk task failed: {}", e))));
        if let Err(e) = result {
            if matches!(e, ChunkError::Cancelled) {
                continue;
            }
            if first_err.is_none() {
                // First error wins; siblings unwind via the fan-out token.
                fan.cancel();
                first_err = Some(e);
            }
        }
    }

    // A pause/cancel of the whole job outranks any error a dying
    // connection produced on the way down.
    if cancel.is_cancelled() {
        return Err(ChunkError::Cancelled);
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
