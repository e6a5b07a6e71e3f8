//! Single byte-range fetch: Range GET, paced reads, positional writes.

use super::{ByteRange, ChunkError, READ_BUF_SIZE};
use crate::limiter::RateLimiter;
use crate::output::OutputFile;
use crate::retry::RetryPolicy;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::RANGE;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// One parallel fetcher: exclusively owns `range` within the shared output
/// file. `downloaded` counts bytes written by this chunk in the current
/// attempt.
pub struct ChunkFetcher {
    pub range: ByteRange,
    downloaded: AtomicU64,
    output: OutputFile,
}

impl ChunkFetcher {
    pub fn new(range: ByteRange, output: OutputFile) -> Self {
        Self {
            range,
            downloaded: AtomicU64::new(0),
            output,
        }
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }
}

/// Fetch the range, retrying network errors per `retry`. Before each retry
/// the chunk's partial bytes are deducted from the job-wide counter so the
/// aggregate never counts a byte twice.
pub(super) async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    fetcher: &ChunkFetcher,
    job_downloaded: &AtomicU64,
    cancel: &CancellationToken,
    share_bps: u64,
    retry: &RetryPolicy,
) -> Result<(), ChunkError> {
    let mut attempt = 0u32;
    loop {
        match fetch_range(client, url, fetcher, job_downloaded, cancel, share_bps).await {
            Ok(()) => return Ok(()),
            Err(ChunkError::Network(msg)) => {
                let Some(delay) = retry.delay_for(attempt) else {
                    return Err(ChunkError::Network(msg));
                };
                let partial = fetcher.downloaded.swap(0, Ordering::Relaxed);
                job_downloaded.fetch_sub(partial, Ordering::Relaxed);
                attempt += 1;
                tracing::warn!(
                    range = %fetcher.range.header_value(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "retrying chunk after network error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// One attempt at the full range. Reads are sized to the bytes still owed
/// so a misbehaving origin can never overrun the neighbouring range.
async fn fetch_range(
    client: &reqwest::Client,
    url: &str,
    fetcher: &ChunkFetcher,
    job_downloaded: &AtomicU64,
    cancel: &CancellationToken,
    share_bps: u64,
) -> Result<(), ChunkError> {
    let response = client
        .get(url)
        .header(RANGE, fetcher.range.header_value())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ChunkError::Network(format!("GET {}: {}", fetcher.range.header_value(), e)))?;

    let stream = response.bytes_stream().map_err(io::Error::other).boxed();
    let mut reader = StreamReader::new(stream);
    let mut limiter = (share_bps > 0).then(|| RateLimiter::new(share_bps));

    let expected = fetcher.range.len();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut local = 0u64;

    while local < expected {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        let want = buf.len().min((expected - local) as usize);
        let n = tokio::select! {
            _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
            read = reader.read(&mut buf[..want]) => {
                read.map_err(|e| ChunkError::Network(format!("read: {}", e)))?
            }
        };
        if n == 0 {
            break;
        }

        fetcher
            .output
            .write_at(fetcher.range.start + local, &buf[..n])
            .map_err(ChunkError::Write)?;
        local += n as u64;
        fetcher.downloaded.fetch_add(n as u64, Ordering::Relaxed);
        job_downloaded.fetch_add(n as u64, Ordering::Relaxed);

        if let Some(lim) = limiter.as_mut() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
                _ = lim.throttle(n) => {}
            }
        }
    }

    if local != expected {
        return Err(ChunkError::Network(format!(
            "range {} returned {} of {} bytes",
            fetcher.range.header_value(),
            local,
            expected
        )));
    }
    Ok(())
}
