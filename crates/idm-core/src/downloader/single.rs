//! Single-stream GET fallback for origins without range support.

use super::{ChunkError, READ_BUF_SIZE};
use crate::limiter::RateLimiter;
use crate::output::OutputFile;
use futures_util::{StreamExt, TryStreamExt};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Stream the whole body sequentially into `output`, starting at offset 0.
/// Completes on end-of-stream regardless of any advertised length (an
/// origin that reports no `Content-Length` still downloads fine). Returns
/// the number of bytes written.
pub async fn download_single(
    client: &reqwest::Client,
    url: &str,
    output: &OutputFile,
    job_downloaded: &AtomicU64,
    cancel: &CancellationToken,
    max_speed: u64,
) -> Result<u64, ChunkError> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ChunkError::Network(format!("GET {}: {}", url, e)))?;

    let stream = response.bytes_stream().map_err(io::Error::other).boxed();
    let mut reader = StreamReader::new(stream);
    let mut limiter = (max_speed > 0).then(|| RateLimiter::new(max_speed));

    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut offset = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        let n = tokio::select! {
            _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
            read = reader.read(&mut buf) => {
                read.map_err(|e| ChunkError::Network(format!("read: {}", e)))?
            }
        };
        if n == 0 {
            break;
        }

        output.write_at(offset, &buf[..n]).map_err(ChunkError::Write)?;
        offset += n as u64;
        job_downloaded.fetch_add(n as u64, Ordering::Relaxed);

        if let Some(lim) = limiter.as_mut() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
                _ = lim.throttle(n) => {}
            }
        }
    }

    Ok(offset)
}
