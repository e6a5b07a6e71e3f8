//! Transfer-layer tests: ranged fan-out against the local range server.

mod common;

use common::range_server::{self, RangeServerOptions};
use idm_core::downloader::{self, ByteRange, ChunkFetcher};
use idm_core::output::OutputFile;
use idm_core::retry::RetryPolicy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 157) as u8).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ranged_fetch_fills_file_and_counters_agree() {
    let body = patterned(64 * 1024);
    let (base, stats) = range_server::start_with_options(body.clone(), RangeServerOptions::default());
    let url = format!("{}blob.bin", base);

    let dir = tempdir().unwrap();
    let target = dir.path().join("blob.bin");
    let output = OutputFile::create(&target, body.len() as u64).unwrap();

    let fetchers: Vec<Arc<ChunkFetcher>> = downloader::plan_ranges(body.len() as u64, 4)
        .into_iter()
        .map(|range| Arc::new(ChunkFetcher::new(range, output.clone())))
        .collect();
    let job_downloaded = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let client = reqwest::Client::new();
    downloader::run_ranged(
        &client,
        &url,
        &fetchers,
        &job_downloaded,
        &cancel,
        0,
        &RetryPolicy::default(),
    )
    .await
    .expect("ranged download");

    let on_disk = std::fs::read(&target).unwrap();
    assert_eq!(on_disk, body);

    // The job-wide counter is exactly the sum of the per-chunk counters.
    let chunk_sum: u64 = fetchers.iter().map(|f| f.bytes_downloaded()).sum();
    assert_eq!(chunk_sum, job_downloaded.load(Ordering::Relaxed));
    assert_eq!(chunk_sum, body.len() as u64);
    assert_eq!(stats.range_requests.load(Ordering::Relaxed), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_range_response_is_a_network_error() {
    // Ask for more bytes than the origin has; the clamped 206 ends early
    // and the chunk must report a violated range contract.
    let body = patterned(2048);
    let (base, _) = range_server::start_with_options(body, RangeServerOptions::default());
    let url = format!("{}short.bin", base);

    let dir = tempdir().unwrap();
    let target = dir.path().join("short.bin");
    let output = OutputFile::create(&target, 4096).unwrap();

    let fetchers = vec![Arc::new(ChunkFetcher::new(
        ByteRange { start: 0, end: 4095 },
        output,
    ))];
    let job_downloaded = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let client = reqwest::Client::new();
    let err = downloader::run_ranged(
        &client,
        &url,
        &fetchers,
        &job_downloaded,
        &cancel,
        0,
        &RetryPolicy::with_retries(0),
    )
    .await
    .expect_err("short body must fail the range contract");

    assert!(
        matches!(err, downloader::ChunkError::Network(_)),
        "got {:?}",
        err
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_token_stops_fetchers_with_cancelled() {
    let body = patterned(64 * 1024);
    let (base, _) = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            piece_size: Some(4 * 1024),
            piece_delay: std::time::Duration::from_millis(50),
            ..Default::default()
        },
    );
    let url = format!("{}slow.bin", base);

    let dir = tempdir().unwrap();
    let target = dir.path().join("slow.bin");
    let output = OutputFile::create(&target, body.len() as u64).unwrap();

    let fetchers: Vec<Arc<ChunkFetcher>> = downloader::plan_ranges(body.len() as u64, 2)
        .into_iter()
        .map(|range| Arc::new(ChunkFetcher::new(range, output.clone())))
        .collect();
    let job_downloaded = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let client = reqwest::Client::new();
    let err = downloader::run_ranged(
        &client,
        &url,
        &fetchers,
        &job_downloaded,
        &cancel,
        0,
        &RetryPolicy::default(),
    )
    .await
    .expect_err("cancellation must surface");
    assert!(matches!(err, downloader::ChunkError::Cancelled));
}
