//! Download record and status types.

use super::db;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default number of parallel ranges for a new download.
pub const DEFAULT_CHUNKS: u32 = 4;

/// Hard bounds on the per-download parallel range count.
pub const MIN_CHUNKS: u32 = 1;
pub const MAX_CHUNKS: u32 = 16;

/// Lifecycle state of a download.
///
/// Persisted as a small integer; the mapping is part of the external state
/// format and must not change: Pending=0, Downloading=1, Paused=2,
/// Completed=3, Failed=4, Cancelled=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            DownloadStatus::Pending => 0,
            DownloadStatus::Downloading => 1,
            DownloadStatus::Paused => 2,
            DownloadStatus::Completed => 3,
            DownloadStatus::Failed => 4,
            DownloadStatus::Cancelled => 5,
        }
    }

    /// Unknown values decode as `Failed` so a corrupted row is visible
    /// rather than silently runnable.
    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => DownloadStatus::Pending,
            1 => DownloadStatus::Downloading,
            2 => DownloadStatus::Paused,
            3 => DownloadStatus::Completed,
            5 => DownloadStatus::Cancelled,
            _ => DownloadStatus::Failed,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Pending => "Pending",
            DownloadStatus::Downloading => "Downloading",
            DownloadStatus::Paused => "Paused",
            DownloadStatus::Completed => "Completed",
            DownloadStatus::Failed => "Failed",
            DownloadStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// The durable identity of a download. Events carry whole-record snapshots
/// of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Assigned by the store on insert; unique and never reused.
    pub id: i64,
    pub url: String,
    /// Basename of the local artifact.
    pub filename: String,
    /// Directory holding the artifact.
    pub path: PathBuf,
    /// Byte length reported by the origin, 0 when unknown.
    pub total_size: u64,
    /// Bytes written to disk.
    pub downloaded: u64,
    pub status: DownloadStatus,
    /// Most recent observed bytes/sec; 0 when not downloading.
    pub speed: u64,
    /// Derived percentage in [0, 100]. 100.0 only when Completed.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last terminal error message.
    pub error: Option<String>,
    /// Desired parallel range count, clamped to [MIN_CHUNKS, MAX_CHUNKS].
    pub chunks: u32,
}

impl DownloadRecord {
    /// A fresh Pending record, not yet persisted (`id == 0`).
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            filename: filename.into(),
            path: path.into(),
            total_size: 0,
            downloaded: 0,
            status: DownloadStatus::Pending,
            speed: 0,
            progress: 0.0,
            created_at: db::now_utc(),
            started_at: None,
            completed_at: None,
            error: None,
            chunks: DEFAULT_CHUNKS,
        }
    }

    /// Full path of the local artifact.
    pub fn target_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }

    /// The parallel range count actually used for a transfer.
    pub fn effective_chunks(&self) -> u32 {
        self.chunks.clamp(MIN_CHUNKS, MAX_CHUNKS)
    }
}
