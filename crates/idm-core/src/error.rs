//! Engine error kinds and propagation boundaries.
//!
//! `Validation`, `NotFound`, and `AlreadyRunning` return to the caller and do
//! not mutate state. Transfer errors become the terminal `Failed` state of a
//! job; `Cancelled` is cooperative and never surfaces as a failure.

use std::fmt;

/// Error returned by engine operations.
#[derive(Debug)]
pub enum Error {
    /// Bad URL, bad config value, or unusable download directory.
    Validation(String),
    /// No record with this id, or no live job where one was required.
    NotFound(i64),
    /// `start` was called for a download that already has a live job.
    AlreadyRunning(i64),
    /// HEAD/GET/connect/read failure.
    Network(String),
    /// Filesystem write or allocation failure.
    Write(std::io::Error),
    /// Persistent store failure.
    Store(sqlx::Error),
    /// Cooperative cancellation (pause or cancel), not a failure.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "validation: {}", msg),
            Error::NotFound(id) => write!(f, "download {} not found", id),
            Error::AlreadyRunning(id) => write!(f, "download {} is already running", id),
            Error::Network(msg) => write!(f, "network: {}", msg),
            Error::Write(e) => write!(f, "write: {}", e),
            Error::Store(e) => write!(f, "store: {}", e),
            Error::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Write(e) => Some(e),
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}
