//! Logging init: file under the XDG state dir, or stderr.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

enum LogWriter {
    File(fs::File),
    Stderr,
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File(f) => f.write(buf),
            LogWriter::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File(f) => f.flush(),
            LogWriter::Stderr => io::stderr().lock().flush(),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,idm_core=debug"))
}

/// Initialize structured logging to `~/.local/state/idm/idm.log`.
/// Returns Err when the log file cannot be opened so the caller can fall
/// back to `init_stderr`.
pub fn init() -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("idm")?;
    let log_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&log_dir)?;
    let log_path: PathBuf = log_dir.join("idm.log");

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(move || {
            file.try_clone()
                .map(LogWriter::File)
                .unwrap_or(LogWriter::Stderr)
        })
        .with_ansi(false)
        .init();

    tracing::info!("logging initialized at {}", log_path.display());
    Ok(())
}

/// Initialize logging to stderr only. Use when `init` fails.
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
