//! Command-line interface over the download engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idm_core::config;
use idm_core::manager::DownloadManager;
use idm_core::store::{DownloadStatus, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level CLI for the idm download manager.
#[derive(Debug, Parser)]
#[command(name = "idm")]
#[command(about = "idm: multi-connection download manager", long_about = None)]
pub struct Cli {
    /// Path of the download database (default: ./idm.db).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a new download to the queue.
    Add {
        /// Direct HTTP/HTTPS/FTP URL.
        url: String,

        /// Directory to download into (default: current directory).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run queued downloads until everything is terminal (Ctrl-C to stop).
    Run,

    /// Start one download by id and wait for it to finish.
    Start {
        id: i64,
    },

    /// Pause a running download (only affects jobs in this process).
    Pause {
        id: i64,
    },

    /// Cancel a download and remove its partial file.
    Cancel {
        id: i64,
    },

    /// Delete a download record (and its partial file, if any).
    Remove {
        id: i64,
    },

    /// Show all downloads.
    Status,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let store = match &cli.db {
            Some(path) => Store::open_at(path).await,
            None => Store::open_default().await,
        }
        .context("opening download database")?;
        let manager = DownloadManager::new(store, cfg).await?;

        match cli.command {
            CliCommand::Add { url, dir } => {
                let dir = match dir {
                    Some(d) => d,
                    None => std::env::current_dir()?,
                };
                let record = manager.add(&url, &dir).await?;
                println!(
                    "Added download {} -> {}",
                    record.id,
                    record.target_path().display()
                );
            }
            CliCommand::Run => {
                run_until_drained(&manager).await?;
            }
            CliCommand::Start { id } => {
                // The admission loop may have picked the record up already;
                // either way we wait for the outcome.
                match manager.start(id).await {
                    Ok(()) | Err(idm_core::error::Error::AlreadyRunning(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                wait_terminal(&manager, id).await?;
            }
            CliCommand::Pause { id } => {
                manager.pause(id).await?;
                println!("Paused download {}", id);
            }
            CliCommand::Cancel { id } => {
                manager.cancel(id).await?;
                println!("Cancelled download {}", id);
            }
            CliCommand::Remove { id } => {
                manager.remove(id).await?;
                println!("Removed download {}", id);
            }
            CliCommand::Status => {
                print_status(&manager).await?;
            }
        }

        Ok(())
    }
}

/// Drive the queue until every record is terminal, printing progress events.
async fn run_until_drained(manager: &Arc<DownloadManager>) -> Result<()> {
    manager.subscribe_fn(|record| {
        if record.status == DownloadStatus::Downloading {
            println!(
                "[{}] {} {:5.1}% ({}/s)",
                record.id,
                record.filename,
                record.progress,
                human_bytes(record.speed)
            );
        } else {
            println!("[{}] {} -> {}", record.id, record.filename, record.status);
        }
    });

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted; run `idm run` again to continue");
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        let records = manager.list().await?;
        let busy = records.iter().any(|r| {
            matches!(
                r.status,
                DownloadStatus::Pending | DownloadStatus::Downloading
            )
        });
        if !busy && manager.active_count() == 0 {
            println!("Nothing left to do.");
            return Ok(());
        }
    }
}

/// Block until the record reaches a terminal state.
async fn wait_terminal(manager: &Arc<DownloadManager>, id: i64) -> Result<()> {
    loop {
        let record = manager.get(id).await?;
        match record.status {
            DownloadStatus::Completed => {
                println!("Completed {} ({} bytes)", record.filename, record.downloaded);
                return Ok(());
            }
            DownloadStatus::Failed => {
                anyhow::bail!(
                    "download {} failed: {}",
                    id,
                    record.error.as_deref().unwrap_or("unknown error")
                );
            }
            DownloadStatus::Paused | DownloadStatus::Cancelled => {
                println!("Download {} is {}", id, record.status);
                return Ok(());
            }
            _ => tokio::time::sleep(Duration::from_millis(500)).await,
        }
    }
}

async fn print_status(manager: &Arc<DownloadManager>) -> Result<()> {
    let records = manager.list().await?;
    if records.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:>8} {:>10} {}",
        "ID", "STATUS", "PROG", "SIZE", "FILE"
    );
    for r in records {
        let size = if r.total_size > 0 {
            human_bytes(r.total_size)
        } else {
            "?".to_string()
        };
        println!(
            "{:<6} {:<12} {:>7.1}% {:>10} {}",
            r.id,
            r.status.to_string(),
            r.progress,
            size,
            r.filename
        );
    }
    Ok(())
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", n, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
