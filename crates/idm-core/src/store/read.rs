//! Read operations: get by id and full listing.

use super::db::Store;
use super::record::{DownloadRecord, DownloadStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

const COLUMNS: &str = "id, url, filename, path, total_size, downloaded, status, speed, \
                       progress, created_at, started_at, completed_at, error, chunks";

impl Store {
    /// Fetch a single record, or `None` when the id is unknown.
    pub async fn get(&self, id: i64) -> Result<Option<DownloadRecord>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM downloads WHERE id = ?1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Every record ever added, newest first.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM downloads ORDER BY created_at DESC, id DESC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn record_from_row(row: &SqliteRow) -> Result<DownloadRecord, sqlx::Error> {
    let path: String = row.try_get("path")?;
    let created_at: String = row.try_get("created_at")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(DownloadRecord {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        filename: row.try_get("filename")?,
        path: PathBuf::from(path),
        total_size: row.try_get::<i64, _>("total_size")?.max(0) as u64,
        downloaded: row.try_get::<i64, _>("downloaded")?.max(0) as u64,
        status: DownloadStatus::from_i64(row.try_get("status")?),
        speed: row.try_get::<i64, _>("speed")?.max(0) as u64,
        progress: row.try_get("progress")?,
        created_at: parse_ts(&created_at)?,
        started_at: started_at.as_deref().map(parse_ts).transpose()?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        error: row.try_get("error")?,
        chunks: row.try_get::<i64, _>("chunks")?.clamp(1, 16) as u32,
    })
}
