//! Write operations: insert, update, delete, interrupted-run recovery.

use super::db::Store;
use super::record::{DownloadRecord, DownloadStatus};

impl Store {
    /// Insert a new record and return its assigned id.
    ///
    /// Persists everything except the nullable timestamps and the error
    /// message, which only exist after a run.
    pub async fn insert(&self, record: &DownloadRecord) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO downloads (
                url, filename, path, total_size, downloaded,
                status, speed, progress, created_at, chunks
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&record.url)
        .bind(&record.filename)
        .bind(record.path.to_string_lossy().as_ref())
        .bind(record.total_size as i64)
        .bind(record.downloaded as i64)
        .bind(record.status.as_i64())
        .bind(record.speed as i64)
        .bind(record.progress)
        .bind(record.created_at.to_rfc3339())
        .bind(record.effective_chunks() as i64)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Overwrite the mutable fields of an existing row. Last writer wins;
    /// rows are never partially updated.
    pub async fn update(&self, record: &DownloadRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE downloads
            SET downloaded = ?1,
                status = ?2,
                speed = ?3,
                progress = ?4,
                started_at = ?5,
                completed_at = ?6,
                error = ?7
            WHERE id = ?8
            "#,
        )
        .bind(record.downloaded as i64)
        .bind(record.status.as_i64())
        .bind(record.speed as i64)
        .bind(record.progress)
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(&record.error)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a row. The file on disk is untouched; cleanup is the
    /// manager's concern.
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM downloads WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Normalize rows stranded in `Downloading` by a previous process to
    /// `Paused` (the partial file is still on disk). Returns the number of
    /// rows changed. Call once before scheduling anything.
    pub async fn reset_interrupted(&self) -> Result<u64, sqlx::Error> {
        let r = sqlx::query("UPDATE downloads SET status = ?1, speed = 0 WHERE status = ?2")
            .bind(DownloadStatus::Paused.as_i64())
            .bind(DownloadStatus::Downloading.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}
