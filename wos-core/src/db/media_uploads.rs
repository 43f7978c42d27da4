//! Batch upload session rows

use sqlx::{Row, SqlitePool};
use wos_common::db::{MediaUpload, MediaUploadStatus};
use wos_common::{Error, Result};

/// Create an Enabled session row
pub async fn insert_session(pool: &SqlitePool, session_id: &str, path: &str) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO media_uploads (session_id, path, status)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(path)
    .bind(MediaUploadStatus::Enabled.as_i64())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_session(pool: &SqlitePool, session_id: &str) -> Result<Option<MediaUpload>> {
    let row = sqlx::query(
        r#"
        SELECT id, session_id, path, status, metadata
        FROM media_uploads
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status_value: i64 = row.try_get("status")?;
    let status = MediaUploadStatus::from_i64(status_value)
        .ok_or_else(|| Error::Internal(format!("unknown media upload status {}", status_value)))?;

    let metadata_json: Option<String> = row.try_get("metadata")?;
    let metadata = metadata_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| Error::Internal(format!("corrupt session metadata: {}", e)))?;

    Ok(Some(MediaUpload {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        path: row.try_get("path")?,
        status,
        metadata,
    }))
}

/// Update a session's status; returns false when no row matched
pub async fn set_status(
    pool: &SqlitePool,
    session_id: &str,
    status: MediaUploadStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE media_uploads
        SET status = ?, updated_at = CURRENT_TIMESTAMP
        WHERE session_id = ?
        "#,
    )
    .bind(status.as_i64())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
