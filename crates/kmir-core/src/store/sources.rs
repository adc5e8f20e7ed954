//! Source repository.

use chrono::{DateTime, Utc};
use turso::params;

use super::{
    Db, encode_ts, decode_opt_ts, row_bool, row_opt_text, row_text,
};
use crate::error::{Error, Result};
use crate::types::SourceRecord;

const SELECT_COLUMNS: &str = "id, source_url, enabled, version_tracking_enabled, \
     is_static_content, static_metadata, last_sync_at, next_sync_at";

/// Insert or replace the full source row.
pub async fn upsert(db: &Db, record: &SourceRecord) -> Result<()> {
    let conn = db.connect()?;
    let metadata = record
        .static_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    // Portable replace: delete then insert.
    conn.execute("DELETE FROM kb_sources WHERE id = ?", params![record.id.clone()])
        .await
        .map_err(Error::Database)?;
    conn.execute(
        "INSERT INTO kb_sources (id, source_url, enabled, version_tracking_enabled, \
         is_static_content, static_metadata, last_sync_at, next_sync_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.id.clone(),
            record.source_url.clone(),
            record.enabled,
            record.version_tracking_enabled,
            record.is_static_content,
            metadata,
            record.last_sync_at.map(encode_ts),
            record.next_sync_at.map(encode_ts)
        ],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Insert the row only when no source with this id exists yet; returns the
/// stored record either way.
pub async fn ensure(db: &Db, record: &SourceRecord) -> Result<SourceRecord> {
    if let Some(existing) = get(db, &record.id).await? {
        return Ok(existing);
    }
    upsert(db, record).await?;
    Ok(record.clone())
}

/// Fetch one source by id.
pub async fn get(db: &Db, id: &str) -> Result<Option<SourceRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!("SELECT {SELECT_COLUMNS} FROM kb_sources WHERE id = ?"),
            params![id],
        )
        .await
        .map_err(Error::Database)?;

    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(from_row(&row)?)),
        None => Ok(None),
    }
}

/// All sources, ordered by id.
pub async fn list(db: &Db) -> Result<Vec<SourceRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!("SELECT {SELECT_COLUMNS} FROM kb_sources ORDER BY id"),
            (),
        )
        .await
        .map_err(Error::Database)?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().await.map_err(Error::Database)? {
        records.push(from_row(&row)?);
    }
    Ok(records)
}

/// Flip version tracking for a source.
pub async fn set_version_tracking(db: &Db, id: &str, enabled: bool) -> Result<()> {
    let conn = db.connect()?;
    let changed = conn
        .execute(
            "UPDATE kb_sources SET version_tracking_enabled = ? WHERE id = ?",
            params![enabled, id],
        )
        .await
        .map_err(Error::Database)?;
    if changed == 0 {
        return Err(Error::NotFound(format!("source '{id}'")));
    }
    Ok(())
}

/// Record the completion time of a reconcile.
pub async fn set_last_sync(db: &Db, id: &str, at: DateTime<Utc>) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "UPDATE kb_sources SET last_sync_at = ? WHERE id = ?",
        params![encode_ts(at), id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Record when the scheduler will next visit the source.
pub async fn set_next_sync(db: &Db, id: &str, at: Option<DateTime<Utc>>) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "UPDATE kb_sources SET next_sync_at = ? WHERE id = ?",
        params![at.map(encode_ts), id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Delete the source row itself (dependents are removed first by the
/// caller, in cascade order).
pub async fn delete(db: &Db, id: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute("DELETE FROM kb_sources WHERE id = ?", params![id])
        .await
        .map_err(Error::Database)?;
    Ok(())
}

fn from_row(row: &turso::Row) -> Result<SourceRecord> {
    let metadata = row_opt_text(row, 5)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;
    Ok(SourceRecord {
        id: row_text(row, 0)?,
        source_url: row_text(row, 1)?,
        enabled: row_bool(row, 2)?,
        version_tracking_enabled: row_bool(row, 3)?,
        is_static_content: row_bool(row, 4)?,
        static_metadata: metadata,
        last_sync_at: decode_opt_ts(row_opt_text(row, 6)?)?,
        next_sync_at: decode_opt_ts(row_opt_text(row, 7)?)?,
    })
}
