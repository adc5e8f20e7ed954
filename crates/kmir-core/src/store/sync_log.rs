//! Sync-log repository: one row per scheduled sync run.

use chrono::{DateTime, Utc};
use turso::params;

use super::{Db, decode_opt_ts, decode_ts, encode_ts, row_i64, row_opt_text, row_text};
use crate::error::{Error, Result};
use crate::types::{SyncLogEntry, SyncLogStatus};

const SELECT_COLUMNS: &str = "id, started_at, finished_at, status, sources_checked, \
     sources_updated, sources_skipped, errors";

/// Open a `running` row at the start of a sync run; returns its id.
pub async fn start(db: &Db, started_at: DateTime<Utc>) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let conn = db.connect()?;
    conn.execute(
        "INSERT INTO kb_sync_log (id, started_at, status) VALUES (?, ?, ?)",
        params![id.clone(), encode_ts(started_at), SyncLogStatus::Running.as_str()],
    )
    .await
    .map_err(Error::Database)?;
    Ok(id)
}

/// Close a run with its final counters.
pub async fn finish(
    db: &Db,
    id: &str,
    status: SyncLogStatus,
    finished_at: DateTime<Utc>,
    checked: u32,
    updated: u32,
    skipped: u32,
    errors: &[String],
) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "UPDATE kb_sync_log SET status = ?, finished_at = ?, sources_checked = ?, \
         sources_updated = ?, sources_skipped = ?, errors = ? WHERE id = ?",
        params![
            status.as_str(),
            encode_ts(finished_at),
            i64::from(checked),
            i64::from(updated),
            i64::from(skipped),
            serde_json::to_string(errors)?,
            id
        ],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Fetch one run by id.
pub async fn get(db: &Db, id: &str) -> Result<Option<SyncLogEntry>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!("SELECT {SELECT_COLUMNS} FROM kb_sync_log WHERE id = ?"),
            params![id],
        )
        .await
        .map_err(Error::Database)?;
    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(from_row(&row)?)),
        None => Ok(None),
    }
}

/// Most recent runs, newest first.
pub async fn recent(db: &Db, limit: u32) -> Result<Vec<SyncLogEntry>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM kb_sync_log \
                 ORDER BY started_at DESC LIMIT {limit}"
            ),
            (),
        )
        .await
        .map_err(Error::Database)?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next().await.map_err(Error::Database)? {
        entries.push(from_row(&row)?);
    }
    Ok(entries)
}

fn from_row(row: &turso::Row) -> Result<SyncLogEntry> {
    let status: SyncLogStatus = row_text(row, 3)?.parse().map_err(Error::Storage)?;
    let errors: Vec<String> = serde_json::from_str(&row_text(row, 7)?)?;
    Ok(SyncLogEntry {
        id: row_text(row, 0)?,
        started_at: decode_ts(&row_text(row, 1)?)?,
        finished_at: decode_opt_ts(row_opt_text(row, 2)?)?,
        status,
        sources_checked: row_i64(row, 4)? as u32,
        sources_updated: row_i64(row, 5)? as u32,
        sources_skipped: row_i64(row, 6)? as u32,
        errors,
    })
}
