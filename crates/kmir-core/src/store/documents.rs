//! Document repository: the verbatim store.

use turso::params;

use super::{
    Db, decode_ts, encode_ts, map_insert_error, row_opt_i64, row_opt_text, row_text,
};
use crate::error::{Error, Result};
use crate::types::DocumentRecord;

const SELECT_COLUMNS: &str = "id, source_id, version_id, url, content, content_hash, \
     mime_type, byte_size, profile, created_at";

/// Insert one document row. A duplicate `(source, version, url)` surfaces
/// as [`Error::Conflict`]; the raw-URL copy path swallows it.
pub async fn insert(db: &Db, record: &DocumentRecord) -> Result<()> {
    let conn = db.connect()?;
    let profile = record
        .profile
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO kb_documents (id, source_id, version_id, url, content, content_hash, \
         mime_type, byte_size, profile, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.id.clone(),
            record.source_id.clone(),
            record.version_id.clone(),
            record.url.clone(),
            record.content.clone(),
            record.content_hash.clone(),
            record.mime_type.clone(),
            record.byte_size.map(|b| b as i64),
            profile,
            encode_ts(record.created_at)
        ],
    )
    .await
    .map_err(|e| map_insert_error(e, "document row"))?;
    Ok(())
}

/// Primary lookup: newest document row stored under `url`.
pub async fn get_by_url(db: &Db, url: &str) -> Result<Option<DocumentRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM kb_documents \
                 WHERE url = ? ORDER BY created_at DESC"
            ),
            params![url],
        )
        .await
        .map_err(Error::Database)?;
    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(from_row(&row)?)),
        None => Ok(None),
    }
}

/// Documents under one `(source, version)` pair.
pub async fn list_by_source_version(
    db: &Db,
    source_id: &str,
    version_id: &str,
) -> Result<Vec<DocumentRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM kb_documents \
                 WHERE source_id = ? AND version_id = ? ORDER BY url"
            ),
            params![source_id, version_id],
        )
        .await
        .map_err(Error::Database)?;
    collect(&mut rows).await
}

/// Documents for a source (all versions), or every document when no
/// source filter is given.
pub async fn list(db: &Db, source_id: Option<&str>) -> Result<Vec<DocumentRecord>> {
    let conn = db.connect()?;
    let mut rows = match source_id {
        Some(source_id) => conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM kb_documents \
                     WHERE source_id = ? ORDER BY url"
                ),
                params![source_id],
            )
            .await
            .map_err(Error::Database)?,
        None => conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM kb_documents ORDER BY url"),
                (),
            )
            .await
            .map_err(Error::Database)?,
    };
    collect(&mut rows).await
}

/// Remove every row keyed by `url`. Returns the number removed.
pub async fn delete_by_url(db: &Db, url: &str) -> Result<u64> {
    let conn = db.connect()?;
    conn.execute("DELETE FROM kb_documents WHERE url = ?", params![url])
        .await
        .map_err(Error::Database)
}

/// Remove the documents of one `(source, version)` pair (archived-version
/// GC path).
pub async fn delete_by_source_version(db: &Db, source_id: &str, version_id: &str) -> Result<u64> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_documents WHERE source_id = ? AND version_id = ?",
        params![source_id, version_id],
    )
    .await
    .map_err(Error::Database)
}

/// Remove every document belonging to a source (source removal path).
pub async fn delete_by_source(db: &Db, source_id: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_documents WHERE source_id = ?",
        params![source_id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

async fn collect(rows: &mut turso::Rows) -> Result<Vec<DocumentRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await.map_err(Error::Database)? {
        records.push(from_row(&row)?);
    }
    Ok(records)
}

fn from_row(row: &turso::Row) -> Result<DocumentRecord> {
    let profile = row_opt_text(row, 8)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;
    Ok(DocumentRecord {
        id: row_text(row, 0)?,
        source_id: row_text(row, 1)?,
        version_id: row_text(row, 2)?,
        url: row_text(row, 3)?,
        content: row_text(row, 4)?,
        content_hash: row_text(row, 5)?,
        mime_type: row_opt_text(row, 6)?,
        byte_size: row_opt_i64(row, 7)?.map(|b| b as u64),
        profile,
        created_at: decode_ts(&row_text(row, 9)?)?,
    })
}
