//! Knowledge-link repository: back-pointers into the semantic store.

use turso::params;

use super::{Db, row_text};
use crate::error::{Error, Result};
use crate::types::KnowledgeLinkRecord;

/// Register a link row; a row with the same composite id is left untouched
/// (idempotent). Returns whether a row was inserted.
pub async fn add(
    db: &Db,
    source_id: &str,
    version_id: &str,
    knowledge_document_id: &str,
) -> Result<bool> {
    let id = KnowledgeLinkRecord::row_id(source_id, version_id, knowledge_document_id);
    let conn = db.connect()?;

    let mut existing = conn
        .query(
            "SELECT 1 FROM kb_knowledge_links WHERE id = ?",
            params![id.clone()],
        )
        .await
        .map_err(Error::Database)?;
    if existing.next().await.map_err(Error::Database)?.is_some() {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO kb_knowledge_links (id, source_id, version_id, knowledge_document_id) \
         VALUES (?, ?, ?, ?)",
        params![id, source_id, version_id, knowledge_document_id],
    )
    .await
    .map_err(|e| super::map_insert_error(e, "knowledge link"))?;
    Ok(true)
}

/// Every link row for a source.
pub async fn list_by_source(db: &Db, source_id: &str) -> Result<Vec<KnowledgeLinkRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT id, source_id, version_id, knowledge_document_id \
             FROM kb_knowledge_links WHERE source_id = ? ORDER BY id",
            params![source_id],
        )
        .await
        .map_err(Error::Database)?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().await.map_err(Error::Database)? {
        records.push(KnowledgeLinkRecord {
            id: row_text(&row, 0)?,
            source_id: row_text(&row, 1)?,
            version_id: row_text(&row, 2)?,
            knowledge_document_id: row_text(&row, 3)?,
        });
    }
    Ok(records)
}

/// Remove every link for a source (after the sink handles are deleted).
pub async fn delete_by_source(db: &Db, source_id: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_knowledge_links WHERE source_id = ?",
        params![source_id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}
