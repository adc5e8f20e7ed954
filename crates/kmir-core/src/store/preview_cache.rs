//! Preview-cache repository: one row per source.
//!
//! The read-compute-write cycle around this cache is deliberately not
//! atomic; a racing reader may observe a slightly stale preview, which the
//! next reconcile corrects.

use chrono::{DateTime, Utc};
use turso::params;

use super::{Db, decode_ts, encode_ts, row_text};
use crate::error::{Error, Result};
use crate::types::{PreviewCacheEntry, SourcePreview};

/// Read the cached preview for a source.
pub async fn get(db: &Db, source_id: &str) -> Result<Option<PreviewCacheEntry>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT source_id, preview, checked_at FROM kb_preview_cache WHERE source_id = ?",
            params![source_id],
        )
        .await
        .map_err(Error::Database)?;

    match rows.next().await.map_err(Error::Database)? {
        Some(row) => {
            let preview: SourcePreview = serde_json::from_str(&row_text(&row, 1)?)?;
            Ok(Some(PreviewCacheEntry {
                source_id: row_text(&row, 0)?,
                preview,
                checked_at: decode_ts(&row_text(&row, 2)?)?,
            }))
        },
        None => Ok(None),
    }
}

/// Replace the cached preview for a source.
pub async fn put(db: &Db, preview: &SourcePreview, checked_at: DateTime<Utc>) -> Result<()> {
    let conn = db.connect()?;
    let blob = serde_json::to_string(preview)?;

    conn.execute(
        "DELETE FROM kb_preview_cache WHERE source_id = ?",
        params![preview.source_id.clone()],
    )
    .await
    .map_err(Error::Database)?;
    conn.execute(
        "INSERT INTO kb_preview_cache (source_id, preview, checked_at) VALUES (?, ?, ?)",
        params![preview.source_id.clone(), blob, encode_ts(checked_at)],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Drop the cache row for a source.
pub async fn delete(db: &Db, source_id: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_preview_cache WHERE source_id = ?",
        params![source_id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilePreview;

    fn sample_preview() -> SourcePreview {
        SourcePreview {
            source_id: "docs".to_string(),
            total_bytes: 1234,
            files: vec![FilePreview {
                url: "https://x/a.md".to_string(),
                path: "a.md".to_string(),
                est_bytes: 1234,
                content_type: "text/markdown".to_string(),
                etag: Some("\"v1\"".to_string()),
                last_modified: None,
            }],
        }
    }

    #[tokio::test]
    async fn put_get_round_trip() -> anyhow::Result<()> {
        let db = Db::open_in_memory().await?;
        let checked_at = Utc::now();

        put(&db, &sample_preview(), checked_at).await?;
        let entry = get(&db, "docs").await?.unwrap();

        assert_eq!(entry.preview, sample_preview());
        assert_eq!(
            entry.checked_at.timestamp_micros(),
            checked_at.timestamp_micros()
        );
        Ok(())
    }

    #[tokio::test]
    async fn put_replaces_the_single_row() -> anyhow::Result<()> {
        let db = Db::open_in_memory().await?;
        put(&db, &sample_preview(), Utc::now()).await?;

        let mut updated = sample_preview();
        updated.total_bytes = 9999;
        put(&db, &updated, Utc::now()).await?;

        let entry = get(&db, "docs").await?.unwrap();
        assert_eq!(entry.preview.total_bytes, 9999);
        Ok(())
    }

    #[tokio::test]
    async fn missing_row_is_none() -> anyhow::Result<()> {
        let db = Db::open_in_memory().await?;
        assert!(get(&db, "ghost").await?.is_none());
        Ok(())
    }
}
