//! Version repository: the staging → active → archived state machine rows.

use chrono::{DateTime, Utc};
use turso::params;

use super::{Db, decode_opt_ts, decode_ts, encode_ts, row_opt_text, row_text};
use crate::error::{Error, Result};
use crate::types::{VersionRecord, VersionStatus};

const SELECT_COLUMNS: &str =
    "id, source_id, version_id, status, created_at, activated_at, failed_at, failure_reason";

/// Insert a staging row for `(source, version)`; a row with the same id is
/// left untouched (idempotent). Returns whether a row was inserted.
pub async fn create_staging(
    db: &Db,
    source_id: &str,
    version_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let id = VersionRecord::row_id(source_id, version_id);
    if get(db, &id).await?.is_some() {
        return Ok(false);
    }

    let conn = db.connect()?;
    conn.execute(
        "INSERT INTO kb_versions (id, source_id, version_id, status, created_at) \
         VALUES (?, ?, ?, ?, ?)",
        params![
            id,
            source_id,
            version_id,
            VersionStatus::Staging.as_str(),
            encode_ts(now)
        ],
    )
    .await
    .map_err(|e| super::map_insert_error(e, "version row"))?;
    Ok(true)
}

/// Fetch one version row by id.
pub async fn get(db: &Db, id: &str) -> Result<Option<VersionRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!("SELECT {SELECT_COLUMNS} FROM kb_versions WHERE id = ?"),
            params![id],
        )
        .await
        .map_err(Error::Database)?;
    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(from_row(&row)?)),
        None => Ok(None),
    }
}

/// The at-most-one active version for a source.
pub async fn latest_active(db: &Db, source_id: &str) -> Result<Option<VersionRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM kb_versions \
                 WHERE source_id = ? AND status = ? ORDER BY created_at DESC"
            ),
            params![source_id, VersionStatus::Active.as_str()],
        )
        .await
        .map_err(Error::Database)?;
    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(from_row(&row)?)),
        None => Ok(None),
    }
}

/// All versions for a source, newest first.
pub async fn list_by_source(db: &Db, source_id: &str) -> Result<Vec<VersionRecord>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM kb_versions \
                 WHERE source_id = ? ORDER BY created_at DESC"
            ),
            params![source_id],
        )
        .await
        .map_err(Error::Database)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().await.map_err(Error::Database)? {
        records.push(from_row(&row)?);
    }
    Ok(records)
}

/// Promote a staging version: in one transaction, archive the current
/// active row (if any) and activate the staging row. Readers querying
/// "latest active" never observe zero or two active rows.
pub async fn promote(
    db: &Db,
    source_id: &str,
    version_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let id = VersionRecord::row_id(source_id, version_id);
    let conn = db.connect()?;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(Error::Database)?;

    let archive = conn
        .execute(
            "UPDATE kb_versions SET status = ? WHERE source_id = ? AND status = ? AND id != ?",
            params![
                VersionStatus::Archived.as_str(),
                source_id,
                VersionStatus::Active.as_str(),
                id.clone()
            ],
        )
        .await;
    let activate = match archive {
        Ok(_) => {
            conn.execute(
                "UPDATE kb_versions SET status = ?, activated_at = ? WHERE id = ?",
                params![VersionStatus::Active.as_str(), encode_ts(now), id.clone()],
            )
            .await
        },
        Err(e) => Err(e),
    };

    match activate {
        Ok(changed) if changed > 0 => {
            conn.execute("COMMIT", ()).await.map_err(Error::Database)?;
            Ok(())
        },
        Ok(_) => {
            conn.execute("ROLLBACK", ()).await.map_err(Error::Database)?;
            Err(Error::NotFound(format!("version '{id}'")))
        },
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(Error::Database(e))
        },
    }
}

/// Mark a staging version failed with a user-facing reason.
pub async fn mark_failed(
    db: &Db,
    source_id: &str,
    version_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let id = VersionRecord::row_id(source_id, version_id);
    let conn = db.connect()?;
    conn.execute(
        "UPDATE kb_versions SET status = ?, failed_at = ?, failure_reason = ? WHERE id = ?",
        params![VersionStatus::Failed.as_str(), encode_ts(now), reason, id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Garbage-collect archived rows for a source. Returns the number removed.
pub async fn delete_archived_by_source(db: &Db, source_id: &str) -> Result<u64> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_versions WHERE source_id = ? AND status = ?",
        params![source_id, VersionStatus::Archived.as_str()],
    )
    .await
    .map_err(Error::Database)
}

/// Remove every version row for a source (source removal path).
pub async fn delete_by_source(db: &Db, source_id: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "DELETE FROM kb_versions WHERE source_id = ?",
        params![source_id],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}

fn from_row(row: &turso::Row) -> Result<VersionRecord> {
    let status: VersionStatus = row_text(row, 3)?
        .parse()
        .map_err(Error::Storage)?;
    Ok(VersionRecord {
        id: row_text(row, 0)?,
        source_id: row_text(row, 1)?,
        version_id: row_text(row, 2)?,
        status,
        created_at: decode_ts(&row_text(row, 4)?)?,
        activated_at: decode_opt_ts(row_opt_text(row, 5)?)?,
        failed_at: decode_opt_ts(row_opt_text(row, 6)?)?,
        failure_reason: row_opt_text(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sources;
    use crate::types::SourceRecord;

    async fn db_with_source() -> anyhow::Result<Db> {
        let db = Db::open_in_memory().await?;
        sources::upsert(&db, &SourceRecord::new("docs", "https://x/")).await?;
        Ok(db)
    }

    #[tokio::test]
    async fn staging_insert_is_idempotent() -> anyhow::Result<()> {
        let db = db_with_source().await?;
        let now = Utc::now();

        assert!(create_staging(&db, "docs", "aaaa", now).await?);
        assert!(!create_staging(&db, "docs", "aaaa", now).await?);

        let row = get(&db, "docs:aaaa").await?.unwrap();
        assert_eq!(row.status, VersionStatus::Staging);
        assert_eq!(row.version_id, "aaaa");
        Ok(())
    }

    #[tokio::test]
    async fn promote_keeps_exactly_one_active() -> anyhow::Result<()> {
        let db = db_with_source().await?;
        let t0 = Utc::now();

        create_staging(&db, "docs", "v1", t0).await?;
        promote(&db, "docs", "v1", t0).await?;

        create_staging(&db, "docs", "v2", t0 + chrono::Duration::seconds(1)).await?;
        promote(&db, "docs", "v2", t0 + chrono::Duration::seconds(2)).await?;

        let all = list_by_source(&db, "docs").await?;
        let active: Vec<_> = all
            .iter()
            .filter(|v| v.status == VersionStatus::Active)
            .collect();
        let archived: Vec<_> = all
            .iter()
            .filter(|v| v.status == VersionStatus::Archived)
            .collect();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version_id, "v2");
        assert!(active[0].activated_at.is_some());
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].version_id, "v1");
        Ok(())
    }

    #[tokio::test]
    async fn promote_missing_staging_rolls_back() -> anyhow::Result<()> {
        let db = db_with_source().await?;
        let now = Utc::now();

        create_staging(&db, "docs", "v1", now).await?;
        promote(&db, "docs", "v1", now).await?;

        let result = promote(&db, "docs", "ghost", now).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        // The failed promote must not have archived the active row.
        let active = latest_active(&db, "docs").await?.unwrap();
        assert_eq!(active.version_id, "v1");
        Ok(())
    }

    #[tokio::test]
    async fn mark_failed_records_the_reason() -> anyhow::Result<()> {
        let db = db_with_source().await?;
        let now = Utc::now();

        create_staging(&db, "docs", "v1", now).await?;
        mark_failed(&db, "docs", "v1", "all 3 documents failed", now).await?;

        let row = get(&db, "docs:v1").await?.unwrap();
        assert_eq!(row.status, VersionStatus::Failed);
        assert_eq!(row.failure_reason.as_deref(), Some("all 3 documents failed"));
        assert!(row.failed_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn archived_gc_removes_only_archived() -> anyhow::Result<()> {
        let db = db_with_source().await?;
        let now = Utc::now();

        create_staging(&db, "docs", "v1", now).await?;
        promote(&db, "docs", "v1", now).await?;
        create_staging(&db, "docs", "v2", now).await?;
        promote(&db, "docs", "v2", now).await?;

        let removed = delete_archived_by_source(&db, "docs").await?;
        assert_eq!(removed, 1);

        let remaining = list_by_source(&db, "docs").await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, VersionStatus::Active);
        Ok(())
    }
}
