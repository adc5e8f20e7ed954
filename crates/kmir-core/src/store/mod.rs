//! Durable state behind the mirror.
//!
//! [`Db`] wraps a turso database (file-backed or in-memory) and applies the
//! schema idempotently at startup. Repositories are thin namespaces — free
//! functions over `&Db` with no owned state — so the only state that
//! matters is the transactional database behind them. All mutation happens
//! through short-lived connections.

pub mod documents;
pub mod links;
pub mod policies;
pub mod preview_cache;
pub mod schema;
pub mod sources;
pub mod sync_log;
pub mod versions;

use chrono::{DateTime, Utc};
use turso::{Connection, Database, Value};

use crate::error::{Error, Result};

/// Handle to the mirror's relational store.
///
/// Cloning shares the underlying database; connections are cheap and
/// opened per operation.
#[derive(Clone)]
pub struct Db {
    db: Database,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    /// Open (or create) the database at `path`; `":memory:"` gives an
    /// isolated in-memory store. WAL mode is enabled for file databases.
    pub async fn open(path: &str) -> Result<Self> {
        let db = turso::Builder::new_local(path)
            .build()
            .await
            .map_err(Error::Database)?;

        let conn = db.connect().map_err(Error::Database)?;
        conn.query("PRAGMA journal_mode=WAL;", ())
            .await
            .map_err(Error::Database)?;

        Ok(Self { db })
    }

    /// Open an isolated in-memory store and apply the schema (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Self::open(":memory:").await?;
        db.init_schema().await?;
        Ok(db)
    }

    /// Apply every DDL statement; safe to call on each startup.
    pub async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        for statement in schema::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await.map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Open a connection for one operation.
    pub(crate) fn connect(&self) -> Result<Connection> {
        self.db.connect().map_err(Error::Database)
    }
}

/// Map a turso error to [`Error::Conflict`] when it is a unique-constraint
/// violation, otherwise pass it through as a database error.
pub(crate) fn map_insert_error(err: turso::Error, what: &str) -> Error {
    let message = err.to_string();
    if message.to_ascii_uppercase().contains("UNIQUE") {
        Error::Conflict(format!("duplicate {what}"))
    } else {
        Error::Database(err)
    }
}

// Row extraction helpers shared by the repositories. turso rows come back
// as loosely typed values; these enforce the expected column shapes.

pub(crate) fn row_text(row: &turso::Row, idx: usize) -> Result<String> {
    match row.get_value(idx).map_err(Error::Database)? {
        Value::Text(s) => Ok(s),
        other => Err(Error::Storage(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn row_opt_text(row: &turso::Row, idx: usize) -> Result<Option<String>> {
    match row.get_value(idx).map_err(Error::Database)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(Error::Storage(format!(
            "expected text or null in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn row_i64(row: &turso::Row, idx: usize) -> Result<i64> {
    match row.get_value(idx).map_err(Error::Database)? {
        Value::Integer(i) => Ok(i),
        other => Err(Error::Storage(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn row_opt_i64(row: &turso::Row, idx: usize) -> Result<Option<i64>> {
    match row.get_value(idx).map_err(Error::Database)? {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        other => Err(Error::Storage(format!(
            "expected integer or null in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn row_bool(row: &turso::Row, idx: usize) -> Result<bool> {
    Ok(row_i64(row, idx)? != 0)
}

/// RFC 3339 encoding used for every stored timestamp.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad stored timestamp '{raw}': {e}")))
}

pub(crate) fn decode_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_applies_idempotently() -> anyhow::Result<()> {
        let db = Db::open_in_memory().await?;
        // Second application must be a no-op, not an error.
        db.init_schema().await?;

        let conn = db.connect()?;
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name LIKE 'kb_%' ORDER BY name",
                (),
            )
            .await?;
        let mut tables = Vec::new();
        while let Some(row) = rows.next().await? {
            tables.push(row_text(&row, 0)?);
        }
        assert!(tables.contains(&"kb_sources".to_string()));
        assert!(tables.contains(&"kb_versions".to_string()));
        assert!(tables.contains(&"kb_documents".to_string()));
        assert!(tables.contains(&"kb_knowledge_links".to_string()));
        assert!(tables.contains(&"kb_preview_cache".to_string()));
        assert!(tables.contains(&"kb_sync_log".to_string()));
        Ok(())
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let decoded = decode_ts(&encode_ts(now)).unwrap();
        assert_eq!(decoded.timestamp_micros(), now.timestamp_micros());
    }
}
