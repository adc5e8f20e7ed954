//! Per-agent policy settings, stored as JSON blobs keyed by agent id.

use turso::params;

use super::{Db, row_text};
use crate::error::{Error, Result};
use crate::types::{RefreshPolicy, SizePolicy};

/// The size policy for an agent, defaulting when absent.
pub async fn get_size_policy(db: &Db, agent_id: &str) -> Result<SizePolicy> {
    match get_blob(db, "kb_size_policies", agent_id).await? {
        Some(raw) => Ok(serde_json::from_str::<SizePolicy>(&raw)?.clamped()),
        None => Ok(SizePolicy::default()),
    }
}

/// Upsert the size policy for an agent; the auto-ingest floor is enforced
/// before persisting.
pub async fn set_size_policy(db: &Db, agent_id: &str, policy: SizePolicy) -> Result<SizePolicy> {
    let clamped = policy.clamped();
    put_blob(db, "kb_size_policies", agent_id, &serde_json::to_string(&clamped)?).await?;
    Ok(clamped)
}

/// The refresh policy for an agent, defaulting when absent.
pub async fn get_refresh_policy(db: &Db, agent_id: &str) -> Result<RefreshPolicy> {
    match get_blob(db, "kb_refresh_policies", agent_id).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(RefreshPolicy::default()),
    }
}

/// Upsert the refresh policy for an agent.
pub async fn set_refresh_policy(db: &Db, agent_id: &str, policy: RefreshPolicy) -> Result<()> {
    put_blob(db, "kb_refresh_policies", agent_id, &serde_json::to_string(&policy)?).await
}

async fn get_blob(db: &Db, table: &str, agent_id: &str) -> Result<Option<String>> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            &format!("SELECT policy FROM {table} WHERE agent_id = ?"),
            params![agent_id],
        )
        .await
        .map_err(Error::Database)?;
    match rows.next().await.map_err(Error::Database)? {
        Some(row) => Ok(Some(row_text(&row, 0)?)),
        None => Ok(None),
    }
}

async fn put_blob(db: &Db, table: &str, agent_id: &str, blob: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        &format!("DELETE FROM {table} WHERE agent_id = ?"),
        params![agent_id],
    )
    .await
    .map_err(Error::Database)?;
    conn.execute(
        &format!("INSERT INTO {table} (agent_id, policy) VALUES (?, ?)"),
        params![agent_id, blob],
    )
    .await
    .map_err(Error::Database)?;
    Ok(())
}
