//! Persistent records and policy types for the mirror.
//!
//! These are the rows the stores read and write: sources, versions,
//! documents, knowledge links, cached previews, sync-log entries, and the
//! per-agent size/refresh policies. Field names serialize in camelCase so
//! JSON columns and action payloads stay readable by external tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::Profile;

/// Floor for [`SizePolicy::auto_ingest_below_bytes`] (50 MiB).
pub const MIN_AUTO_INGEST_BYTES: u64 = 50 * 1024 * 1024;

/// Default for [`SizePolicy::max_bytes_hard_limit`] (1 GiB).
pub const DEFAULT_HARD_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

/// One configured upstream URL that expands into many documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    /// Stable source id (caller-chosen or derived from the URL).
    pub id: String,
    /// The root URL this source mirrors.
    pub source_url: String,
    /// Disabled sources are skipped by the scheduler.
    pub enabled: bool,
    /// When false, the sync service never re-reconciles this source.
    pub version_tracking_enabled: bool,
    /// Static content is ingested once and never swept for staleness.
    pub is_static_content: bool,
    /// Opaque metadata blob supplied at registration, passed through to
    /// the semantic sink.
    pub static_metadata: Option<serde_json::Value>,
    /// Completion time of the most recent reconcile, if any.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Next scheduled sync, maintained by the scheduler.
    pub next_sync_at: Option<DateTime<Utc>>,
}

impl SourceRecord {
    /// A freshly registered source with tracking enabled.
    #[must_use]
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            enabled: true,
            version_tracking_enabled: true,
            is_static_content: false,
            static_metadata: None,
            last_sync_at: None,
            next_sync_at: None,
        }
    }
}

/// Lifecycle state of a version snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// Created, ingest loop in progress.
    Staging,
    /// The one live snapshot for its source.
    Active,
    /// Superseded by a newer active version, awaiting GC.
    Archived,
    /// Ingest loop failed; kept for inspection.
    Failed,
}

impl VersionStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Self::Staging),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown version status '{other}'")),
        }
    }
}

/// A snapshot label for a source, identified by the deterministic hash of
/// its preview. At most one version per source is `active` at any commit
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Row id: `{sourceId}:{versionId}`.
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// 64-char lowercase hex hash of the preview.
    pub version_id: String,
    /// Lifecycle state.
    pub status: VersionStatus,
    /// When the staging row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the version became active.
    pub activated_at: Option<DateTime<Utc>>,
    /// When the version failed.
    pub failed_at: Option<DateTime<Utc>>,
    /// User-facing reason for the failure.
    pub failure_reason: Option<String>,
}

impl VersionRecord {
    /// Compose the row id for a `(source, version)` pair.
    #[must_use]
    pub fn row_id(source_id: &str, version_id: &str) -> String {
        format!("{source_id}:{version_id}")
    }
}

/// A stored document: the exact text bytes plus the precomputed profile.
/// The content is the source of truth for every quote operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Row id (UUID v4).
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// Version the document was ingested under.
    pub version_id: String,
    /// URL this row is keyed by (original or raw form).
    pub url: String,
    /// Full extracted text.
    pub content: String,
    /// Lowercase hex SHA-256 of `content`.
    pub content_hash: String,
    /// Response content type, when the server sent one.
    pub mime_type: Option<String>,
    /// `content.len()` in bytes.
    pub byte_size: Option<u64>,
    /// Structural profile computed at ingest time.
    pub profile: Option<Profile>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

/// Back-pointer into the semantic store. Deleted before anything else when
/// a source is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeLinkRecord {
    /// Row id: `{sourceId}:{versionId}:{handle}`.
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// Version the link was created under.
    pub version_id: String,
    /// Opaque handle issued by the semantic sink.
    pub knowledge_document_id: String,
}

impl KnowledgeLinkRecord {
    /// Compose the row id for a `(source, version, handle)` triple.
    #[must_use]
    pub fn row_id(source_id: &str, version_id: &str, handle: &str) -> String {
        format!("{source_id}:{version_id}:{handle}")
    }
}

/// Cheap probe result for one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreview {
    /// Absolute URL of the file.
    pub url: String,
    /// Pathname-derived identifier within the source.
    pub path: String,
    /// Size estimate from headers; 0 when the probe failed.
    pub est_bytes: u64,
    /// Server content type; `"unknown"` when the probe failed.
    pub content_type: String,
    /// `ETag` header, when present.
    pub etag: Option<String>,
    /// `Last-Modified` header, when present.
    pub last_modified: Option<String>,
}

/// Probe results for every file a source expands into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePreview {
    /// Source the preview belongs to.
    pub source_id: String,
    /// Sum of `est_bytes` over `files`.
    pub total_bytes: u64,
    /// One entry per discovered file, failures included.
    pub files: Vec<FilePreview>,
}

/// Single-row-per-source cache of the last probe result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewCacheEntry {
    /// Source the cached preview belongs to.
    pub source_id: String,
    /// The cached preview.
    pub preview: SourcePreview,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

/// Per-agent size gating policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizePolicy {
    /// When true, probe even when a cached preview is fresh.
    pub preview_always: bool,
    /// Sources above this need an existing active version to auto-ingest.
    pub auto_ingest_below_bytes: u64,
    /// Sources above this are never ingested.
    pub max_bytes_hard_limit: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            preview_always: false,
            auto_ingest_below_bytes: MIN_AUTO_INGEST_BYTES,
            max_bytes_hard_limit: DEFAULT_HARD_LIMIT_BYTES,
        }
    }
}

impl SizePolicy {
    /// Enforce the documented floor on the auto-ingest threshold.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.auto_ingest_below_bytes = self.auto_ingest_below_bytes.max(MIN_AUTO_INGEST_BYTES);
        self
    }
}

/// Per-agent reconcile cadence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPolicy {
    /// How long a cached preview stays usable.
    pub preview_cache_ttl_ms: u64,
    /// Minimum gap between scheduler-driven reconciles of one source.
    pub reconcile_cooldown_ms: u64,
    /// Bound on concurrent reconciles across sources.
    pub max_concurrent_reconciles: u32,
    /// Deadline for the startup staleness sweep.
    pub startup_reconcile_timeout_ms: u64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            preview_cache_ttl_ms: 300_000,
            reconcile_cooldown_ms: 60_000,
            max_concurrent_reconciles: 1,
            startup_reconcile_timeout_ms: 120_000,
        }
    }
}

/// Outcome state of one scheduled sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLogStatus {
    /// The run is in flight.
    Running,
    /// The run finished; per-source failures are in `errors`.
    Completed,
    /// The run itself died.
    Failed,
}

impl SyncLogStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SyncLogStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync log status '{other}'")),
        }
    }
}

/// One row per scheduled sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    /// Row id (UUID v4).
    pub id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Run state.
    pub status: SyncLogStatus,
    /// Sources examined.
    pub sources_checked: u32,
    /// Sources that produced a new active version.
    pub sources_updated: u32,
    /// Sources skipped (disabled, cooldown, size gate, up to date).
    pub sources_skipped: u32,
    /// Per-source failure messages.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_status_round_trips() {
        for status in [
            VersionStatus::Staging,
            VersionStatus::Active,
            VersionStatus::Archived,
            VersionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<VersionStatus>(), Ok(status));
        }
        assert!("live".parse::<VersionStatus>().is_err());
    }

    #[test]
    fn row_ids_compose() {
        assert_eq!(VersionRecord::row_id("src", "abc"), "src:abc");
        assert_eq!(
            KnowledgeLinkRecord::row_id("src", "abc", "h1"),
            "src:abc:h1"
        );
    }

    #[test]
    fn size_policy_clamps_floor() {
        let policy = SizePolicy {
            preview_always: false,
            auto_ingest_below_bytes: 1024,
            max_bytes_hard_limit: DEFAULT_HARD_LIMIT_BYTES,
        }
        .clamped();
        assert_eq!(policy.auto_ingest_below_bytes, MIN_AUTO_INGEST_BYTES);
    }

    #[test]
    fn refresh_policy_defaults() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.max_concurrent_reconciles, 1);
        assert_eq!(policy.preview_cache_ttl_ms, 300_000);
    }
}
