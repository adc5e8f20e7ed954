//! Reconciliation: bringing the mirror to the latest upstream version.
//!
//! [`Reconciler::verify_and_reconcile_one`] walks the §-by-§ pipeline:
//! ensure the source row, load policies, classify and enumerate, probe (or
//! reuse the cached preview), apply the size gate, hash the preview into a
//! version id, and — when an update is needed — drive the staging → active
//! → archived state machine around the ingest loop.
//!
//! Failures before the staging row exists propagate as errors; anything
//! after transitions the staging version to `failed` and comes back as a
//! `failed` outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::extract::ContentExtractor;
use crate::fetch::HttpClient;
use crate::ingest::{IngestDiagnostic, Ingestor};
use crate::probe::PreviewProbe;
use crate::sink::KnowledgeSink;
use crate::store::{Db, documents, links, policies, preview_cache, sources, versions};
use crate::types::{SourcePreview, SourceRecord, VersionStatus};
use crate::version::{compute_version_id, needs_update};

/// Outcome state of one reconcile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// A new version was ingested and activated.
    Reconciled,
    /// The active version already matches upstream.
    UpToDate,
    /// The size gate stopped the reconcile.
    SkippedSizeLimit,
    /// The staging version failed.
    Failed,
}

/// Result of one reconcile attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// What happened.
    pub status: ReconcileStatus,
    /// Version id involved, when one was resolved.
    pub version_id: Option<String>,
    /// Files the preview covered.
    pub file_count: usize,
    /// Preview size estimate.
    pub total_bytes: u64,
    /// User-facing failure or skip reason.
    pub error: Option<String>,
    /// Per-document events from the ingest loop.
    pub diagnostics: Vec<IngestDiagnostic>,
}

impl ReconcileOutcome {
    fn bare(status: ReconcileStatus) -> Self {
        Self {
            status,
            version_id: None,
            file_count: 0,
            total_bytes: 0,
            error: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Knobs for one reconcile call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Skip the cooldown guard (explicit refresh).
    pub bypass_cooldown: bool,
    /// Re-probe even when the cached preview is fresh.
    pub force_probe: bool,
}

/// Orchestrates discovery, probing, versioning and ingestion.
#[derive(Clone)]
pub struct Reconciler {
    db: Db,
    http: HttpClient,
    extractor: Arc<dyn ContentExtractor>,
    sink: Arc<dyn KnowledgeSink>,
    clock: Arc<dyn Clock>,
    agent_id: String,
}

impl Reconciler {
    /// Wire up a reconciler; every collaborator is injected.
    #[must_use]
    pub fn new(
        db: Db,
        http: HttpClient,
        extractor: Arc<dyn ContentExtractor>,
        sink: Arc<dyn KnowledgeSink>,
        clock: Arc<dyn Clock>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            http,
            extractor,
            sink,
            clock,
            agent_id: agent_id.into(),
        }
    }

    /// The store this reconciler works against.
    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    /// The agent id policies are keyed by.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Verify one source against upstream and reconcile if needed.
    #[instrument(skip_all, fields(source_id = %source.id))]
    pub async fn verify_and_reconcile_one(
        &self,
        source: &SourceRecord,
        options: ReconcileOptions,
    ) -> Result<ReconcileOutcome> {
        let source = sources::ensure(&self.db, source).await?;
        let refresh_policy = policies::get_refresh_policy(&self.db, &self.agent_id).await?;
        let size_policy = policies::get_size_policy(&self.db, &self.agent_id).await?;
        let now = self.clock.now();

        // Cooldown guard: scheduler-driven churn on one source collapses
        // into an early up-to-date answer.
        if !options.bypass_cooldown {
            if let Some(last) = source.last_sync_at {
                let cooldown = chrono::Duration::milliseconds(
                    i64::try_from(refresh_policy.reconcile_cooldown_ms).unwrap_or(i64::MAX),
                );
                if now - last <= cooldown {
                    debug!("within reconcile cooldown, skipping probe");
                    let active = versions::latest_active(&self.db, &source.id).await?;
                    let mut outcome = ReconcileOutcome::bare(ReconcileStatus::UpToDate);
                    outcome.version_id = active.map(|v| v.version_id);
                    return Ok(outcome);
                }
            }
        }

        let discovery = Discovery::for_root(&self.http, &source.source_url)?;

        // Preview: reuse the cached probe while it is fresh.
        let cached = preview_cache::get(&self.db, &source.id).await?;
        let ttl = chrono::Duration::milliseconds(
            i64::try_from(refresh_policy.preview_cache_ttl_ms).unwrap_or(i64::MAX),
        );
        let preview = match cached {
            Some(entry)
                if !options.force_probe
                    && !size_policy.preview_always
                    && now - entry.checked_at <= ttl =>
            {
                debug!("reusing cached preview");
                entry.preview
            },
            _ => {
                let files = discovery.list().await?;
                let preview = PreviewProbe::new(&self.http).probe(&source.id, &files).await;
                preview_cache::put(&self.db, &preview, now).await?;
                preview
            },
        };

        // Size gate.
        let active = versions::latest_active(&self.db, &source.id).await?;
        if preview.total_bytes > size_policy.max_bytes_hard_limit {
            info!(
                total_bytes = preview.total_bytes,
                limit = size_policy.max_bytes_hard_limit,
                "source exceeds hard size limit"
            );
            return Ok(skipped(&preview, "source exceeds the hard size limit"));
        }
        if preview.total_bytes > size_policy.auto_ingest_below_bytes && active.is_none() {
            info!(
                total_bytes = preview.total_bytes,
                threshold = size_policy.auto_ingest_below_bytes,
                "source requires confirmation to initialize"
            );
            return Ok(skipped(
                &preview,
                "source exceeds the auto-ingest threshold and requires confirmation to initialize",
            ));
        }

        // Versioning.
        let remote_version_id = compute_version_id(&preview.files);
        let local_version_id = active.as_ref().map(|v| v.version_id.as_str());
        if !needs_update(local_version_id, &remote_version_id) {
            debug!(version_id = %remote_version_id, "already up to date");
            sources::set_last_sync(&self.db, &source.id, now).await?;
            return Ok(ReconcileOutcome {
                status: ReconcileStatus::UpToDate,
                version_id: Some(remote_version_id),
                file_count: preview.files.len(),
                total_bytes: preview.total_bytes,
                error: None,
                diagnostics: Vec::new(),
            });
        }

        versions::create_staging(&self.db, &source.id, &remote_version_id, now).await?;

        // From here on, failures mark the staging version instead of
        // propagating.
        match self
            .ingest_and_promote(&source, &remote_version_id, &preview)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "reconcile failed, marking staging version");
                versions::mark_failed(
                    &self.db,
                    &source.id,
                    &remote_version_id,
                    &reason,
                    self.clock.now(),
                )
                .await?;
                Ok(ReconcileOutcome {
                    status: ReconcileStatus::Failed,
                    version_id: Some(remote_version_id),
                    file_count: preview.files.len(),
                    total_bytes: preview.total_bytes,
                    error: Some(reason),
                    diagnostics: Vec::new(),
                })
            },
        }
    }

    async fn ingest_and_promote(
        &self,
        source: &SourceRecord,
        version_id: &str,
        preview: &SourcePreview,
    ) -> Result<ReconcileOutcome> {
        let ingestor = Ingestor::new(
            &self.db,
            &self.http,
            self.extractor.as_ref(),
            self.sink.as_ref(),
            self.clock.as_ref(),
        );
        let report = ingestor.ingest_files(source, version_id, &preview.files).await;

        // A version whose ingest loop attempted documents and landed none
        // is a failure; an empty discovery list still commits empty.
        if report.attempted > 0 && report.succeeded == 0 {
            let reason = format!("all {} documents failed", report.attempted);
            versions::mark_failed(&self.db, &source.id, version_id, &reason, self.clock.now())
                .await?;
            return Ok(ReconcileOutcome {
                status: ReconcileStatus::Failed,
                version_id: Some(version_id.to_string()),
                file_count: preview.files.len(),
                total_bytes: preview.total_bytes,
                error: Some(reason),
                diagnostics: report.diagnostics,
            });
        }

        let now = self.clock.now();
        versions::promote(&self.db, &source.id, version_id, now).await?;
        sources::set_last_sync(&self.db, &source.id, now).await?;
        info!(
            version_id = %version_id,
            files = report.succeeded,
            "reconciled source to new active version"
        );

        Ok(ReconcileOutcome {
            status: ReconcileStatus::Reconciled,
            version_id: Some(version_id.to_string()),
            file_count: preview.files.len(),
            total_bytes: preview.total_bytes,
            error: None,
            diagnostics: report.diagnostics,
        })
    }

    /// Sequentially reconcile the given sources; the scheduler bounds
    /// concurrency across calls, not inside one.
    pub async fn verify_and_reconcile_all(
        &self,
        records: &[SourceRecord],
        options: ReconcileOptions,
    ) -> Vec<(String, Result<ReconcileOutcome>)> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            if !record.enabled {
                continue;
            }
            let outcome = self.verify_and_reconcile_one(record, options).await;
            results.push((record.id.clone(), outcome));
        }
        results
    }

    /// Remove a source and everything hanging off it, in cascade order:
    /// semantic-sink handles first, then link rows, verbatim rows, version
    /// rows, the preview cache, and finally the source row.
    #[instrument(skip_all, fields(source_id = %source_id))]
    pub async fn remove_source(&self, source_id: &str) -> Result<()> {
        let source = sources::get(&self.db, source_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("source '{source_id}'")))?;

        for link in links::list_by_source(&self.db, &source.id).await? {
            if let Err(err) = self.sink.remove(&link.knowledge_document_id).await {
                warn!(handle = %link.knowledge_document_id, error = %err, "sink removal failed");
            }
        }
        self.sink.remove_by_source(&source.id).await?;

        links::delete_by_source(&self.db, &source.id).await?;
        documents::delete_by_source(&self.db, &source.id).await?;
        versions::delete_by_source(&self.db, &source.id).await?;
        preview_cache::delete(&self.db, &source.id).await?;
        sources::delete(&self.db, &source.id).await?;
        info!("removed source");
        Ok(())
    }

    /// Garbage-collect archived versions for a source, documents included.
    pub async fn gc_archived(&self, source_id: &str) -> Result<u64> {
        let archived: Vec<String> = versions::list_by_source(&self.db, source_id)
            .await?
            .into_iter()
            .filter(|v| v.status == VersionStatus::Archived)
            .map(|v| v.version_id)
            .collect();

        for version_id in &archived {
            documents::delete_by_source_version(&self.db, source_id, version_id).await?;
        }
        versions::delete_archived_by_source(&self.db, source_id).await
    }
}

fn skipped(preview: &SourcePreview, message: &str) -> ReconcileOutcome {
    ReconcileOutcome {
        status: ReconcileStatus::SkippedSizeLimit,
        version_id: None,
        file_count: preview.files.len(),
        total_bytes: preview.total_bytes,
        error: Some(message.to_string()),
        diagnostics: Vec::new(),
    }
}
