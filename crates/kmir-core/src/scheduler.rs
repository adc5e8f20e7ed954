//! Scheduled synchronization.
//!
//! Runs the reconciler on a cron cadence (evaluated in the configured
//! timezone) and performs a staleness sweep at process start. Every run
//! writes a sync-log row: `running` at start, final counters at the end.
//! Archived versions are garbage-collected after each source sync.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::reconcile::{ReconcileOptions, ReconcileStatus, Reconciler};
use crate::store::{policies, sources, sync_log};
use crate::types::{SourceRecord, SyncLogStatus};

/// Cron-driven sync loop plus the startup staleness sweep.
pub struct ScheduledSyncService {
    reconciler: Reconciler,
    settings: Settings,
    schedule: Schedule,
    timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl ScheduledSyncService {
    /// Build the service; fails on an unparsable cron expression.
    pub fn new(
        reconciler: Reconciler,
        settings: Settings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let schedule = parse_cron(&settings.sync_cron)?;
        let timezone = settings.sync_timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = %settings.sync_timezone, "unknown timezone, falling back to UTC");
            Tz::UTC
        });
        Ok(Self {
            reconciler,
            settings,
            schedule,
            timezone,
            clock,
        })
    }

    /// Next scheduled fire time after `now`.
    #[must_use]
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Startup staleness sweep: re-sync every enabled, tracked, non-static
    /// source whose last sync is older than the staleness threshold. The
    /// sweep is bounded by `startupReconcileTimeoutMs`; on expiry the
    /// in-flight work is cancelled and the cron cadence takes over.
    #[instrument(skip_all)]
    pub async fn run_startup_sweep(&self) -> Result<()> {
        let now = self.clock.now();
        let staleness = chrono::Duration::hours(i64::from(self.settings.staleness_hours));
        let stale: Vec<SourceRecord> = sources::list(self.reconciler.db())
            .await?
            .into_iter()
            .filter(|s| is_sweep_candidate(s, now, staleness))
            .collect();

        if stale.is_empty() {
            debug!("no stale sources at startup");
            return Ok(());
        }
        info!(count = stale.len(), "startup staleness sweep");

        let policy =
            policies::get_refresh_policy(self.reconciler.db(), self.reconciler.agent_id()).await?;
        let budget = Duration::from_millis(policy.startup_reconcile_timeout_ms);

        match tokio::time::timeout(budget, self.sync_sources(stale)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => {
                warn!(
                    timeout_ms = policy.startup_reconcile_timeout_ms,
                    "startup sweep hit its deadline; remaining sources wait for the next cycle"
                );
                Ok(())
            },
        }
    }

    /// One full sync cycle over every eligible source. Returns the sync-log
    /// row id.
    #[instrument(skip_all)]
    pub async fn run_sync_cycle(&self) -> Result<String> {
        let targets: Vec<SourceRecord> = sources::list(self.reconciler.db())
            .await?
            .into_iter()
            .filter(|s| s.enabled && s.version_tracking_enabled && !s.is_static_content)
            .collect();
        self.sync_sources(targets).await
    }

    async fn sync_sources(&self, targets: Vec<SourceRecord>) -> Result<String> {
        let db = self.reconciler.db().clone();
        let started_at = self.clock.now();
        let log_id = sync_log::start(&db, started_at).await?;

        let policy = policies::get_refresh_policy(&db, self.reconciler.agent_id()).await?;
        let concurrency = policy.max_concurrent_reconciles.max(1) as usize;
        let checked = targets.len() as u32;

        let results: Vec<(String, Result<ReconcileStatus>)> = stream::iter(targets)
            .map(|source| {
                let svc = self.reconciler.clone();
                async move {
                    let outcome = svc
                        .verify_and_reconcile_one(&source, ReconcileOptions::default())
                        .await;
                    if let Err(err) = svc.gc_archived(&source.id).await {
                        warn!(source_id = %source.id, error = %err, "archived GC failed");
                    }
                    (source.id, outcome.map(|o| o.status))
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut updated = 0u32;
        let mut skipped = 0u32;
        let mut errors = Vec::new();
        for (source_id, result) in results {
            match result {
                Ok(ReconcileStatus::Reconciled) => updated += 1,
                Ok(ReconcileStatus::UpToDate | ReconcileStatus::SkippedSizeLimit) => skipped += 1,
                Ok(ReconcileStatus::Failed) => {
                    errors.push(format!("{source_id}: staging version failed"));
                },
                Err(err) => errors.push(format!("{source_id}: {err}")),
            }
        }

        let finished_at = self.clock.now();
        let status = if errors.len() as u32 == checked && checked > 0 {
            SyncLogStatus::Failed
        } else {
            SyncLogStatus::Completed
        };
        sync_log::finish(
            &db, &log_id, status, finished_at, checked, updated, skipped, &errors,
        )
        .await?;

        // Advertise the next visit on each source row.
        if let Some(next) = self.next_run_after(finished_at) {
            for source in sources::list(&db).await? {
                if source.enabled && source.version_tracking_enabled && !source.is_static_content {
                    sources::set_next_sync(&db, &source.id, Some(next)).await?;
                }
            }
        }

        info!(
            checked,
            updated,
            skipped,
            failed = errors.len(),
            "sync cycle finished"
        );
        Ok(log_id)
    }

    /// The scheduler loop: sleep until the next cron fire, run a cycle,
    /// repeat. Returns immediately when sync is disabled.
    pub async fn run_forever(&self) {
        if !self.settings.sync_enabled {
            info!("scheduled sync is disabled");
            return;
        }
        loop {
            let now = self.clock.now();
            let Some(next) = self.next_run_after(now) else {
                warn!("cron schedule yields no future fire times; stopping scheduler");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, wait_secs = wait.as_secs(), "sleeping until next sync");
            tokio::time::sleep(wait).await;

            if let Err(err) = self.run_sync_cycle().await {
                warn!(error = %err, "sync cycle failed");
            }
        }
    }
}

/// Whether a source qualifies for the startup sweep.
fn is_sweep_candidate(
    source: &SourceRecord,
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> bool {
    source.enabled
        && source.version_tracking_enabled
        && !source.is_static_content
        && source.last_sync_at.is_none_or(|last| now - last > staleness)
}

/// Parse the configured cron expression. Five-field expressions (the
/// documented form) get a seconds column prepended for the parser.
fn parse_cron(expression: &str) -> Result<Schedule> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| Error::Validation(format!("invalid cron expression '{expression}': {e}")))
}
