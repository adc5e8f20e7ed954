//! The operation surface exposed to external collaborators.
//!
//! Each operation returns a structured [`ActionResult`] instead of raising:
//! `text` carries the human-readable summary, `data` the machine payload,
//! and auth failures set `needs_token` so the conversational layer can
//! prompt for one. Write-side operations require a valid token when auth
//! is enabled; reads never check tokens.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::config::Settings;
use crate::error::{Error, ErrorContext, Result};
use crate::quote::QuoteEngine;
use crate::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use crate::store::{documents, policies, sources};
use crate::types::{RefreshPolicy, SizePolicy, SourceRecord};

/// Structured result of one operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub text: String,
    /// Machine-readable payload.
    pub data: serde_json::Value,
    /// Set when auth is enabled and no token was supplied.
    pub needs_token: bool,
}

impl ActionResult {
    fn ok(text: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            text: text.into(),
            data,
            needs_token: false,
        }
    }

    fn from_error(err: &Error, operation: &str) -> Self {
        let report = err.report(ErrorContext::operation(operation));
        Self {
            success: false,
            text: report.message.clone(),
            data: json!({ "error": report }),
            needs_token: err.needs_token(),
        }
    }
}

/// Options accepted by [`Actions::mirror_source`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorOptions {
    /// Explicit source id; derived from the URL when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Opaque metadata forwarded to the semantic sink.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Register the source as static content (no scheduled re-sync).
    #[serde(default)]
    pub is_static_content: Option<bool>,
}

/// The token-gated action dispatcher facade over the core services.
pub struct Actions {
    reconciler: Reconciler,
    settings: Settings,
}

impl Actions {
    /// Wire the surface over a reconciler and resolved settings.
    #[must_use]
    pub const fn new(reconciler: Reconciler, settings: Settings) -> Self {
        Self {
            reconciler,
            settings,
        }
    }

    /// Access to the underlying reconciler (host wiring).
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn authorize(&self, token: Option<&str>) -> Result<()> {
        if !self.settings.auth_enabled {
            return Ok(());
        }
        match token {
            None => Err(Error::AuthRequired(
                "this operation modifies the mirror and needs an auth token".to_string(),
            )),
            Some(supplied) if self.settings.auth_token.as_deref() == Some(supplied) => Ok(()),
            Some(_) => Err(Error::AuthRejected("the supplied token is not valid".to_string())),
        }
    }

    /// Ingest a single document URL as its own static source.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn add_document(
        &self,
        token: Option<&str>,
        url: &str,
        metadata: Option<serde_json::Value>,
    ) -> ActionResult {
        let op = "addDocument";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }

        let mut record = SourceRecord::new(source_id_for(url), url);
        record.is_static_content = true;
        record.static_metadata = metadata;

        match self
            .reconciler
            .verify_and_reconcile_one(
                &record,
                ReconcileOptions {
                    bypass_cooldown: true,
                    force_probe: true,
                },
            )
            .await
        {
            Ok(outcome) => reconcile_result(&outcome, format!("added document from {url}")),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Register (or re-sync) a root URL as a mirrored source.
    #[instrument(skip_all, fields(root_url = %root_url))]
    pub async fn mirror_source(
        &self,
        token: Option<&str>,
        root_url: &str,
        options: MirrorOptions,
    ) -> ActionResult {
        let op = "mirrorSource";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }

        let id = options.id.unwrap_or_else(|| source_id_for(root_url));
        let mut record = SourceRecord::new(id, root_url);
        record.static_metadata = options.metadata;
        record.is_static_content = options.is_static_content.unwrap_or(false);

        match self
            .reconciler
            .verify_and_reconcile_one(
                &record,
                ReconcileOptions {
                    bypass_cooldown: true,
                    force_probe: false,
                },
            )
            .await
        {
            Ok(outcome) => reconcile_result(&outcome, format!("mirrored {root_url}")),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// List configured sources.
    pub async fn list_sources(&self) -> ActionResult {
        match sources::list(self.reconciler.db()).await {
            Ok(records) => {
                let text = if records.is_empty() {
                    "no sources configured".to_string()
                } else {
                    records
                        .iter()
                        .map(|s| format!("{} -> {}", s.id, s.source_url))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                ActionResult::ok(text, json!({ "sources": records }))
            },
            Err(err) => ActionResult::from_error(&err, "listSources"),
        }
    }

    /// List stored documents, optionally per source. Content is omitted;
    /// use `getQuote` to read it.
    pub async fn list_documents(&self, source_id: Option<&str>) -> ActionResult {
        match documents::list(self.reconciler.db(), source_id).await {
            Ok(records) => {
                let listed: Vec<serde_json::Value> = records
                    .iter()
                    .map(|d| {
                        json!({
                            "id": d.id,
                            "sourceId": d.source_id,
                            "versionId": d.version_id,
                            "url": d.url,
                            "contentHash": d.content_hash,
                            "byteSize": d.byte_size,
                            "mimeType": d.mime_type,
                            "createdAt": d.created_at,
                        })
                    })
                    .collect();
                ActionResult::ok(
                    format!("{} documents", listed.len()),
                    json!({ "documents": listed }),
                )
            },
            Err(err) => ActionResult::from_error(&err, "listDocuments"),
        }
    }

    /// Remove every verbatim row stored under a URL.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn remove_document(&self, token: Option<&str>, url: &str) -> ActionResult {
        let op = "removeDocument";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        match documents::delete_by_url(self.reconciler.db(), url).await {
            Ok(0) => ActionResult::from_error(
                &Error::NotFound(format!("document not found for URL '{url}'")),
                op,
            ),
            Ok(removed) => ActionResult::ok(
                format!("removed {removed} document rows for {url}"),
                json!({ "removed": removed }),
            ),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Remove a source and everything hanging off it.
    #[instrument(skip_all, fields(source_id = %id))]
    pub async fn remove_source(&self, token: Option<&str>, id: &str) -> ActionResult {
        let op = "removeSource";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        match self.reconciler.remove_source(id).await {
            Ok(()) => ActionResult::ok(format!("removed source {id}"), json!({ "sourceId": id })),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Force a re-sync of one source, bypassing cooldown and preview cache.
    #[instrument(skip_all, fields(source_id = %id))]
    pub async fn refresh_source(&self, token: Option<&str>, id: &str) -> ActionResult {
        let op = "refreshSource";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        let record = match sources::get(self.reconciler.db(), id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return ActionResult::from_error(&Error::NotFound(format!("source '{id}'")), op);
            },
            Err(err) => return ActionResult::from_error(&err, op),
        };
        match self
            .reconciler
            .verify_and_reconcile_one(
                &record,
                ReconcileOptions {
                    bypass_cooldown: true,
                    force_probe: true,
                },
            )
            .await
        {
            Ok(outcome) => reconcile_result(&outcome, format!("refreshed {id}")),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Toggle version tracking for a source.
    pub async fn set_version_tracking(
        &self,
        token: Option<&str>,
        id: &str,
        enabled: bool,
    ) -> ActionResult {
        let op = "setVersionTracking";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        match sources::set_version_tracking(self.reconciler.db(), id, enabled).await {
            Ok(()) => ActionResult::ok(
                format!(
                    "version tracking {} for {id}",
                    if enabled { "enabled" } else { "disabled" }
                ),
                json!({ "sourceId": id, "enabled": enabled }),
            ),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Answer a quote request about a stored document. Read-side: no token.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn get_quote(
        &self,
        url: &str,
        request: &str,
        structured_args: Option<&serde_json::Value>,
    ) -> ActionResult {
        let engine = QuoteEngine::new(self.reconciler.db());
        match engine.get_quote(url, request, structured_args).await {
            Ok(answer) => ActionResult::ok(
                answer.text,
                json!({ "mode": answer.mode, "result": answer.data }),
            ),
            Err(err) => ActionResult::from_error(&err, "getQuote"),
        }
    }

    /// Upsert this agent's size policy.
    pub async fn set_size_policy(&self, token: Option<&str>, policy: SizePolicy) -> ActionResult {
        let op = "setSizePolicy";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        match policies::set_size_policy(self.reconciler.db(), self.reconciler.agent_id(), policy)
            .await
        {
            Ok(stored) => ActionResult::ok("size policy updated", json!({ "policy": stored })),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }

    /// Upsert this agent's refresh policy.
    pub async fn set_refresh_policy(
        &self,
        token: Option<&str>,
        policy: RefreshPolicy,
    ) -> ActionResult {
        let op = "setRefreshPolicy";
        if let Err(err) = self.authorize(token) {
            return ActionResult::from_error(&err, op);
        }
        match policies::set_refresh_policy(
            self.reconciler.db(),
            self.reconciler.agent_id(),
            policy,
        )
        .await
        {
            Ok(()) => ActionResult::ok("refresh policy updated", json!({ "policy": policy })),
            Err(err) => ActionResult::from_error(&err, op),
        }
    }
}

/// Deterministic source id for URL-derived sources.
fn source_id_for(url: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, url.trim().as_bytes()).to_string()
}

fn reconcile_result(outcome: &ReconcileOutcome, success_text: String) -> ActionResult {
    let data = json!({ "outcome": outcome });
    match outcome.status {
        crate::reconcile::ReconcileStatus::Reconciled
        | crate::reconcile::ReconcileStatus::UpToDate => ActionResult::ok(success_text, data),
        crate::reconcile::ReconcileStatus::SkippedSizeLimit
        | crate::reconcile::ReconcileStatus::Failed => ActionResult {
            success: false,
            text: outcome
                .error
                .clone()
                .unwrap_or_else(|| "reconcile did not complete".to_string()),
            data,
            needs_token: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::extract::PassthroughExtractor;
    use crate::fetch::HttpClient;
    use crate::sink::NullSink;
    use crate::store::Db;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn actions_with(settings: Settings) -> anyhow::Result<Actions> {
        let db = Db::open_in_memory().await?;
        let reconciler = Reconciler::new(
            db,
            HttpClient::new()?,
            Arc::new(PassthroughExtractor),
            Arc::new(NullSink),
            Arc::new(SystemClock),
            "agent-1",
        );
        Ok(Actions::new(reconciler, settings))
    }

    fn auth_settings() -> Settings {
        Settings {
            auth_enabled: true,
            auth_token: Some("secret".to_string()),
            ..Settings::default()
        }
    }

    async fn mount_single_doc(server: &MockServer, doc_path: &str, body: &str) {
        Mock::given(method("HEAD"))
            .and(path(doc_path.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", body.len().to_string().as_str())
                    .insert_header("content-type", "text/plain"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(doc_path.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string(body.to_string()),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn writes_need_a_token_when_auth_is_enabled() -> anyhow::Result<()> {
        let actions = actions_with(auth_settings()).await?;

        let missing = actions.add_document(None, "https://x/doc.md", None).await;
        assert!(!missing.success);
        assert!(missing.needs_token);

        let wrong = actions
            .add_document(Some("nope"), "https://x/doc.md", None)
            .await;
        assert!(!wrong.success);
        assert!(!wrong.needs_token);
        Ok(())
    }

    #[tokio::test]
    async fn reads_never_check_tokens() -> anyhow::Result<()> {
        let actions = actions_with(auth_settings()).await?;
        let result = actions.list_sources().await;
        assert!(result.success);
        assert_eq!(result.text, "no sources configured");
        Ok(())
    }

    #[tokio::test]
    async fn add_document_then_quote_round_trip() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        mount_single_doc(&server, "/doc.txt", "Dr. Smith arrived. He spoke.").await;

        let actions = actions_with(Settings::default()).await?;
        let url = format!("{}/doc.txt", server.uri());

        let added = actions.add_document(None, &url, None).await;
        assert!(added.success, "{}", added.text);

        let quote = actions.get_quote(&url, "first sentence", None).await;
        assert!(quote.success);
        assert_eq!(quote.text, "Dr. Smith arrived.");
        assert_eq!(quote.data["mode"], "first_n");

        let stats = actions.get_quote(&url, "how many sentences", None).await;
        assert_eq!(stats.data["result"]["count"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn quote_for_unknown_url_reports_not_found() -> anyhow::Result<()> {
        let actions = actions_with(Settings::default()).await?;
        let result = actions
            .get_quote("https://nowhere.invalid/doc.md", "first sentence", None)
            .await;
        assert!(!result.success);
        assert!(result.text.contains("document not found"));
        Ok(())
    }

    #[tokio::test]
    async fn remove_document_deletes_verbatim_rows() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        mount_single_doc(&server, "/doc.txt", "Body.").await;

        let actions = actions_with(Settings::default()).await?;
        let url = format!("{}/doc.txt", server.uri());
        actions.add_document(None, &url, None).await;

        let removed = actions.remove_document(None, &url).await;
        assert!(removed.success);

        let gone = actions.remove_document(None, &url).await;
        assert!(!gone.success);
        assert!(gone.text.contains("not found"));
        Ok(())
    }

    #[tokio::test]
    async fn mirror_list_and_remove_source_round_trip() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let listing = format!("{}/a.txt\n", server.uri());
        Mock::given(method("GET"))
            .and(path("/llms-full.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;
        mount_single_doc(&server, "/a.txt", "Alpha.").await;

        let actions = actions_with(Settings::default()).await?;
        let root = format!("{}/llms-full.txt", server.uri());

        let mirrored = actions
            .mirror_source(
                None,
                &root,
                MirrorOptions {
                    id: Some("docs".to_string()),
                    ..MirrorOptions::default()
                },
            )
            .await;
        assert!(mirrored.success, "{}", mirrored.text);

        let listed = actions.list_sources().await;
        assert!(listed.text.contains("docs"));

        let docs = actions.list_documents(Some("docs")).await;
        assert_eq!(docs.data["documents"].as_array().unwrap().len(), 1);
        // Content stays out of listings.
        assert!(docs.data["documents"][0].get("content").is_none());

        let removed = actions.remove_source(None, "docs").await;
        assert!(removed.success);
        let empty = actions.list_documents(Some("docs")).await;
        assert_eq!(empty.data["documents"].as_array().unwrap().len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn policies_round_trip_through_the_surface() -> anyhow::Result<()> {
        let actions = actions_with(Settings::default()).await?;

        let result = actions
            .set_size_policy(
                None,
                SizePolicy {
                    preview_always: true,
                    auto_ingest_below_bytes: 0,
                    max_bytes_hard_limit: 1024,
                },
            )
            .await;
        assert!(result.success);
        // The auto-ingest floor is enforced on the way in.
        assert_eq!(
            result.data["policy"]["autoIngestBelowBytes"],
            crate::types::MIN_AUTO_INGEST_BYTES
        );

        let result = actions
            .set_refresh_policy(None, RefreshPolicy::default())
            .await;
        assert!(result.success);
        Ok(())
    }

    #[tokio::test]
    async fn set_version_tracking_round_trip() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        mount_single_doc(&server, "/doc.txt", "Body.").await;

        let actions = actions_with(Settings::default()).await?;
        let url = format!("{}/doc.txt", server.uri());
        actions.add_document(None, &url, None).await;

        let id = source_id_for(&url);
        let toggled = actions.set_version_tracking(None, &id, false).await;
        assert!(toggled.success);

        let missing = actions.set_version_tracking(None, "ghost", false).await;
        assert!(!missing.success);
        Ok(())
    }
}
