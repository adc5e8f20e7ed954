//! Document ingestion: fetch, extract, persist, profile, forward.
//!
//! For each discovered file the ingestor fetches the raw form of its URL,
//! routes the body through the content-type rules to plain text, truncates
//! oversized text, persists verbatim rows (one per URL form) with the
//! analyzer profile attached, and forwards the text to the semantic sink,
//! registering the returned handle as a knowledge link.
//!
//! The per-document loop is failure-isolated: one bad URL is caught,
//! recorded as a diagnostic, and the loop moves on.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::analyzer;
use crate::clock::Clock;
use crate::error::{Error, ErrorContext, Result};
use crate::extract::ContentExtractor;
use crate::fetch::HttpClient;
use crate::sink::{KnowledgeDoc, KnowledgeSink};
use crate::store::{Db, documents, links};
use crate::types::{DocumentRecord, FilePreview, SourceRecord};

/// Extracted text is cut at this many characters.
pub const MAX_CONTENT_CHARS: usize = 500_000;

/// File extensions fetched as text without consulting the preview's
/// declared content type.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "org", "adoc", "json", "yaml", "yml", "toml", "xml", "html",
    "htm", "csv", "tsv", "log",
];

#[allow(clippy::expect_used)]
static GITHUB_BLOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/blob/(.+)$").expect("static regex")
});
#[allow(clippy::expect_used)]
static GIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://gist\.github\.com/([^/]+)/([^/]+)$").expect("static regex")
});
#[allow(clippy::expect_used)]
static GITLAB_BLOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://gitlab\.com/([^/]+)/([^/]+)/-/blob/(.+)$").expect("static regex")
});

/// Rewrite hosted-VCS page URLs to their raw-content form. Non-matching
/// URLs come back unchanged.
#[must_use]
pub fn normalize_raw_url(url: &str) -> String {
    if let Some(caps) = GITHUB_BLOB.captures(url) {
        return format!(
            "https://raw.githubusercontent.com/{}/{}/{}",
            &caps[1], &caps[2], &caps[3]
        );
    }
    if let Some(caps) = GIST.captures(url) {
        return format!(
            "https://gist.githubusercontent.com/{}/{}/raw",
            &caps[1], &caps[2]
        );
    }
    if let Some(caps) = GITLAB_BLOB.captures(url) {
        return format!(
            "https://gitlab.com/{}/{}/-/raw/{}",
            &caps[1], &caps[2], &caps[3]
        );
    }
    url.to_string()
}

/// Lowercase hex SHA-256 of document content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Where in the pipeline a per-document event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    /// Fetching the document body.
    Fetch,
    /// Routing/extracting text from the body.
    Extract,
    /// Writing verbatim rows.
    Persist,
    /// Forwarding to the semantic sink.
    Sink,
}

/// A recorded per-document event: a caught failure or a degradation note.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestDiagnostic {
    /// Document URL the event belongs to.
    pub url: String,
    /// Pipeline stage.
    pub stage: IngestStage,
    /// Human-readable description.
    pub message: String,
}

/// Summary of one ingest loop run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Files the loop attempted.
    pub attempted: usize,
    /// Files that produced a stored document.
    pub succeeded: usize,
    /// Caught failures and degradation notes.
    pub diagnostics: Vec<IngestDiagnostic>,
}

/// One successfully ingested file.
#[derive(Debug)]
struct FileOutcome {
    document_id: String,
    notes: Vec<IngestDiagnostic>,
}

/// Runs the per-document pipeline against injected collaborators.
pub struct Ingestor<'a> {
    db: &'a Db,
    http: &'a HttpClient,
    extractor: &'a dyn ContentExtractor,
    sink: &'a dyn KnowledgeSink,
    clock: &'a dyn Clock,
}

impl<'a> Ingestor<'a> {
    /// Wire up an ingestor; every collaborator is injected.
    #[must_use]
    pub fn new(
        db: &'a Db,
        http: &'a HttpClient,
        extractor: &'a dyn ContentExtractor,
        sink: &'a dyn KnowledgeSink,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            db,
            http,
            extractor,
            sink,
            clock,
        }
    }

    /// Ingest every file of a staged version. Per-file failures are caught
    /// and recorded; the loop always runs to the end of the list.
    pub async fn ingest_files(
        &self,
        source: &SourceRecord,
        version_id: &str,
        files: &[FilePreview],
    ) -> IngestReport {
        let mut report = IngestReport {
            attempted: files.len(),
            ..IngestReport::default()
        };

        for file in files {
            match self.ingest_file(source, version_id, file).await {
                Ok(outcome) => {
                    report.succeeded += 1;
                    report.diagnostics.extend(outcome.notes);
                    debug!(url = %file.url, document_id = %outcome.document_id, "ingested document");
                },
                Err(err) => {
                    warn!(url = %file.url, error = %err, "document ingest failed, continuing");
                    report.diagnostics.push(IngestDiagnostic {
                        url: file.url.clone(),
                        stage: stage_of(&err),
                        message: err
                            .report(ErrorContext::operation("ingest").with_url(&file.url))
                            .message,
                    });
                },
            }
        }
        report
    }

    async fn ingest_file(
        &self,
        source: &SourceRecord,
        version_id: &str,
        file: &FilePreview,
    ) -> Result<FileOutcome> {
        let raw_url = normalize_raw_url(&file.url);
        let mut notes = Vec::new();

        // Declared type and extension pick the transport (text fetches
        // retry, byte fetches do not); the response header picks the
        // extractor.
        let body = if looks_textual(&file.url, &file.content_type) {
            self.http.fetch_with_retry(&raw_url).await?
        } else {
            self.http.fetch(&raw_url).await?
        };

        let mut content = self
            .route_body(&file.url, body.content_type.as_deref(), &body.bytes, &mut notes)
            .await?;
        if truncate_chars(&mut content, MAX_CONTENT_CHARS) {
            notes.push(IngestDiagnostic {
                url: file.url.clone(),
                stage: IngestStage::Extract,
                message: format!("content truncated to {MAX_CONTENT_CHARS} chars"),
            });
        }

        let document_id = self
            .persist_document(
                source,
                version_id,
                &file.url,
                &raw_url,
                content.clone(),
                body.content_type.clone(),
            )
            .await?;

        let handle = self
            .sink
            .add(KnowledgeDoc {
                source_id: source.id.clone(),
                version_id: version_id.to_string(),
                url: file.url.clone(),
                content,
                metadata: source.static_metadata.clone(),
            })
            .await?;
        links::add(self.db, &source.id, version_id, &handle).await?;

        Ok(FileOutcome {
            document_id,
            notes,
        })
    }

    /// Route a response body by its content-type header, not its URL.
    async fn route_body(
        &self,
        url: &str,
        content_type: Option<&str>,
        bytes: &[u8],
        notes: &mut Vec<IngestDiagnostic>,
    ) -> Result<String> {
        let mime = content_type
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if mime == "application/pdf" {
            if bytes.starts_with(b"%PDF-") {
                return self.extractor.extract_pdf(bytes).await;
            }
            // Header claims PDF without the magic bytes; downgrade to text.
            notes.push(IngestDiagnostic {
                url: url.to_string(),
                stage: IngestStage::Extract,
                message: "content-type claims PDF but magic bytes are missing; treating as text"
                    .to_string(),
            });
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }

        if mime == "text/html" || mime == "application/xhtml+xml" || mime == "text/xhtml" {
            return self.extractor.extract_html(bytes).await;
        }

        // text/plain, text/markdown, and everything unrecognized pass
        // through as UTF-8 text.
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Store the verbatim row(s): one keyed by the original URL and, when
    /// normalization changed it, a second row keyed by the raw URL under
    /// the same `(source, version)`. The duplicate-key case on the second
    /// row is swallowed.
    pub(crate) async fn persist_document(
        &self,
        source: &SourceRecord,
        version_id: &str,
        original_url: &str,
        raw_url: &str,
        content: String,
        mime_type: Option<String>,
    ) -> Result<String> {
        let now = self.clock.now();
        let profile = analyzer::analyze(&content, now);

        let record = DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            version_id: version_id.to_string(),
            url: original_url.to_string(),
            content_hash: content_hash(&content),
            byte_size: Some(content.len() as u64),
            profile: Some(profile),
            content,
            mime_type,
            created_at: now,
        };
        documents::insert(self.db, &record).await?;

        if raw_url != original_url {
            let raw_record = DocumentRecord {
                id: uuid::Uuid::new_v4().to_string(),
                url: raw_url.to_string(),
                ..record.clone()
            };
            match documents::insert(self.db, &raw_record).await {
                Ok(()) | Err(Error::Conflict(_)) => {},
                Err(e) => return Err(e),
            }
        }

        Ok(record.id)
    }
}

/// Whether the URL extension or the declared content type marks the file
/// as text.
fn looks_textual(url: &str, declared_content_type: &str) -> bool {
    if declared_content_type.trim().to_ascii_lowercase().starts_with("text/") {
        return true;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('.')
        .next()
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Truncate in place at a char boundary; true when anything was cut.
fn truncate_chars(content: &mut String, max_chars: usize) -> bool {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            content.truncate(byte_idx);
            true
        },
        None => false,
    }
}

fn stage_of(err: &Error) -> IngestStage {
    match err {
        Error::Network(_) | Error::HttpStatus { .. } | Error::Timeout(_) | Error::NotFound(_) => {
            IngestStage::Fetch
        },
        Error::Validation(_) | Error::Classification(_) => IngestStage::Extract,
        Error::Database(_) | Error::Storage(_) | Error::Conflict(_) | Error::Serialization(_) => {
            IngestStage::Persist
        },
        _ => IngestStage::Sink,
    }
}
