//! Error types and handling for kmir-core operations.
//!
//! Every fallible operation in the crate returns [`Result<T, Error>`]. Errors
//! are categorized rather than just messaged: each variant maps to one of the
//! fixed [`ErrorCategory`] values, carries a stable code within that category,
//! and knows whether a retry could plausibly succeed. At the operation
//! boundary an [`ErrorReport`] snapshot (category, code, message, context,
//! timestamp) is what callers see.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout kmir-core.
pub type Result<T> = std::result::Result<T, Error>;

/// The fixed set of error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or rejected auth token on a write-side operation.
    Auth,
    /// HTTP transport failures, timeouts, unexpected statuses.
    Network,
    /// Failures inside the relational store.
    Database,
    /// Malformed caller input rejected before any state change.
    Validation,
    /// Root URL could not be classified or its listing parsed.
    Classification,
    /// Content persistence violations: missing rows, duplicate ids.
    Storage,
    /// Everything that indicates a bug rather than bad input.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Database => "database",
            Self::Validation => "validation",
            Self::Classification => "classification",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Where an error happened. Attached when building an [`ErrorReport`];
/// individual variants stay lightweight.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Operation name at the surface where the error crossed a boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// URL being fetched or looked up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Document row involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Source involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl ErrorContext {
    /// Context naming only the operation.
    pub fn operation(op: impl Into<String>) -> Self {
        Self {
            operation: Some(op.into()),
            ..Self::default()
        }
    }

    /// Attach the URL the operation was working on.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach the source id the operation was working on.
    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// The main error type for kmir-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Auth is enabled and a write-side operation arrived without a token.
    /// The conversational layer uses this to prompt for one.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// A token was supplied but does not match the configured one.
    #[error("Authentication failed: {0}")]
    AuthRejected(String),

    /// HTTP transport failure from the underlying client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status the caller should see.
    #[error("HTTP {status} from '{url}'")]
    HttpStatus {
        /// Status code returned by the server.
        status: u16,
        /// URL that produced it.
        url: String,
    },

    /// An operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Failure inside the relational engine.
    #[error("Database error: {0}")]
    Database(#[from] turso::Error),

    /// Caller input rejected before any state was mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The root URL could not be classified or its listing parsed.
    #[error("Classification error: {0}")]
    Classification(String),

    /// Content persistence violation beyond plain DB failures.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested row or document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert hit an existing primary key. Idempotent call sites swallow
    /// this; everything else propagates it.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// JSON (de)serialization failure for policy blobs or profiles.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bug: invariants violated, impossible states reached.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The category this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthRequired(_) | Self::AuthRejected(_) => ErrorCategory::Auth,
            Self::Network(_) | Self::HttpStatus { .. } | Self::Timeout(_) => ErrorCategory::Network,
            Self::Database(_) => ErrorCategory::Database,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Classification(_) => ErrorCategory::Classification,
            Self::Storage(_) | Self::NotFound(_) | Self::Conflict(_) => ErrorCategory::Storage,
            Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code within the category.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthRequired(_) => "token_required",
            Self::AuthRejected(_) => "token_rejected",
            Self::Network(_) => "transport",
            Self::HttpStatus { .. } => "http_status",
            Self::Timeout(_) => "timeout",
            Self::Database(_) => "query",
            Self::Validation(_) => "invalid_input",
            Self::Classification(_) => "unclassifiable",
            Self::Storage(_) => "storage",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "duplicate_id",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Network transport failures and timeouts are retryable. 4xx statuses
    /// are not, with 408 and 429 as the usual exceptions. Everything
    /// non-network is permanent from the retry loop's point of view.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Network(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() && !err.is_builder()
            },
            Self::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            },
            _ => false,
        }
    }

    /// True when the error came from a missing auth token (as opposed to a
    /// wrong one); the conversational layer prompts on this.
    #[must_use]
    pub const fn needs_token(&self) -> bool {
        matches!(self, Self::AuthRequired(_))
    }

    /// Build the structured snapshot callers receive.
    #[must_use]
    pub fn report(&self, context: ErrorContext) -> ErrorReport {
        ErrorReport {
            category: self.category(),
            code: self.code(),
            message: self.to_string(),
            context,
            is_retryable: self.is_retryable(),
            timestamp: Utc::now(),
        }
    }
}

/// Structured error snapshot surfaced at operation boundaries and stored
/// in diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Category the error belongs to.
    pub category: ErrorCategory,
    /// Code within the category.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Where it happened.
    pub context: ErrorContext,
    /// Whether a retry could plausibly succeed.
    pub is_retryable: bool,
    /// When the report was built.
    pub timestamp: DateTime<Utc>,
}
