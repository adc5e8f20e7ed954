//! # kmir-core
//!
//! Core functionality for kmir — a versioned knowledge-base mirror with
//! exact quote retrieval.
//!
//! The crate discovers documents behind a root URL (llms.txt listings,
//! sitemaps, or single documents), probes them cheaply, hashes the probe
//! into a content-independent version id, and keeps two coordinated stores
//! consistent with upstream: a verbatim store (full text plus a
//! precomputed structural profile) and an external semantic sink addressed
//! through opaque handles.
//!
//! ## Architecture
//!
//! - **Discovery & probing**: classify the root, enumerate documents,
//!   HEAD/ranged-GET each one ([`discovery`], [`probe`]).
//! - **Versioning & reconciliation**: deterministic preview hashing and
//!   the staging → active → archived state machine ([`version`],
//!   [`reconcile`]).
//! - **Ingestion**: fetch, content-type routing, verbatim persistence,
//!   profile computation, sink forwarding ([`ingest`], [`analyzer`]).
//! - **Quote retrieval**: natural-language requests answered in O(1)
//!   against the stored profile ([`quote`]).
//! - **Scheduling**: cron-driven re-sync plus a startup staleness sweep
//!   ([`scheduler`]).
//!
//! Collaborators the core does not own — the HTTP transport, the semantic
//! sink, HTML/PDF extraction, the clock — are injected through
//! constructor parameters, which keeps every service testable without a
//! host ([`fetch`], [`sink`], [`extract`], [`clock`]).
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kmir_core::{
//!     Actions, Db, HttpClient, NullSink, PassthroughExtractor, Reconciler, Settings,
//!     SystemClock,
//! };
//!
//! # async fn example() -> kmir_core::Result<()> {
//! let db = Db::open("kmir.db").await?;
//! db.init_schema().await?;
//!
//! let reconciler = Reconciler::new(
//!     db,
//!     HttpClient::new()?,
//!     Arc::new(PassthroughExtractor),
//!     Arc::new(NullSink),
//!     Arc::new(SystemClock),
//!     "agent-1",
//! );
//! let actions = Actions::new(reconciler, Settings::from_env());
//!
//! let result = actions
//!     .mirror_source(None, "https://docs.example.com/llms-full.txt", Default::default())
//!     .await;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

/// Token-gated operation surface returning structured results
pub mod actions;
/// Pure structural analysis: text to byte-offset profile
pub mod analyzer;
/// Injected time source
pub mod clock;
/// Environment-driven settings
pub mod config;
/// Root URL classification and document enumeration
pub mod discovery;
/// Categorized error types and result alias
pub mod error;
/// Text-extraction seam for HTML and PDF bodies
pub mod extract;
/// Shared HTTP client with probe and retry support
pub mod fetch;
/// Per-document ingestion pipeline
pub mod ingest;
/// Preview probing of discovered URLs
pub mod probe;
/// Quote-mode parsing and O(1) lookup engine
pub mod quote;
/// Reconciliation orchestration and version state machine
pub mod reconcile;
/// Cron-driven sync loop and startup staleness sweep
pub mod scheduler;
/// Semantic-store seam
pub mod sink;
/// Durable state: Db provider, schema, repositories
pub mod store;
/// Persistent records and policy types
pub mod types;
/// Deterministic preview hashing
pub mod version;

// Re-export the types hosts touch most.
pub use actions::{ActionResult, Actions, MirrorOptions};
pub use analyzer::{Profile, analyze};
pub use clock::{Clock, SystemClock};
pub use config::{LogLevel, Settings};
pub use discovery::{DiscoveredFile, Discovery, RootKind, classify_root};
pub use error::{Error, ErrorCategory, ErrorContext, ErrorReport, Result};
pub use extract::{ContentExtractor, PassthroughExtractor};
pub use fetch::HttpClient;
pub use ingest::{IngestDiagnostic, Ingestor, normalize_raw_url};
pub use probe::PreviewProbe;
pub use quote::{QuoteAnswer, QuoteEngine};
pub use reconcile::{ReconcileOptions, ReconcileOutcome, ReconcileStatus, Reconciler};
pub use scheduler::ScheduledSyncService;
pub use sink::{KnowledgeDoc, KnowledgeSink, NullSink};
pub use store::Db;
pub use types::*;
pub use version::{compute_version_id, needs_update};
