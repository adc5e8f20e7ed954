//! Schema DDL for the mirror's relational store.
//!
//! All statements are idempotent (`IF NOT EXISTS`) and applied on every
//! startup. Policy blobs, previews and profiles live in JSON text columns;
//! timestamps are RFC 3339 text. Source deletion cascades are declared for
//! safety, but source removal deletes dependents explicitly in order
//! (sink handles, links, documents, versions, source).

/// Every table and index, in creation order.
pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS kb_sources (
        id TEXT PRIMARY KEY,
        source_url TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        version_tracking_enabled INTEGER NOT NULL DEFAULT 1,
        is_static_content INTEGER NOT NULL DEFAULT 0,
        static_metadata TEXT,
        last_sync_at TEXT,
        next_sync_at TEXT
    )",
    r"
    CREATE TABLE IF NOT EXISTS kb_versions (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES kb_sources(id) ON DELETE CASCADE,
        version_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        activated_at TEXT,
        failed_at TEXT,
        failure_reason TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_kb_versions_source_status
        ON kb_versions(source_id, status)",
    r"
    CREATE TABLE IF NOT EXISTS kb_documents (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        version_id TEXT NOT NULL,
        url TEXT NOT NULL,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        mime_type TEXT,
        byte_size INTEGER,
        profile TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (source_id, version_id, url)
    )",
    "CREATE INDEX IF NOT EXISTS idx_kb_documents_url ON kb_documents(url)",
    "CREATE INDEX IF NOT EXISTS idx_kb_documents_source_version
        ON kb_documents(source_id, version_id)",
    r"
    CREATE TABLE IF NOT EXISTS kb_knowledge_links (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES kb_sources(id) ON DELETE CASCADE,
        version_id TEXT NOT NULL,
        knowledge_document_id TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS kb_preview_cache (
        source_id TEXT PRIMARY KEY,
        preview TEXT NOT NULL,
        checked_at TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS kb_size_policies (
        agent_id TEXT PRIMARY KEY,
        policy TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS kb_refresh_policies (
        agent_id TEXT PRIMARY KEY,
        policy TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS kb_sync_log (
        id TEXT PRIMARY KEY,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        status TEXT NOT NULL,
        sources_checked INTEGER NOT NULL DEFAULT 0,
        sources_updated INTEGER NOT NULL DEFAULT 0,
        sources_skipped INTEGER NOT NULL DEFAULT 0,
        errors TEXT NOT NULL DEFAULT '[]'
    )",
];
