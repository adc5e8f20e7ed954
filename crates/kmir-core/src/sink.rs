//! The semantic-store seam.
//!
//! The core never talks to the embedding service directly; it forwards
//! documents through [`KnowledgeSink`] and keeps only the opaque handles it
//! gets back (as knowledge-link rows). Hosts inject a real implementation;
//! [`NullSink`] serves hosts running without a semantic store.

use async_trait::async_trait;

use crate::error::Result;

/// A document handed to the semantic store.
#[derive(Debug, Clone)]
pub struct KnowledgeDoc {
    /// Owning source.
    pub source_id: String,
    /// Version the document was ingested under.
    pub version_id: String,
    /// Document URL.
    pub url: String,
    /// Full extracted text.
    pub content: String,
    /// Opaque metadata blob passed through from source registration.
    pub metadata: Option<serde_json::Value>,
}

/// Minimal interface to the semantic store.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Store a document; returns the sink's opaque handle for it.
    async fn add(&self, doc: KnowledgeDoc) -> Result<String>;

    /// Remove one document by handle.
    async fn remove(&self, handle: &str) -> Result<()>;

    /// Remove everything the sink holds for a source.
    async fn remove_by_source(&self, source_id: &str) -> Result<()>;
}

/// Sink that stores nothing and issues deterministic handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl KnowledgeSink for NullSink {
    async fn add(&self, doc: KnowledgeDoc) -> Result<String> {
        // Handle derived from the URL so repeated ingests stay idempotent.
        Ok(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, doc.url.as_bytes()).to_string())
    }

    async fn remove(&self, _handle: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_by_source(&self, _source_id: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_handles_are_stable_per_url() {
        let sink = NullSink;
        let doc = |url: &str| KnowledgeDoc {
            source_id: "s".to_string(),
            version_id: "v".to_string(),
            url: url.to_string(),
            content: "text".to_string(),
            metadata: None,
        };

        let a1 = sink.add(doc("https://x/a")).await.unwrap();
        let a2 = sink.add(doc("https://x/a")).await.unwrap();
        let b = sink.add(doc("https://x/b")).await.unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }
}
