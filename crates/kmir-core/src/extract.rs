//! The text-extraction seam.
//!
//! HTML and PDF extraction are external collaborators; the core routes
//! fetched bytes to one of these methods based on the response content type
//! and consumes whatever text comes back as an opaque string.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Converts fetched bodies into plain text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extract readable text from an HTML body.
    async fn extract_html(&self, bytes: &[u8]) -> Result<String>;

    /// Extract readable text from a PDF body.
    async fn extract_pdf(&self, bytes: &[u8]) -> Result<String>;
}

/// Extractor for hosts without HTML/PDF tooling: HTML passes through as
/// lossy UTF-8, PDFs are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughExtractor;

#[async_trait]
impl ContentExtractor for PassthroughExtractor {
    async fn extract_html(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    async fn extract_pdf(&self, _bytes: &[u8]) -> Result<String> {
        Err(Error::Validation(
            "no PDF extractor is configured for this agent".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_html_and_rejected_pdf() {
        let extractor = PassthroughExtractor;
        let html = extractor.extract_html(b"<p>hi</p>").await.unwrap();
        assert_eq!(html, "<p>hi</p>");

        let pdf = extractor.extract_pdf(b"%PDF-1.4").await;
        assert!(matches!(pdf, Err(Error::Validation(_))));
    }
}
