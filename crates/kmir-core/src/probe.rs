//! Cheap size/etag/last-modified probing of discovered URLs.
//!
//! Each URL gets a HEAD request; when HEAD fails, is unsupported, or omits
//! `Content-Length`, a `GET Range: bytes=0-0` fallback runs. Probe failures
//! never drop an entry: they yield a placeholder preview with a zero size
//! estimate, so the version hash still sees every discovered file.

use tracing::debug;

use crate::discovery::DiscoveredFile;
use crate::fetch::{HeadInfo, HttpClient};
use crate::types::{FilePreview, SourcePreview};

/// Content type recorded when no probe attempt produced one.
const UNKNOWN_CONTENT_TYPE: &str = "unknown";

/// Probes discovered files into a [`SourcePreview`].
pub struct PreviewProbe<'a> {
    http: &'a HttpClient,
}

impl<'a> PreviewProbe<'a> {
    /// Build a probe over the shared HTTP client.
    #[must_use]
    pub const fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// Probe every discovered file and sum the size estimates.
    pub async fn probe(&self, source_id: &str, files: &[DiscoveredFile]) -> SourcePreview {
        let mut previews = Vec::with_capacity(files.len());
        for file in files {
            previews.push(self.probe_file(file).await);
        }
        let total_bytes = previews.iter().map(|p| p.est_bytes).sum();
        SourcePreview {
            source_id: source_id.to_string(),
            total_bytes,
            files: previews,
        }
    }

    /// Probe one file; never fails, never retries.
    pub async fn probe_file(&self, file: &DiscoveredFile) -> FilePreview {
        match self.http.head(&file.url).await {
            Ok(info) if usable_head(&info) => preview_from(file, &info),
            Ok(info) => {
                debug!(
                    url = %file.url,
                    status = info.status,
                    "HEAD unusable, falling back to ranged GET"
                );
                self.ranged_fallback(file).await
            },
            Err(err) => {
                debug!(url = %file.url, error = %err, "HEAD failed, falling back to ranged GET");
                self.ranged_fallback(file).await
            },
        }
    }

    async fn ranged_fallback(&self, file: &DiscoveredFile) -> FilePreview {
        match self.http.ranged_head(&file.url).await {
            Ok(info) if (200..300).contains(&info.status) && info.content_length.is_some() => {
                preview_from(file, &info)
            },
            Ok(info) => {
                debug!(url = %file.url, status = info.status, "ranged probe unusable");
                placeholder(file)
            },
            Err(err) => {
                debug!(url = %file.url, error = %err, "ranged probe failed");
                placeholder(file)
            },
        }
    }
}

/// A HEAD answer is usable when it succeeded and reported a size.
fn usable_head(info: &HeadInfo) -> bool {
    (200..300).contains(&info.status) && info.content_length.is_some()
}

fn preview_from(file: &DiscoveredFile, info: &HeadInfo) -> FilePreview {
    FilePreview {
        url: file.url.clone(),
        path: file.path.clone(),
        est_bytes: info.content_length.unwrap_or(0),
        content_type: info
            .content_type
            .clone()
            .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string()),
        etag: info.etag.clone(),
        last_modified: info.last_modified.clone(),
    }
}

fn placeholder(file: &DiscoveredFile) -> FilePreview {
    FilePreview {
        url: file.url.clone(),
        path: file.path.clone(),
        est_bytes: 0,
        content_type: UNKNOWN_CONTENT_TYPE.to_string(),
        etag: None,
        last_modified: None,
    }
}
