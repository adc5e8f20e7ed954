//! Version identity for source previews.
//!
//! A version id is the SHA-256 of every probed attribute of every file in
//! the preview, folded in path order. The hash is content-independent: it
//! changes when any file's url, path, size estimate, etag or last-modified
//! changes, or when a file appears or disappears, and it is stable under
//! reordering of the file list.

use sha2::{Digest, Sha256};

use crate::types::FilePreview;

/// Compute the 64-char lowercase hex version id for a file set.
#[must_use]
pub fn compute_version_id(files: &[FilePreview]) -> String {
    let mut sorted: Vec<&FilePreview> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.url.cmp(&b.url)));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.url.as_bytes());
        hasher.update(b"|");
        hasher.update(file.path.as_bytes());
        hasher.update(b"|");
        hasher.update(file.est_bytes.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(file.etag.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"|");
        hasher.update(file.last_modified.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"||");
    }
    hasher.update(format!("count:{}", files.len()).as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a re-sync is needed: no local active version, or a differing
/// remote hash.
#[must_use]
pub fn needs_update(local: Option<&str>, remote: &str) -> bool {
    local != Some(remote)
}
