//! Document discovery behind a root URL.
//!
//! A root URL is classified into one of four kinds and expanded into the
//! set of document URLs it represents. Discovery is stateless and
//! idempotent: re-invocation against a stable upstream yields the same
//! list.

pub mod sitemap;

use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::HttpClient;

/// How a root URL expands into documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootKind {
    /// Root is a site base; the document list lives at `{base}/llms.txt`.
    LlmsTxt {
        /// Root with the `/` or `/index.html` suffix removed.
        base_url: String,
    },
    /// Root is itself an llms-full.txt list: one absolute URL per line.
    LlmsFullList,
    /// Root is a sitemap.xml (urlset or sitemapindex).
    Sitemap,
    /// Root is a single document.
    SingleUrl,
}

/// One discovered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute document URL.
    pub url: String,
    /// Pathname without the leading slash, or `"index"` when empty.
    pub path: String,
}

/// Classify a root URL by its suffix.
pub fn classify_root(root_url: &str) -> Result<RootKind> {
    let trimmed = root_url.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| Error::Classification(format!("invalid root URL '{trimmed}': {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::Classification(format!(
            "unsupported scheme '{}' in root URL",
            parsed.scheme()
        )));
    }

    if let Some(base) = trimmed.strip_suffix("/index.html") {
        return Ok(RootKind::LlmsTxt {
            base_url: base.to_string(),
        });
    }
    if let Some(base) = trimmed.strip_suffix('/') {
        return Ok(RootKind::LlmsTxt {
            base_url: base.to_string(),
        });
    }
    if trimmed.ends_with("llms-full.txt") {
        return Ok(RootKind::LlmsFullList);
    }
    if trimmed.ends_with("sitemap.xml") {
        return Ok(RootKind::Sitemap);
    }
    Ok(RootKind::SingleUrl)
}

/// Derive the document path for a URL: pathname without the leading slash,
/// `"index"` when the pathname is empty or `/`.
#[must_use]
pub fn path_for_url(url: &str) -> String {
    let pathname = Url::parse(url).map_or_else(|_| String::new(), |u| u.path().to_string());
    let trimmed = pathname.trim_start_matches('/');
    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Expands a classified root into its document list.
pub struct Discovery<'a> {
    http: &'a HttpClient,
    root_url: String,
    kind: RootKind,
}

impl<'a> Discovery<'a> {
    /// Build a discovery for an already classified root.
    #[must_use]
    pub fn new(http: &'a HttpClient, root_url: impl Into<String>, kind: RootKind) -> Self {
        Self {
            http,
            root_url: root_url.into(),
            kind,
        }
    }

    /// Classify `root_url` and build the discovery in one step.
    pub fn for_root(http: &'a HttpClient, root_url: &str) -> Result<Self> {
        let kind = classify_root(root_url)?;
        Ok(Self::new(http, root_url.trim(), kind))
    }

    /// The classification this discovery was built with.
    #[must_use]
    pub const fn kind(&self) -> &RootKind {
        &self.kind
    }

    /// Enumerate the document URLs the root represents.
    pub async fn list(&self) -> Result<Vec<DiscoveredFile>> {
        match &self.kind {
            RootKind::LlmsTxt { base_url } => {
                let list_url = format!("{base_url}/llms.txt");
                let body = self.fetch_listing(&list_url).await?;
                Ok(parse_url_lines(&body))
            },
            RootKind::LlmsFullList => {
                let body = self.fetch_listing(&self.root_url).await?;
                Ok(parse_url_lines(&body))
            },
            RootKind::Sitemap => {
                let urls = sitemap::fetch_sitemap(self.http, &self.root_url).await?;
                Ok(urls
                    .into_iter()
                    .map(|url| DiscoveredFile {
                        path: path_for_url(&url),
                        url,
                    })
                    .collect())
            },
            RootKind::SingleUrl => Ok(vec![DiscoveredFile {
                url: self.root_url.clone(),
                path: path_for_url(&self.root_url),
            }]),
        }
    }

    async fn fetch_listing(&self, url: &str) -> Result<String> {
        let body = self.http.fetch_with_retry(url).await?;
        String::from_utf8(body.bytes).map_err(|e| {
            Error::Classification(format!("listing at '{url}' is not valid UTF-8: {e}"))
        })
    }
}

/// Parse an llms.txt / llms-full.txt body: one absolute URL per trimmed
/// non-empty line. Comment lines and unparsable lines are skipped.
fn parse_url_lines(body: &str) -> Vec<DiscoveredFile> {
    let mut files = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Url::parse(line) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
                files.push(DiscoveredFile {
                    url: line.to_string(),
                    path: path_for_url(line),
                });
            },
            _ => {
                warn!(line, "skipping non-URL line in document listing");
            },
        }
    }
    debug!(count = files.len(), "parsed document listing");
    files
}
