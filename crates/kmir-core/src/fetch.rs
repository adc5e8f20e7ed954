//! HTTP fetching for probes and document ingestion.
//!
//! One shared `reqwest` client serves the whole core: HEAD metadata probes
//! (15 s timeout), ranged-GET fallbacks, and full document fetches (20 s
//! timeout) with exponential backoff on retryable network failures.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Timeout for full document fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for preview probes (HEAD and ranged GET).
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Retry schedule for retryable failures: 1 s, then 2 s, capped at 30 s.
const RETRY_INITIAL: Duration = Duration::from_secs(1);
const RETRY_MULTIPLIER: u32 = 2;
const RETRY_MAX: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;

/// Metadata extracted from a HEAD or ranged-GET response.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    /// HTTP status code.
    pub status: u16,
    /// Total size in bytes, from `Content-Length` or the `Content-Range`
    /// total on ranged responses.
    pub content_length: Option<u64>,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
    /// `ETag` header value.
    pub etag: Option<String>,
    /// `Last-Modified` header value.
    pub last_modified: Option<String>,
}

/// A fetched response body with its declared content type.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// Raw response bytes.
    pub bytes: Vec<u8>,
    /// `Content-Type` header value, if the server sent one.
    pub content_type: Option<String>,
}

/// Shared HTTP client for probing and fetching.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build the client with default timeouts.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("kmir/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Issue a HEAD request and collect preview metadata.
    ///
    /// Probe paths never retry; the caller substitutes a placeholder
    /// preview on failure.
    pub async fn head(&self, url: &str) -> Result<HeadInfo> {
        let response = self
            .client
            .head(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(Error::Network)?;
        Ok(head_info_from(&response, false))
    }

    /// Issue `GET Range: bytes=0-0` and collect the same metadata.
    ///
    /// Used when HEAD fails, is unsupported (405/501), or omits
    /// `Content-Length`. The `Content-Range` total takes precedence.
    pub async fn ranged_head(&self, url: &str) -> Result<HeadInfo> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(Error::Network)?;
        Ok(head_info_from(&response, true))
    }

    /// Fetch a document body, retrying retryable failures with backoff.
    ///
    /// Non-success statuses are errors: 404 maps to [`Error::NotFound`],
    /// everything else to [`Error::HttpStatus`]. Only retryable errors
    /// (timeouts, connection failures, 408/429/5xx) re-attempt.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<FetchedBody> {
        let mut delay = RETRY_INITIAL;
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * RETRY_MULTIPLIER).min(RETRY_MAX);
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetch a document body in a single attempt (no retries). Used for
    /// bodies not known to be text, where a retry rarely helps.
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody> {
        self.fetch_once(url).await
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedBody> {
        let response = self.client.get(url).send().await.map_err(Error::Network)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("resource not found at '{url}'")));
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = header_string(&response, CONTENT_TYPE.as_str());
        let bytes = response.bytes().await.map_err(Error::Network)?.to_vec();
        debug!(url, bytes = bytes.len(), "fetched document body");
        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }
}

fn head_info_from(response: &Response, ranged: bool) -> HeadInfo {
    let content_length = if ranged {
        content_range_total(response).or_else(|| header_u64(response, CONTENT_LENGTH.as_str()))
    } else {
        header_u64(response, CONTENT_LENGTH.as_str())
    };

    HeadInfo {
        status: response.status().as_u16(),
        content_length,
        content_type: header_string(response, CONTENT_TYPE.as_str()),
        etag: header_string(response, ETAG.as_str()),
        last_modified: header_string(response, LAST_MODIFIED.as_str()),
    }
}

/// Total from `Content-Range: bytes 0-0/N`.
fn content_range_total(response: &Response) -> Option<u64> {
    let value = header_string(response, CONTENT_RANGE.as_str())?;
    let total = value.rsplit('/').next()?;
    total.trim().parse().ok()
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    header_string(response, name).and_then(|v| v.trim().parse().ok())
}
