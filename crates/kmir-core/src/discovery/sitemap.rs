//! Sitemap XML parsing for document discovery.
//!
//! Handles both W3C sitemap 0.9 forms: `<urlset>` with `<url><loc>` entries
//! and `<sitemapindex>` with `<sitemap><loc>` children (fetched recursively
//! with bounded depth). Only `<loc>` matters to the mirror; modification
//! hints are ignored. Text content is entity-decoded.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fetch::HttpClient;

/// Maximum recursion depth for sitemap index files.
const MAX_INDEX_DEPTH: u8 = 2;

/// Maximum number of child sitemaps fetched from one index.
const MAX_CHILD_SITEMAPS: usize = 50;

/// Parsed sitemap content: either document URLs or child sitemap URLs.
#[derive(Debug, PartialEq, Eq)]
enum SitemapContent {
    /// `<urlset>` entries.
    Urls(Vec<String>),
    /// `<sitemapindex>` children.
    Index(Vec<String>),
}

/// Whether the XML is a sitemap index rather than a urlset.
#[must_use]
pub fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

/// Parse a standard `<urlset>` sitemap into its `<loc>` URLs.
///
/// Returns an error for sitemap indices; use [`fetch_sitemap`] when the
/// content might be an index.
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>> {
    match parse_content(xml)? {
        SitemapContent::Urls(urls) => Ok(urls),
        SitemapContent::Index(_) => Err(Error::Classification(
            "XML is a sitemap index, not a urlset".to_string(),
        )),
    }
}

/// Fetch and parse a sitemap, following index files recursively.
pub async fn fetch_sitemap(http: &HttpClient, url: &str) -> Result<Vec<String>> {
    fetch_recursive(http, url.to_string(), 0).await
}

/// `Box::pin` keeps the recursive future sized and `Send`.
fn fetch_recursive(
    http: &HttpClient,
    url: String,
    depth: u8,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<String>>> + Send + '_>> {
    Box::pin(async move {
        if depth > MAX_INDEX_DEPTH {
            return Err(Error::Classification(format!(
                "sitemap index recursion exceeded depth {MAX_INDEX_DEPTH}"
            )));
        }

        debug!(%url, depth, "fetching sitemap");
        let body = http.fetch_with_retry(&url).await?;
        let xml = String::from_utf8_lossy(&body.bytes).into_owned();

        match parse_content(&xml)? {
            SitemapContent::Urls(urls) => Ok(urls),
            SitemapContent::Index(children) => {
                let mut all = Vec::new();
                for child in children.into_iter().take(MAX_CHILD_SITEMAPS) {
                    match fetch_recursive(http, child.clone(), depth + 1).await {
                        Ok(urls) => all.extend(urls),
                        Err(e) => {
                            // One broken child must not sink the whole index.
                            warn!(child = %child, error = %e, "failed to fetch child sitemap");
                        },
                    }
                }
                Ok(all)
            },
        }
    })
}

fn parse_content(xml: &str) -> Result<SitemapContent> {
    let index = is_sitemap_index(xml);
    let entry_tag = if index { "sitemap" } else { "url" };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locs = Vec::new();
    let mut in_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == entry_tag {
                    in_entry = true;
                } else if name == "loc" && in_entry {
                    in_loc = true;
                }
            },
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == entry_tag {
                    in_entry = false;
                } else if name == "loc" {
                    in_loc = false;
                }
            },
            Ok(Event::Text(e)) => {
                if in_loc {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::Classification(format!("bad sitemap entity: {e}")))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        locs.push(text.to_string());
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Classification(format!("sitemap XML parse error: {e}")));
            },
            _ => {},
        }
        buf.clear();
    }

    if index {
        Ok(SitemapContent::Index(locs))
    } else {
        Ok(SitemapContent::Urls(locs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/page1</loc><lastmod>2024-01-15</lastmod></url>
  <url><loc>https://example.com/page2</loc></url>
</urlset>"#;

        let urls = parse_sitemap(xml).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/page1".to_string(),
                "https://example.com/page2".to_string()
            ]
        );
    }

    #[test]
    fn decodes_xml_entities_in_loc() {
        let xml = r#"<urlset>
  <url><loc>https://example.com/q?a=1&amp;b=&quot;two&quot;&apos;s &lt;page&gt;</loc></url>
</urlset>"#;

        let urls = parse_sitemap(xml).unwrap();
        assert_eq!(urls, vec![
            "https://example.com/q?a=1&b=\"two\"'s <page>".to_string()
        ]);
    }

    #[test]
    fn urlset_parser_rejects_index() {
        let xml = r#"<sitemapindex>
  <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
</sitemapindex>"#;

        assert!(parse_sitemap(xml).is_err());
        assert!(is_sitemap_index(xml));
    }

    #[test]
    fn malformed_xml_is_a_classification_error() {
        let result = parse_sitemap("<urlset><url><loc>https://x</url>");
        assert!(matches!(result, Err(Error::Classification(_))));
    }

    #[tokio::test]
    async fn index_fetch_unions_children() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let index = format!(
            "<sitemapindex>\
             <sitemap><loc>{0}/sitemap-a.xml</loc></sitemap>\
             <sitemap><loc>{0}/sitemap-b.xml</loc></sitemap>\
             </sitemapindex>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-a.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urlset><url><loc>https://x.dev/a</loc></url></urlset>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-b.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urlset><url><loc>https://x.dev/b</loc></url></urlset>",
            ))
            .mount(&server)
            .await;

        let http = HttpClient::new()?;
        let urls = fetch_sitemap(&http, &format!("{}/sitemap.xml", server.uri())).await?;

        assert_eq!(urls, vec!["https://x.dev/a".to_string(), "https://x.dev/b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn broken_child_is_skipped() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let index = format!(
            "<sitemapindex>\
             <sitemap><loc>{0}/gone.xml</loc></sitemap>\
             <sitemap><loc>{0}/ok.xml</loc></sitemap>\
             </sitemapindex>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urlset><url><loc>https://x.dev/kept</loc></url></urlset>",
            ))
            .mount(&server)
            .await;

        let http = HttpClient::new()?;
        let urls = fetch_sitemap(&http, &format!("{}/sitemap.xml", server.uri())).await?;

        assert_eq!(urls, vec!["https://x.dev/kept".to_string()]);
        Ok(())
    }
}
