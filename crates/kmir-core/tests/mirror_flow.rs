//! End-to-end mirror flows against a mock upstream and an in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kmir_core::{
    Actions, Db, HttpClient, KnowledgeDoc, KnowledgeSink, MirrorOptions, PassthroughExtractor,
    Reconciler, Settings, SystemClock,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink that records adds and removals so cascade order is observable.
#[derive(Default)]
struct RecordingSink {
    added: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    removed_sources: Mutex<Vec<String>>,
}

#[async_trait]
impl KnowledgeSink for RecordingSink {
    async fn add(&self, doc: KnowledgeDoc) -> kmir_core::Result<String> {
        let handle = format!("handle:{}", doc.url);
        self.added.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn remove(&self, handle: &str) -> kmir_core::Result<()> {
        self.removed.lock().unwrap().push(handle.to_string());
        Ok(())
    }

    async fn remove_by_source(&self, source_id: &str) -> kmir_core::Result<()> {
        self.removed_sources.lock().unwrap().push(source_id.to_string());
        Ok(())
    }
}

async fn actions_over(sink: Arc<RecordingSink>) -> anyhow::Result<Actions> {
    let db = Db::open_in_memory().await?;
    let reconciler = Reconciler::new(
        db,
        HttpClient::new()?,
        Arc::new(PassthroughExtractor),
        sink,
        Arc::new(SystemClock),
        "agent-1",
    );
    Ok(Actions::new(reconciler, Settings::default()))
}

async fn mount_doc(server: &MockServer, doc_path: &str, body: &str, etag: &str) {
    Mock::given(method("HEAD"))
        .and(path(doc_path.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", body.len().to_string().as_str())
                .insert_header("content-type", "text/plain")
                .insert_header("etag", etag),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(doc_path.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string(body.to_string()),
        )
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, doc_paths: &[&str]) {
    let listing: String = doc_paths
        .iter()
        .map(|p| format!("{}{p}\n", server.uri()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/llms-full.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .mount(server)
        .await;
}

#[tokio::test]
async fn mirror_quote_and_search_flow() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, &["/guide.txt"]).await;
    mount_doc(
        &server,
        "/guide.txt",
        "Neural Networks are cool. neural networks scale.",
        "\"g1\"",
    )
    .await;

    let sink = Arc::new(RecordingSink::default());
    let actions = actions_over(Arc::clone(&sink)).await?;
    let root = format!("{}/llms-full.txt", server.uri());
    let doc_url = format!("{}/guide.txt", server.uri());

    let mirrored = actions
        .mirror_source(
            None,
            &root,
            MirrorOptions {
                id: Some("guide".to_string()),
                ..MirrorOptions::default()
            },
        )
        .await;
    assert!(mirrored.success, "{}", mirrored.text);
    assert_eq!(sink.added.lock().unwrap().len(), 1);

    // Case-insensitive search preserves the original case of the hit.
    let hit = actions.get_quote(&doc_url, "find neural networks", None).await;
    assert!(hit.success);
    assert_eq!(hit.text, "Neural Networks");
    assert_eq!(hit.data["result"]["match"]["lineNumber"], 1);
    assert_eq!(hit.data["result"]["match"]["charPosition"], 0);

    let all = actions
        .get_quote(&doc_url, "how many times does neural networks appear", None)
        .await;
    assert!(all.success);
    assert_eq!(all.data["result"]["totalCount"], 2);

    Ok(())
}

#[tokio::test]
async fn reconcile_is_idempotent_against_stable_upstream() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, &["/a.txt"]).await;
    mount_doc(&server, "/a.txt", "Stable content.", "\"s1\"").await;

    let sink = Arc::new(RecordingSink::default());
    let actions = actions_over(Arc::clone(&sink)).await?;
    let root = format!("{}/llms-full.txt", server.uri());
    let options = || MirrorOptions {
        id: Some("stable".to_string()),
        ..MirrorOptions::default()
    };

    let first = actions.mirror_source(None, &root, options()).await;
    assert!(first.success);
    assert_eq!(first.data["outcome"]["status"], "reconciled");

    let second = actions.mirror_source(None, &root, options()).await;
    assert!(second.success);
    assert_eq!(second.data["outcome"]["status"], "up_to_date");
    assert_eq!(
        second.data["outcome"]["versionId"],
        first.data["outcome"]["versionId"]
    );

    // No second ingest reached the sink.
    assert_eq!(sink.added.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn remove_then_remirror_matches_a_fresh_mirror() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, &["/a.txt"]).await;
    mount_doc(&server, "/a.txt", "Doc body here.", "\"r1\"").await;

    let sink = Arc::new(RecordingSink::default());
    let actions = actions_over(Arc::clone(&sink)).await?;
    let root = format!("{}/llms-full.txt", server.uri());
    let doc_url = format!("{}/a.txt", server.uri());
    let options = || MirrorOptions {
        id: Some("redo".to_string()),
        ..MirrorOptions::default()
    };

    let first = actions.mirror_source(None, &root, options()).await;
    assert!(first.success);
    let first_version = first.data["outcome"]["versionId"].clone();

    let removed = actions.remove_source(None, "redo").await;
    assert!(removed.success);
    // Sink handles were removed as part of the cascade.
    assert_eq!(sink.removed.lock().unwrap().len(), 1);
    assert_eq!(sink.removed_sources.lock().unwrap().as_slice(), ["redo"]);

    let again = actions.mirror_source(None, &root, options()).await;
    assert!(again.success, "{}", again.text);
    assert_eq!(again.data["outcome"]["status"], "reconciled");
    assert_eq!(again.data["outcome"]["versionId"], first_version);

    let quote = actions.get_quote(&doc_url, "full text", None).await;
    assert!(quote.success);
    assert_eq!(quote.text, "Doc body here.");

    let listed = actions.list_documents(Some("redo")).await;
    assert_eq!(listed.data["documents"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn upstream_change_rolls_the_version_forward() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, &["/a.txt"]).await;
    mount_doc(&server, "/a.txt", "Old body.", "\"v1\"").await;

    let sink = Arc::new(RecordingSink::default());
    let actions = actions_over(Arc::clone(&sink)).await?;
    let root = format!("{}/llms-full.txt", server.uri());
    let doc_url = format!("{}/a.txt", server.uri());
    let options = || MirrorOptions {
        id: Some("rolling".to_string()),
        ..MirrorOptions::default()
    };

    let first = actions.mirror_source(None, &root, options()).await;
    assert!(first.success);

    server.reset().await;
    mount_listing(&server, &["/a.txt"]).await;
    mount_doc(&server, "/a.txt", "New body entirely.", "\"v2\"").await;

    // An explicit refresh bypasses the preview cache and cooldown.
    let second = actions.refresh_source(None, "rolling").await;
    assert!(second.success, "{}", second.text);
    assert_eq!(second.data["outcome"]["status"], "reconciled");
    assert_ne!(
        second.data["outcome"]["versionId"],
        first.data["outcome"]["versionId"]
    );

    // Quotes answer from the newest stored row.
    let quote = actions.get_quote(&doc_url, "full text", None).await;
    assert_eq!(quote.text, "New body entirely.");
    Ok(())
}
