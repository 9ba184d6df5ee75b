//! HTTP API tests against a live server on a local port.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use story2test::config::Config;
use story2test::embedding::Embedder;
use story2test::oracle::{ChatMessage, Oracle};
use story2test::pipeline::Pipeline;
use story2test::server::router;

const ANSWER: &str = include_str!("fixtures/answer.md");

const SRS: &str = "Software Requirements Specification\n\
The cart shall hold at most 50 items.\nCheckout requires a logged-in user.\n";

struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
    }
}

struct FixedOracle;

#[async_trait]
impl Oracle for FixedOracle {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(ANSWER.to_string())
    }
}

struct DownOracle;

#[async_trait]
impl Oracle for DownOracle {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("chat completion error 503 Service Unavailable")
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Starts a server around a pipeline with the given oracle and returns its
/// base URL.
async fn start_server(tmp: &TempDir, oracle: Arc<dyn Oracle>) -> String {
    let port = find_free_port();
    let mut config = Config::minimal();
    config.output.dir = tmp.path().join("out");
    config.server.bind = format!("127.0.0.1:{}", port);

    let pipeline = Pipeline::new(config.clone(), Arc::new(LengthEmbedder), oracle).unwrap();
    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

fn upload(name: &str, text: &str) -> Value {
    json!({
        "documents": [{
            "name": name,
            "content_base64": base64::engine::general_purpose::STANDARD.encode(text),
        }]
    })
}

#[tokio::test]
async fn test_upload_generate_download() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp, Arc::new(FixedOracle)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["indexed"], false);

    // Nothing indexed yet
    let resp = client
        .post(format!("{}/generate", base))
        .json(&json!({ "story": "As a shopper I add items" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_document");

    let resp = client
        .post(format!("{}/documents", base))
        .json(&upload("srs.txt", SRS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["documents"], 1);
    assert!(summary["chunks"].as_u64().unwrap() >= 1);

    let resp = client
        .post(format!("{}/generate", base))
        .json(&json!({ "story": "As a shopper I add items", "count": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["query_seq"], 1);
    assert_eq!(report["cases"].as_array().unwrap().len(), 2);
    assert_eq!(report["cases"][1]["id"], "2");

    let resp = client
        .get(format!("{}/download/archive", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    let bytes = resp.bytes().await.unwrap().to_vec();
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 4);

    let text = client
        .get(format!("{}/download/text", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.starts_with("User Story:\n\nAs a shopper I add items\n"));
    assert!(text.contains("Test Case 2: Cart limit of 50 items"));

    let history: Value = client
        .get(format!("{}/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["exchanges"].as_array().unwrap().len(), 1);
    assert_eq!(history["exchanges"][0]["query"], "As a shopper I add items");
}

#[tokio::test]
async fn test_bad_requests() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp, Arc::new(FixedOracle)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .json(&upload("notes.txt", "Meeting notes, nothing else."))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not a Software Requirements Specification"));

    let resp = client
        .post(format!("{}/documents", base))
        .json(&json!({ "documents": [{ "name": "srs.txt", "content_base64": "***" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/documents", base))
        .json(&upload("srs.txt", SRS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/generate", base))
        .json(&json!({ "story": "story", "count": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/generate", base))
        .json(&json!({ "story": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // No generation yet, so nothing to download
    let resp = client
        .get(format!("{}/download/archive", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_oracle_failure_is_upstream_error() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp, Arc::new(DownOracle)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .json(&upload("srs.txt", SRS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/generate", base))
        .json(&json!({ "story": "As a shopper I add items" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream_error");

    let history: Value = client
        .get(format!("{}/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history["exchanges"].as_array().unwrap().is_empty());
}
