//! End-to-end pipeline tests against mocked Gemini, Groq and webhook
//! endpoints, with trend memory held in process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use stylesync_core::memory::InMemoryStore;
use stylesync_core::models::RecordMetadata;
use stylesync_core::{
    EmbeddingConfig, EmbeddingProvider, GeminiEmbeddingClient, GeminiVisionClient,
    GroqListingWriter, IndexSpec, MemoryRecord, Metric, PipelineStatus, VectorMemoryStore,
    WriterConfig,
};
use stylesync_server::subsystems::notify::NotificationDispatcher;
use stylesync_server::subsystems::pipeline::CatalogPipeline;
use stylesync_server::subsystems::retrieve::{MemoryRetrievalService, RetrievalSettings};
use stylesync_server::subsystems::upload::UploadStore;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIM: usize = 4;
const VISION_PATH: &str = "/models/gemini-1.5-flash:generateContent";
const EMBED_PATH: &str = "/models/gemini-embedding-001:embedContent";

fn spec() -> IndexSpec {
    IndexSpec {
        name: "stylesync-test".to_string(),
        dimension: DIM,
        metric: Metric::Cosine,
    }
}

/// A record whose cosine similarity with `[1, 0, 0, 0]` is `cos`.
fn at_similarity(id: &str, cos: f32, keywords: &str) -> MemoryRecord {
    MemoryRecord {
        id: id.to_string(),
        vector: vec![cos, (1.0 - cos * cos).sqrt(), 0.0, 0.0],
        metadata: RecordMetadata::new(keywords, id),
    }
}

async fn mount_vision_ok(server: &MockServer) {
    let attributes = json!({
        "main_color": "Washed Black",
        "product_type": "Hoodie",
        "design_style": "Vintage Streetwear",
        "visual_features": ["oversized fit", "kangaroo pocket"]
    });
    Mock::given(method("POST"))
        .and(path(VISION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{
                "text": format!("```json\n{}\n```", attributes)
            }] } }]
        })))
        .mount(server)
        .await;
}

async fn mount_embedding(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": { "values": [1.0, 0.0, 0.0, 0.0] } })),
        )
        .mount(server)
        .await;
}

async fn mount_writer(server: &MockServer) {
    let listing = json!({
        "title": "Washed Black Vintage Streetwear Hoodie",
        "description": "Heavyweight comfort with a lived-in wash.",
        "features": ["Oversized fit", "Kangaroo pocket", "Heavyweight cotton"],
        "price_estimate": "$55-$75"
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": listing.to_string() } }]
        })))
        .mount(server)
        .await;
}

async fn memory(server: &MockServer) -> Arc<MemoryRetrievalService> {
    let store = Arc::new(InMemoryStore::new());
    let index = store.ensure_index(&spec()).await.unwrap();
    store
        .upsert(
            &index,
            &[
                at_similarity("trend_streetwear_01", 0.62, "streetwear, y2k fashion, distressed"),
                at_similarity("trend_gorpcore_01", 0.4, "gorpcore, techwear"),
            ],
        )
        .await
        .unwrap();

    let embedder = GeminiEmbeddingClient::with_base_url(
        EmbeddingConfig {
            api_key: "test-key".to_string(),
            model: "gemini-embedding-001".to_string(),
            dimensions: DIM,
            max_retries: 0,
            retry_delay_ms: 1,
        },
        server.uri(),
    )
    .unwrap();

    Arc::new(
        MemoryRetrievalService::connect(
            store,
            EmbeddingProvider::new(Arc::new(embedder)),
            spec(),
            RetrievalSettings::default(),
        )
        .await,
    )
}

async fn pipeline(server: &MockServer, notifier: Option<NotificationDispatcher>) -> CatalogPipeline {
    let vision = GeminiVisionClient::with_base_url(
        "test-key".to_string(),
        "gemini-1.5-flash".to_string(),
        server.uri(),
    )
    .unwrap();
    let writer = GroqListingWriter::with_base_url(
        WriterConfig {
            api_key: "test-key".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
        },
        server.uri(),
    )
    .unwrap();

    CatalogPipeline::new(Arc::new(vision), memory(server).await, Arc::new(writer), notifier)
}

// ===========================================================================
// TEST 1: all upstreams healthy: success, trend keywords, webhook before return
// ===========================================================================
#[tokio::test]
async fn test_full_pipeline_notifies_before_returning() {
    let server = MockServer::start().await;
    mount_vision_ok(&server).await;
    mount_embedding(&server).await;
    mount_writer(&server).await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier =
        NotificationDispatcher::new(format!("{}/webhook", server.uri()), Duration::from_secs(2))
            .unwrap();
    let pipeline = pipeline(&server, Some(notifier)).await;

    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"\xFF\xD8\xFFhoodie", Some("hoodie.jpg"), Some("image/jpeg"))
        .await
        .unwrap();

    let result = pipeline.run(&upload).await.unwrap();

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.visual_data.product_type, "Hoodie");
    assert_eq!(result.listing.price_estimate, "$55-$75");
    let mut keywords = result.seo_keywords.clone();
    keywords.sort();
    assert_eq!(keywords, vec!["distressed", "streetwear", "y2k fashion"]);

    // The webhook call has already landed by the time run() returns.
    let requests = server.received_requests().await.unwrap();
    let webhook = requests
        .iter()
        .find(|r| r.url.path() == "/webhook")
        .expect("webhook was not called before returning");
    let sent: serde_json::Value = serde_json::from_slice(&webhook.body).unwrap();
    assert_eq!(sent, serde_json::to_value(&result).unwrap());

    // The writer saw the retrieved keywords.
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/chat/completions")
        .unwrap();
    let chat_body = String::from_utf8_lossy(&chat.body);
    assert!(chat_body.contains("y2k fashion"));
    assert!(!chat_body.contains("gorpcore"));
}

// ===========================================================================
// TEST 2: vision fails: writer still gets well-formed attributes, partial
// ===========================================================================
#[tokio::test]
async fn test_vision_failure_still_produces_listing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VISION_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "model overloaded" }
        })))
        .mount(&server)
        .await;
    mount_embedding(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Unidentified Item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content":
                "{\"title\":\"Everyday Essential\",\"description\":\"A staple.\",\"features\":[],\"price_estimate\":\"$20-$30\"}"
            } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, None).await;
    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"bytes", Some("x.png"), None)
        .await
        .unwrap();

    let result = pipeline.run(&upload).await.unwrap();
    assert_eq!(result.status, PipelineStatus::Partial);
    assert_eq!(result.visual_data.main_color, "Unknown");
    assert_eq!(result.visual_data.product_type, "Unidentified Item");
    assert_eq!(result.listing.title, "Everyday Essential");
}

// ===========================================================================
// TEST 3: every upstream down: still a complete, well-formed result
// ===========================================================================
#[tokio::test]
async fn test_all_upstreams_failing_degrades_gracefully() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, None).await;
    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"bytes", None, None)
        .await
        .unwrap();

    let result = pipeline.run(&upload).await.unwrap();
    assert_eq!(result.status, PipelineStatus::Partial);
    assert!(result.seo_keywords.is_empty());
    assert!(!result.listing.title.is_empty());
    assert_eq!(result.listing.price_estimate, "N/A");
}

// ===========================================================================
// TEST 4: slow webhook: bounded by the dispatcher timeout
// ===========================================================================
#[tokio::test]
async fn test_slow_webhook_returns_within_bound() {
    let server = MockServer::start().await;
    mount_vision_ok(&server).await;
    mount_embedding(&server).await;
    mount_writer(&server).await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let notifier = NotificationDispatcher::new(
        format!("{}/webhook", server.uri()),
        Duration::from_millis(300),
    )
    .unwrap();
    let pipeline = pipeline(&server, Some(notifier)).await;

    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"bytes", None, None)
        .await
        .unwrap();

    let started = Instant::now();
    let result = pipeline.run(&upload).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.status, PipelineStatus::Success);
}

// ===========================================================================
// TEST 5: unreachable webhook: result still returned
// ===========================================================================
#[tokio::test]
async fn test_unreachable_webhook_does_not_fail_request() {
    let server = MockServer::start().await;
    mount_vision_ok(&server).await;
    mount_embedding(&server).await;
    mount_writer(&server).await;

    let notifier =
        NotificationDispatcher::new("http://127.0.0.1:9/webhook", Duration::from_secs(2)).unwrap();
    let pipeline = pipeline(&server, Some(notifier)).await;

    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"bytes", None, None)
        .await
        .unwrap();

    let started = Instant::now();
    let result = pipeline.run(&upload).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.status, PipelineStatus::Success);
}

// ===========================================================================
// TEST 6: unreadable upload: fatal, vision never called
// ===========================================================================
#[tokio::test]
async fn test_unreadable_upload_never_reaches_vision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VISION_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, None).await;
    let dir = tempfile::tempdir().unwrap();
    let upload = UploadStore::new(dir.path())
        .store(b"bytes", None, None)
        .await
        .unwrap();
    std::fs::remove_file(upload.path()).unwrap();

    let err = pipeline.run(&upload).await.unwrap_err();
    assert_eq!(err.kind(), "FileAccessError");
}
