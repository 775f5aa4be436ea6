//! Embeddings for StyleSync trend memory
//!
//! - `EmbeddingBackend`: fallible provider trait, implemented by the Gemini
//!   `embedContent` client.
//! - `EmbeddingProvider`: the infallible wrapper every caller uses. It always
//!   yields a vector of exactly the configured dimension; upstream failures
//!   become an all-zero vector tagged `degraded`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::EmbeddingSettings;

/// Output dimension of `gemini-embedding-001`
pub const GEMINI_DIMENSIONS: usize = 3072;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini reads the key from this header. It never goes in the URL, because
/// transport errors print the request URL.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a document for storage.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a search query. Backends with task-type hints override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl EmbeddingConfig {
    pub fn from_settings(api_key: Option<String>, settings: &EmbeddingSettings) -> Self {
        Self {
            api_key: api_key.unwrap_or_default(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    model: String,
    content: GeminiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorResponse {
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) code: u16,
    pub(crate) message: String,
}

/// Extract `(code, message)` from a Gemini error body, falling back to the
/// HTTP status and raw body.
pub(crate) fn gemini_error(status: reqwest::StatusCode, body: String) -> (u16, String) {
    serde_json::from_str::<GeminiErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| (e.code, e.message))
        .unwrap_or((status.as_u16(), body))
}

// ============================================================================
// GeminiEmbeddingClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: EmbeddingConfig,
        base_url: String,
    ) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub async fn embed_with_task(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.embed_once(text, task_type)).await;

        match result {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.config.model
        );

        let request = GeminiRequest {
            model: format!("models/{}", self.config.model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            task_type: Some(task_type),
            output_dimensionality: Some(self.config.dimensions),
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = gemini_error(status, error_body);

            tracing::error!(code = code, message = %message, "Gemini embedding API error");

            return Err(EmbeddingError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let values = gemini_response.embedding.values;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_task(text, TaskType::RetrievalQuery).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// EmbeddingProvider
// ============================================================================

/// A vector of the provider's dimension. `degraded` marks the all-zero
/// placeholder produced when no real embedding was available.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub degraded: bool,
}

impl Embedding {
    pub fn zeros(dimensions: usize) -> Self {
        Self {
            values: vec![0.0; dimensions],
            degraded: true,
        }
    }
}

/// Never fails and never returns a vector of the wrong length.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Option<Arc<dyn EmbeddingBackend>>,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        let dimensions = backend.dimensions();
        Self {
            backend: Some(backend),
            dimensions,
        }
    }

    /// Provider with no backend: every call returns the zero vector.
    pub fn disabled(dimensions: usize) -> Self {
        Self {
            backend: None,
            dimensions,
        }
    }

    /// Build the Gemini-backed provider, or a disabled one if the key is
    /// missing or the client cannot be constructed.
    pub fn from_settings(api_key: Option<String>, settings: &EmbeddingSettings) -> Self {
        let config = EmbeddingConfig::from_settings(api_key, settings);
        match GeminiEmbeddingClient::new(config) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Embedding provider disabled, memory retrieval will return no matches"
                );
                Self::disabled(settings.dimensions)
            }
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().map(|b| b.name()).unwrap_or("disabled")
    }

    pub async fn embed(&self, text: &str) -> Embedding {
        match &self.backend {
            Some(backend) => self.checked(backend.embed(text).await),
            None => Embedding::zeros(self.dimensions),
        }
    }

    pub async fn embed_query(&self, text: &str) -> Embedding {
        match &self.backend {
            Some(backend) => self.checked(backend.embed_query(text).await),
            None => Embedding::zeros(self.dimensions),
        }
    }

    fn checked(&self, result: Result<Vec<f32>, EmbeddingError>) -> Embedding {
        match result {
            Ok(values) if values.len() == self.dimensions => Embedding {
                values,
                degraded: false,
            },
            Ok(values) => {
                tracing::warn!(
                    expected = self.dimensions,
                    actual = values.len(),
                    "Embedding backend returned wrong dimension, using zero vector"
                );
                Embedding::zeros(self.dimensions)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Embedding failed, using zero vector");
                Embedding::zeros(self.dimensions)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: api_key.to_string(),
            model: "gemini-embedding-001".to_string(),
            dimensions: GEMINI_DIMENSIONS,
            max_retries: 3,
            retry_delay_ms: 10,
        }
    }

    fn mock_embedding_response(dimensions: usize) -> serde_json::Value {
        let values: Vec<f32> = (0..dimensions)
            .map(|i| (i as f32) / dimensions as f32)
            .collect();
        serde_json::json!({
            "embedding": {
                "values": values
            }
        })
    }

    #[tokio::test]
    async fn test_embed_calls_api_and_returns_full_dimension_vector() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(header("content-type", "application/json"))
            .and(header("x-goog-api-key", "test-api-key"))
            .and(body_json(serde_json::json!({
                "model": "models/gemini-embedding-001",
                "content": { "parts": [{ "text": "vintage streetwear hoodie" }] },
                "taskType": "RETRIEVAL_QUERY",
                "outputDimensionality": GEMINI_DIMENSIONS
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(GEMINI_DIMENSIONS)),
            )
            .mount(&mock_server)
            .await;

        let embedding = client.embed_query("vintage streetwear hoodie").await.unwrap();
        assert_eq!(embedding.len(), GEMINI_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_embed_returns_retry_exhausted_on_api_500() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "Internal server error" }
            })))
            .mount(&mock_server)
            .await;

        match client.embed("hello world").await {
            Err(EmbeddingError::RetryExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Rate limit exceeded" }
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(GEMINI_DIMENSIONS)),
            )
            .mount(&mock_server)
            .await;

        let embedding = client.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), GEMINI_DIMENSIONS);
    }

    #[test]
    fn test_missing_api_key_rejected() {
        match GeminiEmbeddingClient::new(test_config("")) {
            Err(EmbeddingError::MissingApiKey) => {}
            other => panic!("Expected MissingApiKey, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_provider_returns_zero_vector_on_upstream_failure() {
        let mock_server = MockServer::start().await;
        let mut config = test_config("test-api-key");
        config.max_retries = 1;
        let client = GeminiEmbeddingClient::with_base_url(config, mock_server.uri()).unwrap();
        let provider = EmbeddingProvider::new(Arc::new(client));

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let embedding = provider.embed("hello").await;
        assert!(embedding.degraded);
        assert_eq!(embedding.values.len(), GEMINI_DIMENSIONS);
        assert!(embedding.values.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_provider_zero_vector_on_wrong_dimensions() {
        let mock_server = MockServer::start().await;
        let mut config = test_config("test-api-key");
        config.max_retries = 1;
        let client = GeminiEmbeddingClient::with_base_url(config, mock_server.uri()).unwrap();
        let provider = EmbeddingProvider::new(Arc::new(client));

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response(3)))
            .mount(&mock_server)
            .await;

        let embedding = provider.embed_query("hello").await;
        assert!(embedding.degraded);
        assert_eq!(embedding.values.len(), GEMINI_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_api_key_stays_out_of_request_url() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("SECRET-KEY-123"), mock_server.uri())
            .unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(GEMINI_DIMENSIONS)),
            )
            .mount(&mock_server)
            .await;

        client.embed("hello").await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.as_str().contains("SECRET-KEY-123"));
        assert_eq!(requests[0].url.query(), None);
        assert_eq!(
            requests[0].headers.get("x-goog-api-key").unwrap(),
            "SECRET-KEY-123"
        );
    }

    #[tokio::test]
    async fn test_provider_passes_through_success() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .unwrap();
        let provider = EmbeddingProvider::new(Arc::new(client));

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(GEMINI_DIMENSIONS)),
            )
            .mount(&mock_server)
            .await;

        let embedding = provider.embed("hello").await;
        assert!(!embedding.degraded);
        assert_eq!(embedding.values.len(), GEMINI_DIMENSIONS);
        assert_eq!(provider.backend_name(), "gemini");
    }

    #[tokio::test]
    async fn test_disabled_provider_without_key() {
        let provider = EmbeddingProvider::from_settings(None, &EmbeddingSettings::default());
        assert!(!provider.is_enabled());
        assert_eq!(provider.backend_name(), "disabled");

        let embedding = provider.embed("anything").await;
        assert!(embedding.degraded);
        assert_eq!(embedding.values, vec![0.0; GEMINI_DIMENSIONS]);
    }
}
