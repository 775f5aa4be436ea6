//! Pinecone serverless backend over the REST API.
//!
//! Control plane (`api.pinecone.io`) handles describe/create; each index has
//! its own data-plane host for upsert and query.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{IndexHandle, IndexSpec, MemoryError, Metric, VectorMemoryStore};
use crate::config::MemoryConfig;
use crate::models::{MemoryRecord, RecordMetadata, ScoredMatch};

pub const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";

const API_VERSION: &str = "2024-07";

/// Records per upsert request.
const UPSERT_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub control_url: String,
    pub cloud: String,
    pub region: String,
    pub namespace: Option<String>,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl PineconeConfig {
    pub fn from_settings(api_key: String, memory: &MemoryConfig) -> Self {
        Self {
            api_key,
            control_url: PINECONE_CONTROL_URL.to_string(),
            cloud: memory.cloud.clone(),
            region: memory.region.clone(),
            namespace: Some(memory.namespace.clone()).filter(|n| !n.is_empty()),
            poll_interval: Duration::from_millis(memory.readiness_poll_ms),
            max_poll_attempts: memory.readiness_max_attempts,
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
    metric: String,
    #[serde(default)]
    host: String,
    status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<RecordMetadata>,
}

// ============================================================================
// PineconeStore
// ============================================================================

pub struct PineconeStore {
    client: Client,
    config: PineconeConfig,
    handles: RwLock<HashMap<String, IndexHandle>>,
}

impl PineconeStore {
    pub fn new(config: PineconeConfig) -> Result<Self, MemoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MemoryError::IndexUnavailable {
                name: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            handles: RwLock::new(HashMap::new()),
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    /// `Ok(None)` when the index does not exist.
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, String> {
        let url = format!("{}/indexes/{}", self.config.control_url, name);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response
                .json::<IndexDescription>()
                .await
                .map(Some)
                .map_err(|e| e.to_string()),
            s => Err(format!("describe returned {}: {}", s, response.text().await.unwrap_or_default())),
        }
    }

    async fn create(&self, spec: &IndexSpec) -> Result<(), String> {
        tracing::info!(index = %spec.name, dimension = spec.dimension, metric = %spec.metric, "Creating Pinecone index");

        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric.as_str(),
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.config.cloud,
                    region: &self.config.region,
                },
            },
        };

        let response = self
            .authed(self.client.post(format!("{}/indexes", self.config.control_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                tracing::info!(index = %spec.name, "Index created concurrently, reusing it");
                Ok(())
            }
            s => Err(format!("create returned {}: {}", s, response.text().await.unwrap_or_default())),
        }
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription, String> {
        for attempt in 1..=self.config.max_poll_attempts {
            match self.describe(name).await? {
                Some(d) if d.status.ready && !d.host.is_empty() => return Ok(d),
                Some(d) => {
                    tracing::debug!(index = name, attempt, state = %d.status.state, "Index not ready yet");
                }
                None => {
                    tracing::debug!(index = name, attempt, "Index not visible yet");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(format!(
            "not ready after {} polls",
            self.config.max_poll_attempts
        ))
    }

    async fn resolve(&self, spec: &IndexSpec) -> Result<IndexDescription, String> {
        match self.describe(&spec.name).await? {
            Some(d) if d.status.ready && !d.host.is_empty() => Ok(d),
            Some(_) => self.wait_until_ready(&spec.name).await,
            None => {
                self.create(spec).await?;
                self.wait_until_ready(&spec.name).await
            }
        }
    }

    fn data_url(host: &str, path: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host.trim_end_matches('/'), path)
        } else {
            format!("https://{}{}", host, path)
        }
    }

    fn host<'a>(index: &'a IndexHandle) -> Result<&'a str, String> {
        index
            .host
            .as_deref()
            .ok_or_else(|| format!("index {} has no data-plane host", index.name))
    }

    async fn upsert_batch(&self, host: &str, batch: &[MemoryRecord]) -> Result<(), String> {
        let body = UpsertRequest {
            vectors: batch
                .iter()
                .map(|r| UpsertVector {
                    id: &r.id,
                    values: &r.vector,
                    metadata: &r.metadata,
                })
                .collect(),
            namespace: self.config.namespace.as_deref(),
        };

        let response = self
            .authed(self.client.post(Self::data_url(host, "/vectors/upsert")))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("upsert returned {}: {}", status, response.text().await.unwrap_or_default()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorMemoryStore for PineconeStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle, MemoryError> {
        if let Some(handle) = self.handles.read().await.get(&spec.name) {
            return Ok(handle.clone());
        }

        let description = self
            .resolve(spec)
            .await
            .map_err(|reason| MemoryError::IndexUnavailable {
                name: spec.name.clone(),
                reason,
            })?;

        let handle = IndexHandle {
            name: spec.name.clone(),
            dimension: description.dimension,
            metric: description.metric.parse().unwrap_or(spec.metric),
            host: Some(description.host),
        };
        tracing::info!(index = %handle.name, dimension = handle.dimension, "Pinecone index ready");

        self.handles
            .write()
            .await
            .insert(spec.name.clone(), handle.clone());
        Ok(handle)
    }

    async fn upsert(&self, index: &IndexHandle, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        for record in records {
            index.check_dimension(&record.vector)?;
        }
        let host = Self::host(index).map_err(|cause| MemoryError::UpsertFailed { written: 0, cause })?;

        let mut written = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            self.upsert_batch(host, batch)
                .await
                .map_err(|cause| MemoryError::UpsertFailed { written, cause })?;
            written += batch.len();
        }
        tracing::info!(index = %index.name, written, "Upserted records");
        Ok(())
    }

    async fn query(
        &self,
        index: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, MemoryError> {
        index.check_dimension(vector)?;
        let host = Self::host(index).map_err(MemoryError::QueryFailed)?;

        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.config.namespace.as_deref(),
        };

        let response = self
            .authed(self.client.post(Self::data_url(host, "/query")))
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::QueryFailed(format!("query returned {}: {}", status, body)));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
