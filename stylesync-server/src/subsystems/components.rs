//! Component wiring: builds every request-path collaborator once at start-up.
//!
//! A missing credential never aborts start-up: the affected component is
//! replaced by its disabled form and one warning is logged. Operator typos in
//! the config (unknown backend, unknown metric) do abort.

use std::str::FromStr;
use std::sync::Arc;

use stylesync_core::config::MemoryConfig;
use stylesync_core::error::require;
use stylesync_core::memory::{InMemoryStore, PgVectorStore, PineconeConfig, PineconeStore};
use stylesync_core::{
    Credentials, DisabledVision, DisabledWriter, EmbeddingProvider, GeminiVisionClient,
    GenerationStage, GroqListingWriter, IndexSpec, Metric, StyleSyncConfig, StyleSyncError,
    VectorMemoryStore, VisionStage, WriterConfig,
};

use super::notify::NotificationDispatcher;
use super::pipeline::CatalogPipeline;
use super::retrieve::{MemoryRetrievalService, RetrievalSettings};
use super::upload::UploadStore;

pub struct Components {
    pub pipeline: Arc<CatalogPipeline>,
    pub memory: Arc<MemoryRetrievalService>,
    pub uploads: Arc<UploadStore>,
}

pub async fn build_components(
    config: &StyleSyncConfig,
    credentials: &Credentials,
) -> Result<Components, StyleSyncError> {
    let upload_dir = config.http.upload_dir();
    std::fs::create_dir_all(&upload_dir)?;

    let embedder =
        EmbeddingProvider::from_settings(credentials.gemini_api_key.clone(), &config.embedding);
    let memory = Arc::new(build_memory(config, credentials, embedder).await?);

    let vision = build_vision(config, credentials);
    let writer = build_writer(config, credentials);
    let notifier =
        NotificationDispatcher::from_config(credentials.webhook_url.clone(), &config.notification);

    let pipeline = Arc::new(CatalogPipeline::new(vision, memory.clone(), writer, notifier));

    Ok(Components {
        pipeline,
        memory,
        uploads: Arc::new(UploadStore::new(upload_dir)),
    })
}

pub async fn build_memory(
    config: &StyleSyncConfig,
    credentials: &Credentials,
    embedder: EmbeddingProvider,
) -> Result<MemoryRetrievalService, StyleSyncError> {
    let settings = RetrievalSettings::from(&config.memory);
    let metric = Metric::from_str(&config.memory.metric)
        .map_err(|e| StyleSyncError::Other(e.to_string()))?;
    let spec = IndexSpec {
        name: config.memory.index_name.clone(),
        dimension: embedder.dimensions(),
        metric,
    };

    let store = match open_store(&config.memory, credentials).await? {
        Some(store) => store,
        None => return Ok(MemoryRetrievalService::disabled(embedder, settings)),
    };

    tracing::info!(
        backend = store.name(),
        index = %spec.name,
        dimension = spec.dimension,
        metric = %spec.metric,
        "Connecting trend memory"
    );
    Ok(MemoryRetrievalService::connect(store, embedder, spec, settings).await)
}

/// `Ok(None)` means the backend is configured but cannot be reached or has
/// no credentials; memory runs disabled.
async fn open_store(
    memory: &MemoryConfig,
    credentials: &Credentials,
) -> Result<Option<Arc<dyn VectorMemoryStore>>, StyleSyncError> {
    match memory.backend.as_str() {
        "pinecone" => {
            let api_key = match require(credentials.pinecone_api_key.clone(), "PINECONE_API_KEY") {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(error = %e, "Trend memory disabled");
                    return Ok(None);
                }
            };
            match PineconeStore::new(PineconeConfig::from_settings(api_key, memory)) {
                Ok(store) => Ok(Some(Arc::new(store))),
                Err(e) => {
                    tracing::warn!(error = %e, "Pinecone client unavailable, trend memory disabled");
                    Ok(None)
                }
            }
        }
        "pgvector" => {
            let url = match require(credentials.database_url.clone(), "DATABASE_URL") {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(error = %e, "Trend memory disabled");
                    return Ok(None);
                }
            };
            match PgVectorStore::connect(&url).await {
                Ok(store) => Ok(Some(Arc::new(store))),
                Err(e) => {
                    tracing::warn!(error = %e, "Postgres unavailable, trend memory disabled");
                    Ok(None)
                }
            }
        }
        "memory" => {
            tracing::info!("Using in-process trend memory (not persisted)");
            Ok(Some(Arc::new(InMemoryStore::new())))
        }
        other => Err(StyleSyncError::Other(format!(
            "unknown memory backend '{}' (expected pinecone, pgvector or memory)",
            other
        ))),
    }
}

pub fn build_vision(config: &StyleSyncConfig, credentials: &Credentials) -> Arc<dyn VisionStage> {
    let api_key = match require(credentials.gemini_api_key.clone(), "GEMINI_API_KEY") {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(error = %e, "Vision disabled, listings will use placeholder attributes");
            return Arc::new(DisabledVision);
        }
    };
    match GeminiVisionClient::new(api_key, config.vision.model.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Vision client unavailable, using placeholder attributes");
            Arc::new(DisabledVision)
        }
    }
}

pub fn build_writer(
    config: &StyleSyncConfig,
    credentials: &Credentials,
) -> Arc<dyn GenerationStage> {
    let api_key = match require(credentials.groq_api_key.clone(), "GROQ_API_KEY") {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(error = %e, "Generation disabled, listings will use the template");
            return Arc::new(DisabledWriter);
        }
    };
    let writer_config = WriterConfig {
        api_key,
        model: config.generation.model.clone(),
        temperature: config.generation.temperature,
    };
    match GroqListingWriter::new(writer_config) {
        Ok(writer) => Arc::new(writer),
        Err(e) => {
            tracing::warn!(error = %e, "Generation client unavailable, using the template");
            Arc::new(DisabledWriter)
        }
    }
}
