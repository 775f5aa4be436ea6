//! Retrieval subsystem: trend keywords for a product query
//!
//! Wraps a `VectorMemoryStore` index with the retrieval policy:
//! - Embeds the query (`RETRIEVAL_QUERY` task type)
//! - Asks the store for the `top_k` nearest trend records
//! - Keeps only matches scoring strictly above the relevance threshold
//! - Flattens their keywords, drops duplicates, caps the list
//!
//! Retrieval is optional for a listing: every failure degrades to an empty
//! keyword list and is logged, never returned.

use std::collections::HashSet;
use std::sync::Arc;

use stylesync_core::config::MemoryConfig;
use stylesync_core::memory::{IndexHandle, IndexSpec, MemoryError, VectorMemoryStore};
use stylesync_core::models::{MemoryRecord, RecordMetadata, ScoredMatch};
use stylesync_core::EmbeddingProvider;

use super::seed::TrendEntry;

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub relevance_threshold: f32,
    pub max_keywords: usize,
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.5,
            max_keywords: 10,
            top_k: 5,
        }
    }
}

impl From<&MemoryConfig> for RetrievalSettings {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            relevance_threshold: config.relevance_threshold,
            max_keywords: config.max_keywords,
            top_k: config.top_k,
        }
    }
}

struct Backing {
    store: Arc<dyn VectorMemoryStore>,
    index: IndexHandle,
}

pub struct MemoryRetrievalService {
    backing: Option<Backing>,
    embedder: EmbeddingProvider,
    settings: RetrievalSettings,
}

impl MemoryRetrievalService {
    /// Resolve the index once. If that fails the service runs without memory.
    pub async fn connect(
        store: Arc<dyn VectorMemoryStore>,
        embedder: EmbeddingProvider,
        spec: IndexSpec,
        settings: RetrievalSettings,
    ) -> Self {
        let backing = match store.ensure_index(&spec).await {
            Ok(index) => {
                if index.dimension != embedder.dimensions() {
                    tracing::warn!(
                        index = %index.name,
                        index_dimension = index.dimension,
                        embedding_dimension = embedder.dimensions(),
                        "Existing index dimension differs from the embedding model, queries will fail"
                    );
                }
                Some(Backing { store, index })
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = store.name(),
                    "Memory index unavailable, continuing without trend memory"
                );
                None
            }
        };

        Self {
            backing,
            embedder,
            settings,
        }
    }

    /// A service with no backing index; always retrieves nothing.
    pub fn disabled(embedder: EmbeddingProvider, settings: RetrievalSettings) -> Self {
        Self {
            backing: None,
            embedder,
            settings,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backing.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.backing
            .as_ref()
            .map(|b| b.store.name())
            .unwrap_or("disabled")
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub async fn retrieve_keywords(&self, query_text: &str, top_k: usize) -> Vec<String> {
        let Some(backing) = &self.backing else {
            return Vec::new();
        };

        tracing::info!(query = query_text, top_k, "Searching trend memory");

        let embedding = self.embedder.embed_query(query_text).await;
        if embedding.degraded {
            tracing::warn!("Query embedding unavailable, skipping memory search");
            return Vec::new();
        }

        match backing.store.query(&backing.index, &embedding.values, top_k).await {
            Ok(matches) => {
                let keywords = extract_keywords(
                    &matches,
                    self.settings.relevance_threshold,
                    self.settings.max_keywords,
                );
                tracing::info!(
                    matches = matches.len(),
                    keywords = keywords.len(),
                    "Trend memory search complete"
                );
                keywords
            }
            Err(e) => {
                tracing::error!(error = %e, index = %backing.index.name, "Trend memory search failed");
                Vec::new()
            }
        }
    }

    /// Embed and upsert trend entries. Entries whose embedding is degraded
    /// are skipped. Returns the number of records written.
    pub async fn seed(&self, entries: &[TrendEntry]) -> Result<usize, MemoryError> {
        let backing = self.backing.as_ref().ok_or_else(|| MemoryError::IndexUnavailable {
            name: String::new(),
            reason: "no memory index configured".to_string(),
        })?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let embedding = self.embedder.embed(entry.text).await;
            if embedding.degraded {
                tracing::warn!(id = entry.id, "Skipping trend entry: embedding unavailable");
                continue;
            }
            records.push(MemoryRecord {
                id: entry.id.to_string(),
                vector: embedding.values,
                metadata: RecordMetadata::new(entry.keywords, entry.text),
            });
        }

        if records.is_empty() {
            return Ok(0);
        }
        backing.store.upsert(&backing.index, &records).await?;
        Ok(records.len())
    }
}

/// Keywords from every match scoring strictly above `threshold`, in match
/// order, without duplicates, at most `cap` of them.
pub fn extract_keywords(matches: &[ScoredMatch], threshold: f32, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .filter(|m| m.score > threshold)
        .flat_map(|m| m.metadata.keywords.iter())
        .filter(|k| seen.insert(k.as_str()))
        .take(cap)
        .cloned()
        .collect()
}
