use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{cosine_similarity, IndexHandle, IndexSpec, MemoryError, Metric, VectorMemoryStore};
use crate::models::{MemoryRecord, ScoredMatch};

struct LocalIndex {
    handle: IndexHandle,
    records: Vec<MemoryRecord>,
}

/// Brute-force store held in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    indexes: RwLock<HashMap<String, LocalIndex>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map(|i| i.records.len())
            .unwrap_or(0)
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Metric::Euclidean => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl VectorMemoryStore for InMemoryStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle, MemoryError> {
        let mut indexes = self.indexes.write().await;
        let index = indexes.entry(spec.name.clone()).or_insert_with(|| {
            tracing::info!(index = %spec.name, dimension = spec.dimension, "Creating in-memory index");
            LocalIndex {
                handle: IndexHandle {
                    name: spec.name.clone(),
                    dimension: spec.dimension,
                    metric: spec.metric,
                    host: None,
                },
                records: Vec::new(),
            }
        });
        Ok(index.handle.clone())
    }

    async fn upsert(&self, index: &IndexHandle, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        for record in records {
            index.check_dimension(&record.vector)?;
        }
        let mut indexes = self.indexes.write().await;
        let local = indexes
            .get_mut(&index.name)
            .ok_or_else(|| MemoryError::UpsertFailed {
                written: 0,
                cause: format!("index {} does not exist", index.name),
            })?;

        for record in records {
            match local.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => local.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        index: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, MemoryError> {
        index.check_dimension(vector)?;
        let indexes = self.indexes.read().await;
        let local = indexes
            .get(&index.name)
            .ok_or_else(|| MemoryError::QueryFailed(format!("index {} does not exist", index.name)))?;

        let mut matches: Vec<ScoredMatch> = local
            .records
            .iter()
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                score: score(local.handle.metric, vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();
        // stable sort: ties keep insertion order
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;

    fn spec() -> IndexSpec {
        IndexSpec {
            name: "trends".to_string(),
            dimension: 2,
            metric: Metric::Cosine,
        }
    }

    fn record(id: &str, vector: [f32; 2], keywords: &str) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            metadata: RecordMetadata::new(keywords, id),
        }
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let store = InMemoryStore::new();
        let first = store.ensure_index(&spec()).await.unwrap();
        store
            .upsert(&first, &[record("a", [1.0, 0.0], "x")])
            .await
            .unwrap();

        let second = store.ensure_index(&spec()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len("trends").await, 1, "existing records kept");
    }

    #[tokio::test]
    async fn test_query_orders_by_score_and_caps() {
        let store = InMemoryStore::new();
        let index = store.ensure_index(&spec()).await.unwrap();
        store
            .upsert(
                &index,
                &[
                    record("far", [0.0, 1.0], "far"),
                    record("near", [1.0, 0.1], "near"),
                    record("mid", [1.0, 1.0], "mid"),
                ],
            )
            .await
            .unwrap();

        let matches = store.query(&index, &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let store = InMemoryStore::new();
        let index = store.ensure_index(&spec()).await.unwrap();
        store.upsert(&index, &[record("a", [1.0, 0.0], "old")]).await.unwrap();
        store.upsert(&index, &[record("a", [0.0, 1.0], "new")]).await.unwrap();

        assert_eq!(store.len("trends").await, 1);
        let matches = store.query(&index, &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(matches[0].metadata.keywords, vec!["new"]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension_before_writing() {
        let store = InMemoryStore::new();
        let index = store.ensure_index(&spec()).await.unwrap();
        let bad = MemoryRecord {
            id: "bad".to_string(),
            vector: vec![1.0, 0.0, 0.0],
            metadata: RecordMetadata::default(),
        };

        let err = store
            .upsert(&index, &[record("ok", [1.0, 0.0], "x"), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(store.len("trends").await, 0);
    }

    #[tokio::test]
    async fn test_query_rejects_wrong_dimension() {
        let store = InMemoryStore::new();
        let index = store.ensure_index(&spec()).await.unwrap();
        assert!(matches!(
            store.query(&index, &[1.0, 0.0, 0.0], 5).await,
            Err(MemoryError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_matches() {
        let store = InMemoryStore::new();
        let index = store.ensure_index(&spec()).await.unwrap();
        assert!(store.query(&index, &[1.0, 0.0], 5).await.unwrap().is_empty());
    }
}
