//! Vector memory: named indexes of `(vector, metadata)` records with
//! create-if-absent, upsert and similarity query.
//!
//! Backends:
//! - [`PineconeStore`]: Pinecone serverless over REST
//! - [`PgVectorStore`]: Postgres + pgvector
//! - [`InMemoryStore`]: process-local brute force, for development and tests
//!
//! An existing index is reused as-is: its dimension and metric are not
//! compared with the caller's [`IndexSpec`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MemoryRecord, ScoredMatch};

pub mod in_memory;
pub mod pinecone;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use pinecone::{PineconeConfig, PineconeStore};
pub use postgres::PgVectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::DotProduct => "dotproduct",
            Metric::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "dotproduct" | "dot_product" => Ok(Metric::DotProduct),
            "euclidean" => Ok(Metric::Euclidean),
            other => Err(MemoryError::UnsupportedMetric(other.to_string())),
        }
    }
}

/// What the caller wants the index to look like if it has to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// A ready index. `host` is the data-plane address for backends that have one.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHandle {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub host: Option<String>,
}

impl IndexHandle {
    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), MemoryError> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Index {name} unavailable: {reason}")]
    IndexUnavailable { name: String, reason: String },

    #[error("Upsert failed after {written} records: {cause}")]
    UpsertFailed { written: usize, cause: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid index name: {0}")]
    InvalidIndexName(String),

    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),
}

#[async_trait]
pub trait VectorMemoryStore: Send + Sync {
    /// Create the index if absent and wait until it is ready; return the
    /// existing one unchanged otherwise.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle, MemoryError>;

    /// Write records, replacing any with the same id. Not atomic across the
    /// batch.
    async fn upsert(&self, index: &IndexHandle, records: &[MemoryRecord]) -> Result<(), MemoryError>;

    /// Up to `top_k` nearest records, highest score first. Tie order is
    /// backend-defined.
    async fn query(
        &self,
        index: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, MemoryError>;

    fn name(&self) -> &str;
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}
