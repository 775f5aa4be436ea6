//! Postgres + pgvector backend. Each index is a table
//! `(id TEXT PRIMARY KEY, embedding vector(D), keywords TEXT, text TEXT)`;
//! search is exact (sequential scan), ordered by the metric's distance operator.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{IndexHandle, IndexSpec, MemoryError, Metric, VectorMemoryStore};
use crate::models::{record::split_keywords, MemoryRecord, RecordMetadata, ScoredMatch};

pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, MemoryError> {
        let pool = crate::db::create_pool(url, 5)
            .await
            .map_err(|e| MemoryError::IndexUnavailable {
                name: String::new(),
                reason: format!("database connection failed: {}", e),
            })?;
        Ok(Self::new(pool))
    }

    async fn ensure_extension(&self) -> Result<(), sqlx::Error> {
        if crate::db::check_pgvector(&self.pool).await.is_ok() {
            return Ok(());
        }
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `Ok(None)` when the table does not exist yet. An existing table whose
    /// `embedding` column has no declared size reports `Some(None)`.
    async fn existing_dimension(&self, table: &str) -> Result<Option<Option<usize>>, sqlx::Error> {
        let exists: (Option<String>,) = sqlx::query_as("SELECT to_regclass($1)::text")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        if exists.0.is_none() {
            return Ok(None);
        }

        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(Some(row.and_then(|r| declared_dimension(r.0))))
    }
}

/// atttypmod of a `vector(n)` column is n; a bare `vector` column has -1.
fn declared_dimension(typmod: i32) -> Option<usize> {
    usize::try_from(typmod).ok().filter(|&d| d > 0)
}

/// Map an index name to a safe table identifier: lowercase, `-` to `_`,
/// only `[a-z0-9_]`, not starting with a digit, at most 63 bytes.
pub fn table_name(index: &str) -> Result<String, MemoryError> {
    let name = index.trim().to_ascii_lowercase().replace('-', "_");
    let valid = !name.is_empty()
        && name.len() <= 63
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(MemoryError::InvalidIndexName(index.to_string()))
    }
}

fn distance_operator(metric: Metric) -> &'static str {
    match metric {
        Metric::Cosine => "<=>",
        Metric::DotProduct => "<#>",
        Metric::Euclidean => "<->",
    }
}

/// Convert an operator distance back into a similarity score.
fn score_from_distance(metric: Metric, distance: f64) -> f32 {
    match metric {
        Metric::Cosine => (1.0 - distance) as f32,
        // <#> returns the negative inner product
        Metric::DotProduct => (-distance) as f32,
        Metric::Euclidean => (-distance) as f32,
    }
}

#[async_trait]
impl VectorMemoryStore for PgVectorStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle, MemoryError> {
        let table = table_name(&spec.name)?;
        let unavailable = |e: sqlx::Error| MemoryError::IndexUnavailable {
            name: spec.name.clone(),
            reason: e.to_string(),
        };

        self.ensure_extension().await.map_err(unavailable)?;

        let dimension = match self.existing_dimension(&table).await.map_err(unavailable)? {
            Some(Some(d)) => d,
            Some(None) => {
                tracing::warn!(
                    index = %spec.name,
                    table = %table,
                    dimension = spec.dimension,
                    "Existing table has no declared vector dimension, assuming configured dimension"
                );
                spec.dimension
            }
            None => {
                tracing::info!(index = %spec.name, table = %table, dimension = spec.dimension, "Creating pgvector table");
                let ddl = format!(
                    "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, embedding vector({}) NOT NULL, keywords TEXT NOT NULL DEFAULT '', text TEXT NOT NULL DEFAULT '')",
                    table, spec.dimension
                );
                sqlx::query(&ddl)
                    .execute(&self.pool)
                    .await
                    .map_err(unavailable)?;
                spec.dimension
            }
        };

        Ok(IndexHandle {
            name: table,
            dimension,
            metric: spec.metric,
            host: None,
        })
    }

    async fn upsert(&self, index: &IndexHandle, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        for record in records {
            index.check_dimension(&record.vector)?;
        }
        let table = table_name(&index.name)?;
        let sql = format!(
            "INSERT INTO {} (id, embedding, keywords, text) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET embedding = EXCLUDED.embedding, keywords = EXCLUDED.keywords, text = EXCLUDED.text",
            table
        );

        for (written, record) in records.iter().enumerate() {
            sqlx::query(&sql)
                .bind(&record.id)
                .bind(pgvector::Vector::from(record.vector.clone()))
                .bind(record.metadata.joined_keywords())
                .bind(&record.metadata.text)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::UpsertFailed {
                    written,
                    cause: e.to_string(),
                })?;
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
        let table = table_name(&index.name)?;
        let op = distance_operator(index.metric);
        let sql = format!(
            "SELECT id, keywords, text, (embedding {op} $1)::float8 AS distance FROM {table} ORDER BY embedding {op} $1 LIMIT $2"
        );

        let rows = sqlx::query_as::<_, (String, String, String, f64)>(&sql)
            .bind(pgvector::Vector::from(vector.to_vec()))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, keywords, text, distance)| ScoredMatch {
                id,
                score: score_from_distance(index.metric, distance),
                metadata: RecordMetadata {
                    keywords: split_keywords(&keywords),
                    text,
                },
            })
            .collect())
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
