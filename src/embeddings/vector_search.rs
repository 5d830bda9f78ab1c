// Vector index over a named collection in the embedded SQLite database
//
// Search is exact: every vector in the collection is compared with the query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use crate::models::{Chunk, IndexedVector, Metadata, SearchHit};
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite vectors by chunk identifier
    async fn upsert(&self, vectors: &[IndexedVector]) -> AppResult<()>;

    /// Up to `k` nearest chunks, ascending by distance.
    /// An empty collection yields an empty result.
    async fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<SearchHit>>;

    /// Number of chunks stored in the collection
    async fn count(&self) -> AppResult<usize>;

    fn collection(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// 1 - cosine similarity
    Cosine,
    /// Squared euclidean distance
    L2,
    /// 1 - inner product
    Ip,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot(a, b) / (norm_a * norm_b)
            }
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            DistanceMetric::Ip => 1.0 - dot(a, b),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::L2 => write!(f, "l2"),
            DistanceMetric::Ip => write!(f, "ip"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::Ip),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::VectorStore(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: String,
    document: String,
    metadata: String,
    embedding: Vec<u8>,
}

/// SQLite-backed collection
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    collection: String,
    metric: DistanceMetric,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, collection: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            pool,
            collection: collection.into(),
            metric,
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, vectors: &[IndexedVector]) -> AppResult<()> {
        if vectors.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for item in vectors {
            let metadata = serde_json::to_string(&item.chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO embeddings (collection, id, document, metadata, embedding, dimensions)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    dimensions = excluded.dimensions,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                "#,
            )
            .bind(self.collection.as_str())
            .bind(item.chunk.id.as_str())
            .bind(item.chunk.text.as_str())
            .bind(metadata)
            .bind(encode_vector(&item.embedding))
            .bind(item.embedding.len() as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(collection = %self.collection, count = vectors.len(), "Upserted vectors");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT id, document, metadata, embedding FROM embeddings WHERE collection = ?1",
        )
        .bind(self.collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding = decode_vector(&row.embedding)?;
            if embedding.len() != query.len() {
                return Err(AppError::VectorStore(format!(
                    "Dimension mismatch for {}: stored {}, query {}",
                    row.id,
                    embedding.len(),
                    query.len()
                )));
            }
            let metadata: Metadata = serde_json::from_str(&row.metadata)?;
            hits.push(SearchHit {
                distance: self.metric.distance(query, &embedding),
                chunk: Chunk {
                    id: row.id,
                    text: row.document,
                    metadata,
                },
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or_else(|| a.distance.is_nan().cmp(&b.distance.is_nan()))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> AppResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection = ?1")
                .bind(self.collection.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
