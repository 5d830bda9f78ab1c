//! Embedding provider abstraction and the local fastembed implementation.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::types::{AppError, AppResult};

/// Maps text to fixed-length vectors.
///
/// The same instance must encode both indexed chunks and queries so the two
/// live in the same vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Embedding("Embedding model returned no vector".to_string()))
    }

    /// Embed many texts; results are identical to calling `embed` per item.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Resolve a configured model name to a fastembed model and its dimensionality
pub fn resolve_embedding_model(name: &str) -> AppResult<(EmbeddingModel, usize)> {
    let normalized = name.trim().to_lowercase();
    let normalized = normalized
        .strip_prefix("sentence-transformers/")
        .or_else(|| normalized.strip_prefix("baai/"))
        .unwrap_or(&normalized);

    match normalized {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        _ => Err(AppError::InvalidRequest(format!(
            "Unsupported embedding model: {}",
            name
        ))),
    }
}

/// Local ONNX sentence embeddings via fastembed
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the named model. Blocking.
    pub fn new(model_name: &str, cache_dir: Option<&Path>) -> AppResult<Self> {
        let (model, dimensions) = resolve_embedding_model(model_name)?;

        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir.to_path_buf());
        }

        info!("Loading local embedding model {}. This may take a moment...", model_name);
        let embedding = TextEmbedding::try_new(options).map_err(|e| {
            AppError::Embedding(format!("Failed to load embedding model {}: {}", model_name, e))
        })?;
        info!("Embedding model loaded");

        Ok(Self {
            model: Arc::new(embedding),
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let texts = texts.to_vec();
        let expected = texts.len();

        let vectors = tokio::task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| AppError::Embedding(format!("Embedding failed: {}", e)))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))??;

        if vectors.len() != expected {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, model returned {}",
                expected,
                vectors.len()
            )));
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
