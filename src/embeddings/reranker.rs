//! Second-pass relevance scoring of retrieved passages.

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::types::{AppError, AppResult};

/// Scores each candidate's relevance to a query.
///
/// Returns one score per candidate in input order; higher is more relevant.
/// Each score depends only on its (query, candidate) pair.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, candidates: &[String]) -> AppResult<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Order candidates by descending score and keep the first `top_n`.
///
/// The sort is stable, so tied candidates keep their retrieval order. NaN
/// scores rank below every real score.
pub fn select_top<T>(candidates: Vec<T>, scores: &[f32], top_n: usize) -> Vec<T> {
    let mut scored: Vec<(f32, T)> = scores
        .iter()
        .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { *s })
        .zip(candidates)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().take(top_n).map(|(_, c)| c).collect()
}

pub fn resolve_reranker_model(name: &str) -> AppResult<RerankerModel> {
    let normalized = name.trim().to_lowercase();
    let normalized = normalized
        .strip_prefix("baai/")
        .or_else(|| normalized.strip_prefix("jinaai/"))
        .unwrap_or(&normalized);

    match normalized {
        "bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        _ => Err(AppError::InvalidRequest(format!(
            "Unsupported reranker model: {}",
            name
        ))),
    }
}

/// Local ONNX cross-encoder via fastembed
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    /// Load (downloading on first use) the named cross-encoder. Blocking.
    pub fn new(model_name: &str, cache_dir: Option<&Path>) -> AppResult<Self> {
        let model = resolve_reranker_model(model_name)?;

        let mut options = RerankInitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir.to_path_buf());
        }

        info!("Loading reranker model {}", model_name);
        let reranker = TextRerank::try_new(options).map_err(|e| {
            AppError::Reranker(format!("Failed to load reranker {}: {}", model_name, e))
        })?;

        Ok(Self {
            model: Arc::new(reranker),
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl Reranker for FastEmbedReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> AppResult<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let query = query.to_string();
        let candidates = candidates.to_vec();

        tokio::task::spawn_blocking(move || {
            let documents: Vec<&str> = candidates.iter().map(String::as_str).collect();
            let results = model
                .rerank(query.as_str(), documents, false, None)
                .map_err(|e| AppError::Reranker(format!("Reranking failed: {}", e)))?;

            // fastembed returns results sorted by score; restore input order.
            let mut scores = vec![f32::NEG_INFINITY; candidates.len()];
            for result in results {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = result.score;
                }
            }
            Ok(scores)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
