use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::embeddings::DistanceMetric;
use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub store: StoreConfig,
    pub models: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: Option<String>,
}

// Keeps the credential out of startup logs.
impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub collection: String,
    pub distance: DistanceMetric,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub embedding_model: String,
    pub reranker_model: String,
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rerank_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            rerank_top_n: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    pub model_call_secs: u64,
    pub store_call_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            model_call_secs: 120,
            store_call_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider: LLMProvider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse().map_err(|e| anyhow::anyhow!("LLM_PROVIDER: {}", e))?,
            None => LLMProvider::Google,
        };
        let key_var = provider.api_key_var();
        let api_key = match get(key_var) {
            Some(key) => key,
            None => bail!("{} not found. Please set it in a .env file.", key_var),
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_or(&get, "CHUNK_SIZE", 400)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", 100)?,
        };
        if chunking.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                chunking.chunk_overlap,
                chunking.chunk_size
            );
        }

        let retrieval = RetrievalConfig {
            top_k: parse_or(&get, "RETRIEVAL_TOP_K", 10)?,
            rerank_top_n: parse_or(&get, "RERANK_TOP_N", 3)?,
        };
        if retrieval.top_k == 0 || retrieval.rerank_top_n == 0 {
            bail!("RETRIEVAL_TOP_K and RERANK_TOP_N must be greater than zero");
        }

        Ok(Self {
            server: ServerConfig {
                port: parse_or(&get, "PORT", 8000)?,
                host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                cors_allowed_origins: get("ALLOWED_ORIGINS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            },
            llm: LLMConfig {
                provider,
                api_key,
                model: get("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
                temperature: parse_or(&get, "LLM_TEMPERATURE", 0.0)?,
                base_url: get("LLM_BASE_URL"),
            },
            store: StoreConfig {
                path: get("VECTOR_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("rag_chroma_db")),
                collection: get("COLLECTION_NAME").unwrap_or_else(|| "rag_app".to_string()),
                distance: parse_or(&get, "DISTANCE_METRIC", DistanceMetric::Cosine)?,
            },
            models: ModelConfig {
                embedding_model: get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "all-MiniLM-L6-v2".to_string()),
                reranker_model: get("RERANKER_MODEL")
                    .unwrap_or_else(|| "bge-reranker-base".to_string()),
                cache_dir: get("MODEL_CACHE_DIR").map(PathBuf::from),
            },
            retrieval,
            chunking,
            timeouts: TimeoutConfig {
                model_call_secs: parse_or(&get, "MODEL_TIMEOUT_SECS", 120)?,
                store_call_secs: parse_or(&get, "STORE_TIMEOUT_SECS", 30)?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
