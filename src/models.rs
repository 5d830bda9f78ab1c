use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::RagPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub config: Config,
}

impl AppState {
    pub fn new(pipeline: RagPipeline, config: Config) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config,
        }
    }
}

/// Scalar provenance values attached to a chunk (source file, page, ...)
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A bounded span of source text with provenance metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    /// `<filename>_<index>`, unique within a collection
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk together with its embedding, as written to the index
#[derive(Debug, Clone)]
pub struct IndexedVector {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

/// A file received on `/upload`
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: bytes::Bytes,
}

/// Per-file result of ingestion
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed { filename: String, chunks: usize },
    Skipped { filename: String },
    Failed { filename: String, error: String },
}

impl FileOutcome {
    /// Entry for `processed_files`; failures have none.
    pub fn report_entry(&self) -> Option<String> {
        match self {
            FileOutcome::Processed { filename, .. } => Some(filename.clone()),
            FileOutcome::Skipped { filename } => {
                Some(format!("{} (skipped, no content found)", filename))
            }
            FileOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub processed_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<FailedFile>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub collection: String,
    pub indexed_chunks: usize,
}
