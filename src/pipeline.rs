// Ingestion and question-answering orchestration
//
// Every component is injected behind a trait so tests can swap the model-backed
// pieces for deterministic ones. Startup loads the real components once, in
// order: database, index, embedder, reranker, LLM adapter.

use futures::stream;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embeddings::{
    select_top, DocumentProcessor, EmbeddingProvider, FastEmbedProvider, FastEmbedReranker,
    Reranker, SqliteVectorIndex, TextSplitter, VectorIndex,
};
use crate::llm::{build_adapter, AnswerGenerator, AnswerStream, LlmAnswerGenerator};
use crate::models::{FileOutcome, IndexedVector, UploadedFile};
use crate::types::{AppError, AppResult};

pub const NOT_FOUND_MESSAGE: &str =
    "I could not find any relevant information in the uploaded documents.";

pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn AnswerGenerator>,
    splitter: TextSplitter,
    retrieval: RetrievalConfig,
    model_timeout: Duration,
    store_timeout: Duration,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn AnswerGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            generator,
            splitter: TextSplitter::from_config(&config.chunking),
            retrieval: config.retrieval,
            model_timeout: Duration::from_secs(config.timeouts.model_call_secs),
            store_timeout: Duration::from_secs(config.timeouts.store_call_secs),
        }
    }

    /// Load the production components. Model files are downloaded on first run.
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let pool = db::create_pool(&config.store.path).await?;
        let index = SqliteVectorIndex::new(
            pool,
            config.store.collection.clone(),
            config.store.distance,
        );
        info!(
            path = %config.store.path.display(),
            collection = %config.store.collection,
            distance = %index.metric(),
            "Vector index ready"
        );

        let models = config.models.clone();
        let (embedder, reranker) = tokio::task::spawn_blocking(move || {
            let cache_dir = models.cache_dir.as_deref();
            let embedder = FastEmbedProvider::new(&models.embedding_model, cache_dir)?;
            let reranker = FastEmbedReranker::new(&models.reranker_model, cache_dir)?;
            Ok::<_, AppError>((embedder, reranker))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))??;
        info!(
            embedder = %embedder.name(),
            dimensions = embedder.dimensions(),
            reranker = %reranker.name(),
            "Models loaded"
        );

        let adapter = build_adapter(&config.llm);
        info!(provider = %adapter.name(), model = %config.llm.model, "LLM client ready");
        let generator = LlmAnswerGenerator::new(
            Arc::from(adapter),
            &config.llm,
            Duration::from_secs(config.timeouts.model_call_secs),
        );

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(reranker),
            Arc::new(generator),
            config,
        ))
    }

    /// Parse, chunk, embed and store one file. Failures are reported in the
    /// outcome rather than returned.
    pub async fn ingest(&self, file: &UploadedFile) -> FileOutcome {
        match self.ingest_file(file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(filename = %file.filename, error = %e, "Failed to process file");
                FileOutcome::Failed {
                    filename: file.filename.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn ingest_file(&self, file: &UploadedFile) -> AppResult<FileOutcome> {
        let document = DocumentProcessor::process_pdf(&file.filename, file.data.clone()).await?;
        let chunks = self.splitter.chunk_document(&document);

        if chunks.is_empty() {
            info!(filename = %file.filename, pages = document.total_pages(), "No text found, skipping");
            return Ok(FileOutcome::Skipped {
                filename: file.filename.clone(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = with_timeout(
            self.model_timeout,
            "embedding",
            self.embedder.embed_batch(&texts),
        )
        .await?;
        if embeddings.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let count = chunks.len();
        let vectors: Vec<IndexedVector> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedVector { chunk, embedding })
            .collect();

        info!(filename = %file.filename, chunks = count, "Adding chunks to vector index");
        with_timeout(self.store_timeout, "index write", self.index.upsert(&vectors)).await?;
        info!(filename = %file.filename, "Finished processing file");

        Ok(FileOutcome::Processed {
            filename: file.filename.clone(),
            chunks: count,
        })
    }

    /// Retrieve, rerank and stream an answer.
    ///
    /// An empty index yields the canned not-found sentence without calling the
    /// answer model.
    pub async fn query(&self, question: &str) -> AppResult<AnswerStream> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidRequest(
                "Question must not be empty.".to_string(),
            ));
        }

        info!(question, top_k = self.retrieval.top_k, "Retrieving documents");
        let query_vector =
            with_timeout(self.model_timeout, "query embedding", self.embedder.embed(question))
                .await?;
        let hits = with_timeout(
            self.store_timeout,
            "vector search",
            self.index.search(&query_vector, self.retrieval.top_k),
        )
        .await?;

        if hits.is_empty() {
            info!("No relevant passages found");
            return Ok(stream::once(async { NOT_FOUND_MESSAGE.to_string() }).boxed());
        }

        let passages: Vec<String> = hits.into_iter().map(|hit| hit.chunk.text).collect();
        let scores = with_timeout(
            self.model_timeout,
            "reranking",
            self.reranker.score(question, &passages),
        )
        .await?;
        if scores.len() != passages.len() {
            return Err(AppError::Reranker(format!(
                "expected {} scores, got {}",
                passages.len(),
                scores.len()
            )));
        }

        let retrieved = passages.len();
        let top = select_top(passages, &scores, self.retrieval.rerank_top_n);
        info!(retrieved, selected = top.len(), "Reranked passages");

        let context = top.join("\n\n");
        Ok(self.generator.generate(&context, question).await)
    }

    pub fn collection(&self) -> &str {
        self.index.collection()
    }

    pub async fn indexed_chunks(&self) -> AppResult<usize> {
        with_timeout(self.store_timeout, "index count", self.index.count()).await
    }
}

/// Reject files whose declared content type is not `application/pdf`.
/// Parameters such as `; charset=binary` are ignored.
pub fn validate_upload(file: &UploadedFile) -> AppResult<()> {
    let is_pdf = file
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<mime::Mime>().ok())
        .map(|declared| declared.essence_str() == mime::APPLICATION_PDF.essence_str())
        .unwrap_or(false);

    if is_pdf {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!(
            "File '{}' is not a PDF.",
            file.filename
        )))
    }
}

async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        AppError::Timeout(format!(
            "{} did not finish within {}s",
            operation,
            limit.as_secs()
        ))
    })?
}
