// Deterministic stand-ins for the model-backed components, shared by unit tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::Config;
use crate::db;
use crate::embeddings::{EmbeddingProvider, Reranker, SqliteVectorIndex};
use crate::llm::{AnswerGenerator, AnswerStream, LLMAdapter, TokenStream};
use crate::models::AppState;
use crate::pipeline::RagPipeline;
use crate::types::{AppError, AppResult, LLMRequest};

/// Build a PDF with one page per entry. Lines within an entry become
/// separate text objects; an empty entry produces a page with no text.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = Vec::new();
        for (i, line) in text.lines().filter(|l| !l.is_empty()).enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new(
                "Td",
                vec![50.into(), (780 - 14 * i as i64).into()],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Bag-of-words embedding: each token is hashed (FNV-1a) into a bucket and
/// the result is L2-normalized.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Scores a passage by the number of distinct query tokens it contains
pub struct OverlapReranker;

#[async_trait]
impl Reranker for OverlapReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> AppResult<Vec<f32>> {
        let query: HashSet<String> = tokens(query).collect();
        Ok(candidates
            .iter()
            .map(|c| {
                let words: HashSet<String> = tokens(c).collect();
                query.intersection(&words).count() as f32
            })
            .collect())
    }

    fn name(&self) -> &str {
        "overlap"
    }
}

/// Generator that records every call and answers with the context it saw
#[derive(Default)]
pub struct RecordingGenerator {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingGenerator {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for RecordingGenerator {
    async fn generate(&self, context: &str, question: &str) -> AnswerStream {
        self.calls
            .lock()
            .unwrap()
            .push((context.to_string(), question.to_string()));
        let fragments = vec!["Answer from context: ".to_string(), context.to_string()];
        stream::iter(fragments).boxed()
    }
}

/// LLM adapter replaying a fixed script
pub struct ScriptedAdapter {
    fragments: Vec<String>,
    fail_setup: bool,
    fail_after: bool,
    delay: Option<Duration>,
}

impl ScriptedAdapter {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_setup: false,
            fail_after: false,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_setup: true,
            ..Self::fragments(&[])
        }
    }

    pub fn failing_after(fragments: &[&str]) -> Self {
        Self {
            fail_after: true,
            ..Self::fragments(fragments)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LLMAdapter for ScriptedAdapter {
    async fn create_chat_completion_stream(&self, _request: &LLMRequest) -> AppResult<TokenStream> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_setup {
            return Err(AppError::LLMApi("quota exceeded".to_string()));
        }

        let mut items: Vec<AppResult<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if self.fail_after {
            items.push(Err(AppError::LLMApi("connection reset".to_string())));
        }
        Ok(stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| (key == "GOOGLE_API_KEY").then(|| "test-key".to_string()))
        .expect("test configuration")
}

/// Pipeline over a fresh index in `dir`, with hash embeddings and overlap reranking
pub async fn test_pipeline(dir: &TempDir, generator: Arc<dyn AnswerGenerator>) -> RagPipeline {
    let mut config = test_config();
    config.store.path = dir.path().to_path_buf();

    let pool = db::create_pool(&config.store.path).await.expect("test database");
    let index = SqliteVectorIndex::new(pool, config.store.collection.clone(), config.store.distance);

    RagPipeline::new(
        Arc::new(HashEmbedder::new(64)),
        Arc::new(index),
        Arc::new(OverlapReranker),
        generator,
        &config,
    )
}

pub async fn test_state(dir: &TempDir) -> (AppState, Arc<RecordingGenerator>) {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = test_pipeline(dir, generator.clone()).await;

    let mut config = test_config();
    config.store.path = dir.path().to_path_buf();
    (AppState::new(pipeline, config), generator)
}
