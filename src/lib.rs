// PDF RAG - question answering over uploaded PDF documents

pub mod config;
pub mod db;
pub mod embeddings; // PDF parsing, chunking, embeddings, reranking, vector index
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
pub use pipeline::RagPipeline;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
