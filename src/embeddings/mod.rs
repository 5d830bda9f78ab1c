// Document processing, embeddings, reranking and vector search

pub mod document_processor;
pub mod provider;
pub mod reranker;
pub mod text_chunker;
pub mod vector_search;

pub use document_processor::*;
pub use provider::*;
pub use reranker::*;
pub use text_chunker::*;
pub use vector_search::*;
