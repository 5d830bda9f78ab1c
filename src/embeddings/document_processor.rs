// PDF loading
//
// Uploaded bytes are spooled to a named temporary file for the lifetime of a
// single parse; the file is removed when the handle drops, on every path.

use crate::types::{AppError, AppResult};
use bytes::Bytes;
use lopdf::Document;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Text extracted from a single page (0-based page index)
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub filename: String,
    pub pages: Vec<PageText>,
}

impl ParsedDocument {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }
}

pub struct DocumentProcessor;

impl DocumentProcessor {
    /// Parse a PDF upload into page-level text blocks.
    pub async fn process_pdf(filename: &str, data: Bytes) -> AppResult<ParsedDocument> {
        let spool_dir = std::env::temp_dir();
        let pages = tokio::task::spawn_blocking(move || Self::load_pdf(&spool_dir, &data))
            .await
            .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))??;

        debug!(filename, pages = pages.len(), "Parsed PDF");

        Ok(ParsedDocument {
            filename: filename.to_string(),
            pages,
        })
    }

    fn load_pdf(spool_dir: &Path, data: &[u8]) -> AppResult<Vec<PageText>> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(spool_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create temporary file: {}", e)))?;

        temp_file
            .write_all(data)
            .and_then(|_| temp_file.flush())
            .map_err(|e| AppError::Internal(format!("Failed to write temporary file: {}", e)))?;

        let document = Document::load(temp_file.path())
            .map_err(|e| AppError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for (index, page_number) in document.get_pages().keys().enumerate() {
            let text = document
                .extract_text(&[*page_number])
                .map_err(|e| AppError::Pdf(format!("Failed to extract page {}: {}", page_number, e)))?;
            pages.push(PageText {
                page: index as u32,
                text,
            });
        }

        Ok(pages)
    }
}
