//! Recursive character text splitting.
//!
//! Text is split on the first separator (in preference order) that occurs in
//! it. Pieces that are still too long are split again with the remaining
//! separators, and adjacent short pieces are merged back together up to
//! `chunk_size` characters while carrying `chunk_overlap` characters of
//! trailing context into the next chunk. Separators are kept at the start of
//! the piece that follows them. Lengths are measured in characters.

use std::collections::BTreeMap;

use super::document_processor::ParsedDocument;
use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Paragraph break, line break, sentence endings, word break, characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "?", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split a text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every page of a document and attach provenance metadata.
    ///
    /// Chunk identifiers are `<filename>_<index>`, numbered across the whole
    /// document, so re-ingesting the same file overwrites its prior chunks.
    pub fn chunk_document(&self, document: &ParsedDocument) -> Vec<Chunk> {
        let total_pages = document.total_pages();
        let mut chunks = Vec::new();

        for page in &document.pages {
            for text in self.split_text(&page.text) {
                let mut metadata = BTreeMap::new();
                metadata.insert("source".to_string(), document.filename.clone().into());
                metadata.insert("page".to_string(), page.page.into());
                metadata.insert("total_pages".to_string(), total_pages.into());

                chunks.push(Chunk {
                    id: format!("{}_{}", document.filename, chunks.len()),
                    text,
                    metadata,
                });
            }
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator present in the text; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.extend(trimmed(piece));
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Greedily merge pieces into chunks, retaining a tail of at most
    /// `chunk_overlap` characters from the previous chunk.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_start = 0usize;
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && current.len() > current_start {
                docs.extend(trimmed(&current[current_start..].concat()));

                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    total -= char_len(current[current_start]);
                    current_start += 1;
                }
            }
            current.push(piece);
            total += len;
        }

        if current.len() > current_start {
            docs.extend(trimmed(&current[current_start..].concat()));
        }

        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}
