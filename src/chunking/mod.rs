//! Document chunking: fixed-size overlapping windows cut at structural boundaries.

pub mod splitter;

use crate::models::{Chunk, Document};

/// Characters per chunk.
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared by consecutive chunks of one document.
pub const CHUNK_OVERLAP: usize = 100;

/// Split every document and tag each chunk with its source path.
pub fn chunk_documents(documents: &[Document]) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            splitter::split_text(&doc.content, CHUNK_SIZE, CHUNK_OVERLAP)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| Chunk {
                    text,
                    source_path: doc.source_path.clone(),
                    chunk_index: i,
                })
        })
        .collect()
}
