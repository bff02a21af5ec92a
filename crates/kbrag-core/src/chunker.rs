//! Overlapping character windows sized for embedding.

use crate::error::{Error, Result};
use crate::knowledge::SourceDocument;
use crate::types::Chunk;

/// Split `document` into windows of at most `chunk_size` characters where
/// consecutive windows share exactly `overlap` characters.
///
/// Windows advance by `chunk_size - overlap`; the last window ends at the end
/// of the text. Windows holding only whitespace are skipped.
pub fn chunk_text(document: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate(chunk_size, overlap)?;
    Ok(windows(document, chunk_size, overlap))
}

/// Requires `0 < chunk_size` and `overlap < chunk_size`.
fn windows(document: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = document.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Vec::new();
    }
    let step = chunk_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            windows.push(window);
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    windows
}

fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk_size must be positive".into()));
    }
    if overlap >= chunk_size {
        return Err(Error::InvalidConfig(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate(chunk_size, overlap)?;
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn overlap(&self) -> usize { self.overlap }

    pub fn chunk(&self, document: &SourceDocument) -> Vec<Chunk> {
        windows(&document.content, self.chunk_size, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                text,
                source: document.source.clone(),
                category: document.category.clone(),
                position,
            })
            .collect()
    }

    pub fn chunk_all(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.chunk(d)).collect();
        tracing::debug!(documents = documents.len(), chunks = chunks.len(), "chunked documents");
        chunks
    }
}
