//! Fixed-size word-window chunking.
//!
//! Text is split on whitespace and cut into windows of `chunk_size` words.
//! Each window starts `chunk_size - overlap` words after the previous one, so
//! neighbouring chunks share `overlap` words. Boundaries are positional only;
//! sentences and paragraphs are not taken into account.

use crate::retrieval::error::{RetrievalError, RetrievalResult};

/// Default window length in words.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of words shared by consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 50;

/// Word-window chunker with a validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl Chunker {
    /// Create a chunker, rejecting configurations whose window would never advance.
    pub fn new(chunk_size: usize, overlap: usize) -> RetrievalResult<Self> {
        if overlap >= chunk_size {
            return Err(RetrievalError::configuration(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into overlapping chunks. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::with_capacity(words.len().div_ceil(step));
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            start += step;
        }

        chunks
    }
}

/// Chunk `text` with an explicit window size and overlap.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> RetrievalResult<Vec<String>> {
    Ok(Chunker::new(chunk_size, overlap)?.chunk(text))
}
