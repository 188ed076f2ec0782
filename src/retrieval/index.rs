//! In-memory vector index with exact Euclidean nearest-neighbor search.
//!
//! Vectors and their chunk texts are stored together and only ever grow
//! through [`VectorIndex::add`], so position `i` in the vector store always
//! belongs to chunk `i`.

use rayon::prelude::*;
use serde::Serialize;

use crate::retrieval::error::{RetrievalError, RetrievalResult};

/// Below this many stored floats the scan stays on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 1 << 16;

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Insertion position of the entry
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
    /// The chunk text stored with the vector
    pub text: String,
}

/// In-memory vector index for semantic search.
///
/// Supports:
/// - Append-only batch insertion, all-or-nothing
/// - Exact squared-L2 search, ties broken by insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Row-major vector storage, `len() * dimensions` floats
    vectors: Vec<f32>,
    /// Chunk texts, parallel to the rows of `vectors`
    chunks: Vec<String>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> RetrievalResult<Self> {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> RetrievalResult<Self> {
        if dimensions == 0 {
            return Err(RetrievalError::configuration(
                "embedding dimension must be a positive integer",
            ));
        }

        Ok(Self {
            vectors: Vec::with_capacity(dimensions * capacity),
            chunks: Vec::with_capacity(capacity),
            dimensions,
        })
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimensions;
        Some(&self.vectors[start..start + self.dimensions])
    }

    /// Chunk text stored at `position`.
    pub fn chunk(&self, position: usize) -> Option<&str> {
        self.chunks.get(position).map(String::as_str)
    }

    /// Iterate over `(vector, chunk)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], &str)> {
        self.vectors
            .chunks_exact(self.dimensions)
            .zip(self.chunks.iter().map(String::as_str))
    }

    /// Append vectors together with their chunk texts.
    ///
    /// Everything is validated before the index is touched: on error no entry
    /// from this call is stored.
    pub fn add(&mut self, vectors: &[Vec<f32>], chunks: &[String]) -> RetrievalResult<()> {
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::ArityMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
            });
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                got: bad.len(),
            });
        }

        self.vectors.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }
        self.chunks.extend(chunks.iter().cloned());

        Ok(())
    }

    /// Return the texts of the `top_k` entries nearest to `query`.
    ///
    /// Results are ordered by ascending distance, nearest first.
    pub fn search(&self, query: &[f32], top_k: usize) -> RetrievalResult<Vec<String>> {
        Ok(self
            .search_with_scores(query, top_k)?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Same as `search()` but returns positions and distances as well.
    pub fn search_with_scores(&self, query: &[f32], top_k: usize) -> RetrievalResult<Vec<SearchHit>> {
        if query.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        if top_k == 0 {
            return Err(RetrievalError::configuration("top_k must be a positive integer"));
        }

        let distances = self.distances(query);

        let mut ranked: Vec<(f32, usize)> = distances
            .into_iter()
            .enumerate()
            .map(|(position, distance)| (distance, position))
            .collect();

        // NaN of either sign ranks last; position breaks ties
        ranked.sort_by(|a, b| {
            a.0.is_nan()
                .cmp(&b.0.is_nan())
                .then(a.0.total_cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });
        ranked.truncate(top_k);

        Ok(ranked
            .into_iter()
            .map(|(distance, position)| SearchHit {
                position,
                distance,
                text: self.chunks[position].clone(),
            })
            .collect())
    }

    /// Squared distance from `query` to every stored vector, in insertion order.
    fn distances(&self, query: &[f32]) -> Vec<f32> {
        if self.vectors.len() >= PARALLEL_SCAN_THRESHOLD {
            self.vectors
                .par_chunks_exact(self.dimensions)
                .map(|v| squared_l2(query, v))
                .collect()
        } else {
            self.vectors
                .chunks_exact(self.dimensions)
                .map(|v| squared_l2(query, v))
                .collect()
        }
    }

    /// Clear all entries from the index.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.chunks.clear();
    }

    /// Rebuild an index from already-decoded snapshot parts.
    ///
    /// Used when loading from storage.
    pub(crate) fn from_parts(
        dimensions: usize,
        vectors: Vec<f32>,
        chunks: Vec<String>,
    ) -> RetrievalResult<Self> {
        if dimensions == 0 {
            return Err(RetrievalError::corrupt("snapshot declares zero dimensions"));
        }
        if vectors.len() != chunks.len() * dimensions {
            return Err(RetrievalError::corrupt(format!(
                "{} floats cannot hold {} vectors of {} dimensions",
                vectors.len(),
                chunks.len(),
                dimensions
            )));
        }

        Ok(Self {
            vectors,
            chunks,
            dimensions,
        })
    }

    /// Chunk texts in insertion order.
    pub(crate) fn chunks(&self) -> &[String] {
        &self.chunks
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
