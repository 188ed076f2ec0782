//! Thread-safe handle around a [`VectorIndex`].
//!
//! Readers share the lock for searches; `add`, `save`, `load` and `clear`
//! take it exclusively, so a search never sees half of an appended batch and
//! a snapshot is always taken from a quiescent index.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::retrieval::error::{RetrievalError, RetrievalResult};
use crate::retrieval::index::{SearchHit, VectorIndex};
use crate::retrieval::storage::SnapshotStorage;

/// Single-writer / multiple-reader vector index.
pub struct SharedIndex {
    inner: RwLock<VectorIndex>,
}

impl SharedIndex {
    /// Create an empty shared index with the given dimensions.
    pub fn new(dimensions: usize) -> RetrievalResult<Self> {
        Ok(Self::from_index(VectorIndex::new(dimensions)?))
    }

    /// Wrap an existing index.
    pub fn from_index(index: VectorIndex) -> Self {
        Self {
            inner: RwLock::new(index),
        }
    }

    pub fn dimensions(&self) -> RetrievalResult<usize> {
        Ok(self.read()?.dimensions())
    }

    pub fn len(&self) -> RetrievalResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> RetrievalResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Append a batch under the write lock.
    pub fn add(&self, vectors: &[Vec<f32>], chunks: &[String]) -> RetrievalResult<()> {
        self.write()?.add(vectors, chunks)
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> RetrievalResult<Vec<String>> {
        self.read()?.search(query, top_k)
    }

    pub fn search_with_scores(&self, query: &[f32], top_k: usize) -> RetrievalResult<Vec<SearchHit>> {
        self.read()?.search_with_scores(query, top_k)
    }

    /// Persist the index. Holds the write lock so no `add` runs mid-snapshot.
    pub fn save(&self, storage: &SnapshotStorage) -> RetrievalResult<()> {
        let guard = self.write()?;
        storage.save(&guard)
    }

    /// Replace the in-memory index with the stored snapshot.
    ///
    /// The snapshot is decoded before the lock is taken; the swap itself is
    /// exclusive. On error the current contents are kept.
    pub fn load(&self, storage: &SnapshotStorage) -> RetrievalResult<()> {
        let loaded = storage.load()?;
        *self.write()? = loaded;
        Ok(())
    }

    /// Drop all entries, keeping the dimensions.
    pub fn clear(&self) -> RetrievalResult<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Take a copy of the current index state.
    pub fn snapshot(&self) -> RetrievalResult<VectorIndex> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> RetrievalResult<RwLockReadGuard<'_, VectorIndex>> {
        self.inner.read().map_err(|_| RetrievalError::LockPoisoned)
    }

    fn write(&self) -> RetrievalResult<RwLockWriteGuard<'_, VectorIndex>> {
        self.inner.write().map_err(|_| RetrievalError::LockPoisoned)
    }
}
