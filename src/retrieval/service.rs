//! Retrieval service for document ingestion and question-time lookup.
//!
//! Provides a high-level interface over the retrieval core:
//! - Lazy-loads the embedding model and the persisted index
//! - Ingests documents: extract pages, chunk, embed, add in one batch
//! - Coordinates query embedding and similarity search
//! - Saves and resets the on-disk snapshot

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::retrieval::chunker::Chunker;
use crate::retrieval::embeddings::{Embedder, EmbeddingModel};
use crate::retrieval::error::{CollaboratorError, RetrievalError, RetrievalResult};
use crate::retrieval::extract::{DocumentSource, Page, TextSource};
use crate::retrieval::index::SearchHit;
use crate::retrieval::retriever::Retriever;
use crate::retrieval::shared::SharedIndex;
use crate::retrieval::storage::SnapshotStorage;

/// Snapshot directory name under the base path
const INDEX_DIR: &str = "index";

/// Chunks sent to the embedder per call
const EMBED_BATCH_SIZE: usize = 64;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
}

/// Summary of the loaded index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub dimensions: usize,
    pub entries: usize,
    pub snapshot_path: PathBuf,
    pub snapshot_exists: bool,
}

/// Lazy-loaded retrieval components.
struct RetrievalState {
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    storage: SnapshotStorage,
}

/// Service for ingesting documents and retrieving relevant chunks.
///
/// Lazily loads the embedding model and vector index on first use.
/// Thread-safe: the index itself is guarded by [`SharedIndex`].
pub struct RetrievalService {
    config: RetrievalConfig,
    chunker: Chunker,
    base_path: PathBuf,
    text_source: Arc<dyn TextSource>,
    /// Embedder supplied up front; otherwise a fastembed model is created on init
    embedder: Option<Arc<dyn Embedder>>,
    state: Mutex<Option<Arc<RetrievalState>>>,
}

impl RetrievalService {
    /// Create a service backed by fastembed and [`DocumentSource`] extraction.
    ///
    /// Nothing is loaded until the first operation that needs the index.
    pub fn new(config: RetrievalConfig, base_path: PathBuf) -> RetrievalResult<Self> {
        Self::build(config, base_path, None, Arc::new(DocumentSource))
    }

    /// Create a service with caller-provided collaborators.
    pub fn with_collaborators(
        config: RetrievalConfig,
        base_path: PathBuf,
        embedder: Arc<dyn Embedder>,
        text_source: Arc<dyn TextSource>,
    ) -> RetrievalResult<Self> {
        Self::build(config, base_path, Some(embedder), text_source)
    }

    fn build(
        config: RetrievalConfig,
        base_path: PathBuf,
        embedder: Option<Arc<dyn Embedder>>,
        text_source: Arc<dyn TextSource>,
    ) -> RetrievalResult<Self> {
        let chunker = Chunker::new(config.chunk_size, config.overlap)?;
        Ok(Self {
            config,
            chunker,
            base_path,
            text_source,
            embedder,
            state: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Directory the snapshot lives in.
    pub fn snapshot_path(&self) -> PathBuf {
        self.base_path.join(INDEX_DIR)
    }

    /// Check if the service has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Force initialization of the service.
    ///
    /// Normally initialization happens lazily on first use.
    pub fn initialize(&self) -> RetrievalResult<()> {
        self.state().map(|_| ())
    }

    /// Build a retriever over the loaded index.
    pub fn retriever(&self) -> RetrievalResult<Retriever> {
        let state = self.state()?;
        Ok(
            Retriever::new(Arc::clone(&state.embedder), Arc::clone(&state.index))
                .with_top_k(self.config.top_k),
        )
    }

    /// Retrieve the nearest chunks for `query`; `top_k` defaults to the config.
    pub fn retrieve(&self, query: &str, top_k: Option<usize>) -> RetrievalResult<Vec<String>> {
        let retriever = self.retriever()?;
        retriever.retrieve_top(query, top_k.unwrap_or(self.config.top_k))
    }

    /// Retrieve with positions and squared distances.
    pub fn retrieve_hits(&self, query: &str, top_k: Option<usize>) -> RetrievalResult<Vec<SearchHit>> {
        let retriever = self.retriever()?;
        retriever.retrieve_hits(query, top_k.unwrap_or(self.config.top_k))
    }

    /// Extract, chunk, embed and index one document.
    pub fn ingest(&self, path: &Path) -> RetrievalResult<IngestReport> {
        self.ingest_with_progress(path, |_, _| {})
    }

    /// Like [`ingest`](Self::ingest), reporting `(embedded, total)` chunk counts.
    pub fn ingest_with_progress<F>(&self, path: &Path, on_progress: F) -> RetrievalResult<IngestReport>
    where
        F: FnMut(usize, usize),
    {
        let pages = self.text_source.extract_pages(path)?;
        let report = self.ingest_pages(&pages, on_progress)?;

        log::info!(
            "Ingested {}: {} pages, {} chunks",
            path.display(),
            report.pages,
            report.chunks
        );
        Ok(report)
    }

    /// Chunk each page separately, embed all chunks, then add them in one batch.
    ///
    /// The whole document lands in the index or none of it does.
    pub fn ingest_pages<F>(&self, pages: &[Page], mut on_progress: F) -> RetrievalResult<IngestReport>
    where
        F: FnMut(usize, usize),
    {
        let state = self.state()?;

        let chunks: Vec<String> = pages
            .iter()
            .flat_map(|page| self.chunker.chunk(&page.text))
            .collect();

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let embedded = state.embedder.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(CollaboratorError::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                ))
                .into());
            }
            vectors.extend(embedded);
            on_progress(vectors.len(), chunks.len());
        }

        state.index.add(&vectors, &chunks)?;

        Ok(IngestReport {
            pages: pages.len(),
            chunks: chunks.len(),
        })
    }

    /// Save the current index state to storage.
    pub fn save(&self) -> RetrievalResult<()> {
        let state = self.state()?;
        state.index.save(&state.storage)?;
        log::info!(
            "Saved {} vectors to {}",
            state.index.len()?,
            state.storage.path().display()
        );
        Ok(())
    }

    /// Delete the snapshot and empty the in-memory index.
    pub fn reset(&self) -> RetrievalResult<()> {
        let storage = SnapshotStorage::new(self.snapshot_path());
        storage.delete()?;

        let guard = self.state.lock().map_err(|_| RetrievalError::LockPoisoned)?;
        if let Some(state) = guard.as_ref() {
            state.index.clear()?;
        }

        log::info!("Removed snapshot at {}", storage.path().display());
        Ok(())
    }

    /// Dimensions and entry count of the loaded index.
    pub fn stats(&self) -> RetrievalResult<IndexStats> {
        let state = self.state()?;
        Ok(IndexStats {
            dimensions: state.index.dimensions()?,
            entries: state.index.len()?,
            snapshot_path: state.storage.path().to_path_buf(),
            snapshot_exists: state.storage.exists(),
        })
    }

    /// Get the loaded state, initializing if needed.
    fn state(&self) -> RetrievalResult<Arc<RetrievalState>> {
        let mut guard = self.state.lock().map_err(|_| RetrievalError::LockPoisoned)?;

        if let Some(state) = guard.as_ref() {
            return Ok(Arc::clone(state));
        }

        let state = Arc::new(self.do_init()?);
        *guard = Some(Arc::clone(&state));
        Ok(state)
    }

    /// Perform actual initialization.
    fn do_init(&self) -> RetrievalResult<RetrievalState> {
        let embedder: Arc<dyn Embedder> = match &self.embedder {
            Some(embedder) => Arc::clone(embedder),
            None => {
                log::info!(
                    "Initializing retrieval with model '{}'",
                    self.config.model
                );
                let timeout = Duration::from_secs(self.config.download_timeout_secs);
                let model =
                    EmbeddingModel::new(&self.config.model, self.base_path.clone(), Some(timeout))
                        .map_err(CollaboratorError::from)?;
                Arc::new(model)
            }
        };

        let dimensions = embedder.dimensions();
        let storage = SnapshotStorage::new(self.snapshot_path());

        // Load or create index
        let index = if storage.exists() {
            let loaded = storage.load()?;
            if loaded.dimensions() != dimensions {
                log::error!(
                    "Snapshot has {} dimensions but the embedder produces {}",
                    loaded.dimensions(),
                    dimensions
                );
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimensions,
                    got: loaded.dimensions(),
                });
            }
            log::info!("Loaded {} vectors from storage", loaded.len());
            SharedIndex::from_index(loaded)
        } else {
            log::info!("No existing index, starting fresh");
            SharedIndex::new(dimensions)?
        };

        Ok(RetrievalState {
            embedder,
            index: Arc::new(index),
            storage,
        })
    }
}
