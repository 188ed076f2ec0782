//! Semantic retrieval over ingested documents.
//!
//! Chunks document text, stores chunk embeddings in an exact nearest-neighbor
//! index and looks up the chunks closest to a query.
//!
//! # Architecture
//!
//! - `chunker`: Fixed-size overlapping word windows
//! - `index`: In-memory vector index with exact L2 search
//! - `shared`: RwLock wrapper giving single-writer/multi-reader access
//! - `storage`: Snapshot directory persistence
//! - `embeddings`: Embedder trait and the fastembed implementation
//! - `extract`: Document text source trait, PDF and plain-text pages
//! - `retriever`: Query embedding + index search
//! - `service`: High-level ingestion and retrieval service

pub mod chunker;
pub mod embeddings;
mod error;
pub mod extract;
pub mod index;
pub mod retriever;
mod service;
mod shared;
mod storage;

pub use chunker::{chunk_text, Chunker};
pub use embeddings::{Embedder, EmbeddingModel};
pub use error::{CollaboratorError, RetrievalError, RetrievalResult};
pub use extract::{DocumentSource, Page, PdfTextSource, PlainTextSource, TextSource};
pub use index::{SearchHit, VectorIndex};
pub use retriever::Retriever;
pub use service::{IndexStats, IngestReport, RetrievalService};
pub use shared::SharedIndex;
pub use storage::SnapshotStorage;
