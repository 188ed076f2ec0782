//! Query-time composition of the embedder and the index.

use std::sync::Arc;

use crate::retrieval::embeddings::Embedder;
use crate::retrieval::error::RetrievalResult;
use crate::retrieval::index::SearchHit;
use crate::retrieval::shared::SharedIndex;

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a query and returns the nearest chunk texts, best first.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<SharedIndex>) -> Self {
        Self {
            embedder,
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the default number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Retrieve with the configured `top_k`.
    pub fn retrieve(&self, query: &str) -> RetrievalResult<Vec<String>> {
        self.retrieve_top(query, self.top_k)
    }

    /// Retrieve the `top_k` nearest chunks for `query`.
    ///
    /// An empty index gives an empty result. Embedder and index errors are
    /// returned unchanged; a dimension mismatch here means the embedder and
    /// the index were built for different models.
    pub fn retrieve_top(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<String>> {
        let query_vector = self.embedder.embed_one(query)?;
        let results = self.index.search(&query_vector, top_k)?;

        log::debug!("Retrieved {} chunks (top_k={})", results.len(), top_k);
        Ok(results)
    }

    /// Like [`retrieve_top`](Self::retrieve_top), keeping positions and distances.
    pub fn retrieve_hits(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<SearchHit>> {
        let query_vector = self.embedder.embed_one(query)?;
        self.index.search_with_scores(&query_vector, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::error::{CollaboratorError, RetrievalError};

    /// Maps a text to the vector encoded in it, e.g. "1,0".
    struct CoordinateEmbedder;

    impl Embedder for CoordinateEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
            texts
                .iter()
                .map(|t| {
                    t.split(',')
                        .map(|x| {
                            x.trim()
                                .parse::<f32>()
                                .map_err(|e| CollaboratorError::Embedding(e.to_string()))
                        })
                        .collect::<Result<Vec<f32>, _>>()
                })
                .collect()
        }
    }

    fn populated_index() -> Arc<SharedIndex> {
        let index = SharedIndex::new(2).unwrap();
        index
            .add(
                &[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]],
                &["a", "b", "c", "d"].map(String::from),
            )
            .unwrap();
        Arc::new(index)
    }

    #[test]
    fn test_retrieve_ranks_by_distance() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index());
        assert_eq!(retriever.retrieve_top("4,4", 2).unwrap(), vec!["d", "b"]);
    }

    #[test]
    fn test_retrieve_hits_keep_position_and_distance() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index());
        let hits = retriever.retrieve_hits("1,1", 3).unwrap();

        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[2].distance, 2.0);
        assert_eq!(hits[2].text, "a");
    }

    #[test]
    fn test_retrieve_default_top_k() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index());
        assert_eq!(retriever.top_k(), DEFAULT_TOP_K);
        assert_eq!(retriever.retrieve("0,0").unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_retrieve_empty_index() {
        let retriever = Retriever::new(
            Arc::new(CoordinateEmbedder),
            Arc::new(SharedIndex::new(2).unwrap()),
        );
        assert!(retriever.retrieve("1,1").unwrap().is_empty());
    }

    #[test]
    fn test_embedder_error_propagates() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index());
        let result = retriever.retrieve("not a vector");
        assert!(matches!(
            result,
            Err(RetrievalError::Collaborator(CollaboratorError::Embedding(_)))
        ));
    }

    #[test]
    fn test_dimension_mismatch_propagates() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index());
        let result = retriever.retrieve("1,2,3");
        assert!(matches!(result, Err(RetrievalError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let retriever = Retriever::new(Arc::new(CoordinateEmbedder), populated_index()).with_top_k(0);
        assert!(matches!(
            retriever.retrieve("0,0"),
            Err(RetrievalError::Configuration { .. })
        ));
    }
}
