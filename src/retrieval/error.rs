//! Error taxonomy shared by the chunker, index, storage and retriever.

/// Failures raised by an external collaborator (embedder, text source, composer).
///
/// The core never retries these; they are handed to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Answer composer failed: {0}")]
    Composer(String),
}

/// Errors that can occur during retrieval operations.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Arity mismatch: {vectors} vectors for {chunks} chunks")]
    ArityMismatch { vectors: usize, chunks: usize },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

impl RetrievalError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a corrupt snapshot error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot(message.into())
    }

    /// True for an embedder/text-source/composer failure.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

/// Result type for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_is_transparent() {
        let err: RetrievalError = CollaboratorError::Embedding("model offline".into()).into();
        assert!(err.is_collaborator());
        assert_eq!(err.to_string(), "Embedding service error: model offline");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RetrievalError::DimensionMismatch {
            expected: 384,
            got: 3,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 3");
    }
}
