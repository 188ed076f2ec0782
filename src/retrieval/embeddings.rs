//! Embedding collaborator.
//!
//! [`Embedder`] is the only thing the retrieval core knows about the model.
//! [`EmbeddingModel`] implements it on top of fastembed:
//! - Model download into `<base>/models` on first use, bounded by a timeout
//! - Dimensions probed once at start-up
//! - Batch embedding under a mutex

use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use fastembed::{InitOptions, TextEmbedding};

use crate::retrieval::error::CollaboratorError;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model and always return
/// vectors of [`Embedder::dimensions`] floats.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed several texts, one vector per input in the same order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| CollaboratorError::Embedding("No embedding returned".to_string()))
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

impl From<EmbeddingError> for CollaboratorError {
    fn from(err: EmbeddingError) -> Self {
        CollaboratorError::Embedding(err.to_string())
    }
}

impl EmbeddingModel {
    /// Load `model_name`, downloading it into `<cache_dir>/models` if needed.
    ///
    /// Initialization that takes longer than `download_timeout` fails with
    /// [`EmbeddingError::InitFailed`]; the download keeps going in the
    /// background and is reused on the next start.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::debug!(
            "Loading embedding model '{}' from {} (timeout {}s)",
            model_name,
            models_dir.display(),
            timeout.as_secs()
        );

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(TextEmbedding::try_new(options));
        });

        let mut model = match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|e| EmbeddingError::InitFailed(e.to_string()))?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(EmbeddingError::InitFailed(format!(
                    "model '{}' was not ready after {}s",
                    model_name,
                    timeout.as_secs()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(EmbeddingError::InitFailed(
                    "model loader exited without a result".to_string(),
                ))
            }
        };

        let dimensions = probe_dimensions(&mut model)?;
        log::info!("Embedding model '{}' ready ({} dimensions)", model_name, dimensions);

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

/// Resolve a model name, ignoring case, dashes and dots.
fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    let normalized: String = name
        .chars()
        .filter(|c| !matches!(c, '-' | '.' | '_'))
        .collect::<String>()
        .to_lowercase();

    let model = match normalized.as_str() {
        "allminilml6v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
        "allminilml6v2q" => fastembed::EmbeddingModel::AllMiniLML6V2Q,
        "bgesmallenv15" => fastembed::EmbeddingModel::BGESmallENV15,
        "bgesmallenv15q" => fastembed::EmbeddingModel::BGESmallENV15Q,
        "bgebaseenv15" => fastembed::EmbeddingModel::BGEBaseENV15,
        "bgebaseenv15q" => fastembed::EmbeddingModel::BGEBaseENV15Q,
        _ => {
            return Err(EmbeddingError::InvalidModel(format!(
                "{name} (supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, each with an optional -q suffix)"
            )))
        }
    };
    Ok(model)
}

/// Embed a probe string to learn the vector length.
fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
    let probe = model
        .embed(vec!["dimension probe"], None)
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

    match probe.first() {
        Some(v) if !v.is_empty() => Ok(v.len()),
        _ => Err(EmbeddingError::InitFailed("Model returned no embedding".to_string())),
    }
}

impl Embedder for EmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::EmbeddingFailed("model lock poisoned".to_string()))?;

        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        log::debug!("Embedded {} texts with '{}'", texts.len(), self.model_name);
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Embedder for Fixed {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_embed_one_defaults_to_batch() {
        assert_eq!(Fixed.embed_one("abc").unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_model_name_spellings() {
        for name in ["all-MiniLM-L6-v2", "allminilml6v2", "ALL_MINILM_L6_V2"] {
            assert!(matches!(
                parse_model_name(name),
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
            ));
        }
        assert!(matches!(
            parse_model_name("bge-base-en-v1.5-q"),
            Ok(fastembed::EmbeddingModel::BGEBaseENV15Q)
        ));
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", temp_dir.path().to_path_buf(), None);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_embedding_error_becomes_collaborator_error() {
        let err: CollaboratorError = EmbeddingError::EmbeddingFailed("boom".into()).into();
        assert!(matches!(err, CollaboratorError::Embedding(msg) if msg.contains("boom")));
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation_and_embedding() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None)
            .unwrap();

        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384);

        let embedding = model.embed_one("The applicant must submit stability data.").unwrap();
        assert_eq!(embedding.len(), 384);

        // fastembed normalizes embeddings (L2 norm ~= 1)
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
