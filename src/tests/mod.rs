mod snapshot;

use crate::retrieval::{CollaboratorError, Embedder};

/// Deterministic letter-count embedder over a-z.
pub(crate) struct LetterEmbedder;

impl Embedder for LetterEmbedder {
    fn dimensions(&self) -> usize {
        26
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        Ok(texts.iter().map(|t| letter_counts(t)).collect())
    }
}

pub(crate) fn letter_counts(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for b in text.bytes().map(|b| b.to_ascii_lowercase()) {
        if b.is_ascii_lowercase() {
            v[(b - b'a') as usize] += 1.0;
        }
    }
    v
}
