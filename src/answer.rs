//! Question answering on top of retrieval.
//!
//! The retriever supplies chunks best-first; an [`AnswerComposer`] turns them
//! into prose. An empty retrieval is answered without calling the composer.

use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::AnswerConfig;
use crate::retrieval::{CollaboratorError, RetrievalResult, Retriever};

/// Shown when retrieval finds nothing.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the documents.";

const CHAT_PATH: &str = "/chat/completions";

/// Produces an answer from a query and its ranked chunks.
pub trait AnswerComposer: Send + Sync {
    fn compose(&self, query: &str, ranked_chunks: &[String]) -> Result<String, CollaboratorError>;
}

/// Result of answering a question.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Retrieval came back empty
    NoRelevantInformation,
    Generated {
        text: String,
        /// Chunks the answer was composed from, best first
        sources: Vec<String>,
    },
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::NoRelevantInformation => f.write_str(NO_RELEVANT_INFORMATION),
            Answer::Generated { text, .. } => f.write_str(text),
        }
    }
}

/// Build the completion prompt for `query` over numbered source chunks.
pub fn build_prompt(query: &str, chunks: &[String]) -> String {
    let mut prompt = String::from("Answer the question based on these regulatory documents:\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!("Document {}:\n{}\n\n", i + 1, chunk));
    }
    prompt.push_str(&format!("Question: {query}\nAnswer:"));
    prompt
}

/// Retrieval followed by answer composition.
pub struct QaEngine<C> {
    retriever: Retriever,
    composer: C,
}

impl<C: AnswerComposer> QaEngine<C> {
    pub fn new(retriever: Retriever, composer: C) -> Self {
        Self {
            retriever,
            composer,
        }
    }

    /// Answer `query` from the retriever's default number of chunks.
    pub fn answer(&self, query: &str) -> RetrievalResult<Answer> {
        self.answer_top(query, self.retriever.top_k())
    }

    pub fn answer_top(&self, query: &str, top_k: usize) -> RetrievalResult<Answer> {
        log::info!("Processing query: {}", query);

        let chunks = self.retriever.retrieve_top(query, top_k)?;
        if chunks.is_empty() {
            log::warn!("No relevant chunks found for query");
            return Ok(Answer::NoRelevantInformation);
        }

        let text = self.composer.compose(query, &chunks)?;
        log::info!("Answer generated from {} chunks", chunks.len());

        Ok(Answer::Generated {
            text,
            sources: chunks,
        })
    }
}

/// Composer backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiComposer {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiComposer {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &AnswerConfig) -> Result<Self, CollaboratorError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            CollaboratorError::Composer(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &AnswerConfig, api_key: String) -> Result<Self, CollaboratorError> {
        if api_key.trim().is_empty() {
            return Err(CollaboratorError::Composer("API key is empty".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::Composer(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", config.api_base.trim_end_matches('/'), CHAT_PATH),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

impl AnswerComposer for OpenAiComposer {
    fn compose(&self, query: &str, ranked_chunks: &[String]) -> Result<String, CollaboratorError> {
        let prompt = build_prompt(query, ranked_chunks);

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&prompt))
            .send()
            .map_err(|e| CollaboratorError::Composer(format!("request to {} failed: {}", self.url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(CollaboratorError::Composer(format!("HTTP {status}: {text}")));
        }

        let body: Value = resp
            .json()
            .map_err(|e| CollaboratorError::Composer(e.to_string()))?;

        parse_completion(&body)
    }
}

/// Extract the first choice's message text.
fn parse_completion(body: &Value) -> Result<String, CollaboratorError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| CollaboratorError::Composer("No choices in response".into()))?;

    choice["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| CollaboratorError::Composer("No content in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Embedder, RetrievalError, SharedIndex};
    use std::sync::{Arc, Mutex};

    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("stability") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingComposer {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl AnswerComposer for RecordingComposer {
        fn compose(&self, query: &str, ranked_chunks: &[String]) -> Result<String, CollaboratorError> {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), ranked_chunks.to_vec()));
            Ok(format!("answer from {} chunks", ranked_chunks.len()))
        }
    }

    struct FailingComposer;

    impl AnswerComposer for FailingComposer {
        fn compose(&self, _: &str, _: &[String]) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Composer("service unavailable".into()))
        }
    }

    fn retriever(chunks: &[(&str, [f32; 2])]) -> Retriever {
        let index = SharedIndex::new(2).unwrap();
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|(_, v)| v.to_vec()).collect();
        let texts: Vec<String> = chunks.iter().map(|(t, _)| t.to_string()).collect();
        index.add(&vectors, &texts).unwrap();
        Retriever::new(Arc::new(AxisEmbedder), Arc::new(index)).with_top_k(2)
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(
            "What must be submitted?",
            &["Stability data.".to_string(), "Site list.".to_string()],
        );
        assert_eq!(
            prompt,
            "Answer the question based on these regulatory documents:\n\n\
             Document 1:\nStability data.\n\n\
             Document 2:\nSite list.\n\n\
             Question: What must be submitted?\nAnswer:"
        );
    }

    #[test]
    fn test_empty_retrieval_skips_composer() {
        let composer = RecordingComposer::default();
        let engine = QaEngine::new(retriever(&[]), composer);

        let answer = engine.answer("stability?").unwrap();
        assert_eq!(answer, Answer::NoRelevantInformation);
        assert_eq!(answer.to_string(), NO_RELEVANT_INFORMATION);
        assert!(engine.composer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_composer_receives_ranked_chunks() {
        let engine = QaEngine::new(
            retriever(&[
                ("site inspections", [0.0, 1.0]),
                ("stability data", [1.0, 0.0]),
                ("labelling", [0.0, 2.0]),
            ]),
            RecordingComposer::default(),
        );

        let answer = engine.answer("stability requirements").unwrap();
        assert_eq!(
            answer,
            Answer::Generated {
                text: "answer from 2 chunks".to_string(),
                sources: vec!["stability data".to_string(), "site inspections".to_string()],
            }
        );

        let calls = engine.composer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "stability requirements");
    }

    #[test]
    fn test_composer_error_propagates() {
        let engine = QaEngine::new(retriever(&[("stability data", [1.0, 0.0])]), FailingComposer);
        let result = engine.answer("stability");
        assert!(matches!(
            result,
            Err(RetrievalError::Collaborator(CollaboratorError::Composer(_)))
        ));
    }

    #[test]
    fn test_parse_completion() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Submit stability data.\n" } }]
        });
        assert_eq!(parse_completion(&body).unwrap(), "Submit stability data.");

        assert!(parse_completion(&json!({ "choices": [] })).is_err());
        assert!(parse_completion(&json!({ "choices": [{ "message": {} }] })).is_err());
    }

    #[test]
    fn test_composer_url_and_body() {
        let config = AnswerConfig {
            api_base: "http://localhost:11434/v1/".to_string(),
            model: "llama3".to_string(),
            ..AnswerConfig::default()
        };
        let composer = OpenAiComposer::new(&config, "sk-test".to_string()).unwrap();
        assert_eq!(composer.url(), "http://localhost:11434/v1/chat/completions");

        let body = composer.request_body("hello");
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 300);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenAiComposer::new(&AnswerConfig::default(), "  ".to_string());
        assert!(matches!(result, Err(CollaboratorError::Composer(_))));
    }
}
