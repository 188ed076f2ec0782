use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::retrieval::chunker::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::retrieval::retriever::DEFAULT_TOP_K;
use crate::retrieval::{RetrievalError, RetrievalResult};
use crate::storage::{self, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model (384 dimensions)
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_ANSWER_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 60;

/// Configuration for chunking, embedding and retrieval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Words per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared by consecutive chunks, must be below chunk_size
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Chunks returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            top_k: DEFAULT_TOP_K,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the OpenAI-compatible answer composer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_model")]
    pub model: String,

    /// Base URL, `/chat/completions` is appended
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_ANSWER_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            timeout_secs: DEFAULT_ANSWER_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_answer_model() -> String {
    DEFAULT_ANSWER_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_answer_timeout_secs() -> u64 {
    DEFAULT_ANSWER_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> RetrievalResult<()> {
        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(RetrievalError::configuration(
                "retrieval.chunk_size must be greater than 0",
            ));
        }
        if r.overlap >= r.chunk_size {
            return Err(RetrievalError::configuration(format!(
                "retrieval.overlap ({}) must be smaller than retrieval.chunk_size ({})",
                r.overlap, r.chunk_size
            )));
        }
        if r.top_k == 0 {
            return Err(RetrievalError::configuration(
                "retrieval.top_k must be greater than 0",
            ));
        }
        if r.download_timeout_secs == 0 {
            return Err(RetrievalError::configuration(
                "retrieval.download_timeout_secs must be greater than 0",
            ));
        }

        let a = &self.answer;
        if !(0.0..=2.0).contains(&a.temperature) {
            return Err(RetrievalError::configuration(format!(
                "answer.temperature must be between 0.0 and 2.0, got {}",
                a.temperature
            )));
        }
        if a.max_tokens == 0 {
            return Err(RetrievalError::configuration(
                "answer.max_tokens must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults if missing.
    pub fn load_with(base_path: impl AsRef<Path>) -> RetrievalResult<Self> {
        let store = storage::BackendLocal::new(base_path.as_ref())?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, to_yaml(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .map_err(|_| RetrievalError::configuration("config file is not valid utf8"))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .map_err(|e| RetrievalError::configuration(format!("config is malformed: {e}")))?;

        config.base_path = base_path.as_ref().to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != to_yaml(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> RetrievalResult<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;
        store.write(CONFIG_FILE, to_yaml(self)?.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn to_yaml(config: &Config) -> RetrievalResult<String> {
    serde_yml::to_string(config)
        .map_err(|e| RetrievalError::configuration(format!("cannot serialize config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(config.answer, AnswerConfig::default());
        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_config_is_filled_and_resaved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "retrieval:\n  chunk_size: 200\n  overlap: 20\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.retrieval.chunk_size, 200);
        assert_eq!(config.retrieval.overlap, 20);
        assert_eq!(config.retrieval.top_k, DEFAULT_TOP_K);

        let written = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(written.contains("top_k"));
        assert!(written.contains("api_key_env"));
    }

    #[test]
    fn test_overlap_not_below_chunk_size_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "retrieval:\n  chunk_size: 10\n  overlap: 10\n",
        )
        .unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(RetrievalError::Configuration { .. })));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.answer.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.download_timeout_secs = 0;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_malformed_config_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "retrieval: [not, a, map]").unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(RetrievalError::Configuration { .. })));
    }
}
