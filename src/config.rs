//! This module provides functionality for loading and handling the memory store's configuration.
//!
//! It defines the `MemoryConfig` struct, which holds file locations, embedding
//! provider settings and the chunking/search/rerank knobs, and a `load_config`
//! function to load the configuration from a YAML file.
//!
//! Every field has a default, so a partial (or empty) file is valid.
//!
//! # Examples
//!
//! ```no_run
//! use jade_memory::config::{MemoryConfig, load_config};
//!
//! let config: MemoryConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{env, error::Error, fs, path::PathBuf, time::Duration};

use tracing::debug;

use crate::embedder::RetryPolicy;
use crate::search::Rerank;

/// Retry settings as they appear in YAML.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Optional overall bound per text, across every model and attempt.
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
            deadline_ms: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Represents the memory store's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Embedding cache snapshot (`text → vector` JSON object).
    pub embed_cache_file: PathBuf,

    /// Vector database snapshot (JSON array of records).
    pub vector_db_file: PathBuf,

    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// API key. When empty, `OPENAI_API_KEY` is used.
    pub api_key: String,

    /// Embedding models in priority order; the first is primary, the rest are fallbacks.
    pub embedding_models: Vec<String>,

    /// Pin the embedding dimensionality instead of learning it from the first success.
    pub expected_dimension: Option<usize>,

    /// Maximum number of cached embeddings.
    pub max_cache_size: usize,

    /// Retry texts whose embedding already failed this session.
    pub retry_failed_embeddings: bool,

    pub retry: RetryConfig,

    /// Chunk window in tokens.
    pub chunk_size: usize,

    /// Tokens shared by consecutive chunks.
    pub chunk_overlap: usize,

    /// Base similarity floor.
    pub min_similarity: f32,

    /// Adjust the floor by query length when the caller gives none.
    pub dynamic_similarity: bool,

    /// Candidates kept for the rerank pass.
    pub max_rerank_candidates: usize,

    pub rerank: bool,
    pub position_weight: f32,
    pub recency_weight: f32,
    pub recency_window_hours: u64,

    /// Token budget for retrieved context handed to the chat model.
    pub context_max_tokens: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embed_cache_file: PathBuf::from("knowledge_repo/embedding_cache.json"),
            vector_db_file: PathBuf::from("knowledge_repo/vector_db.json"),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            embedding_models: vec![
                "text-embedding-3-large".to_string(),
                "text-embedding-ada-002".to_string(),
            ],
            expected_dimension: None,
            max_cache_size: 10_000,
            retry_failed_embeddings: false,
            retry: RetryConfig::default(),
            chunk_size: 500,
            chunk_overlap: 100,
            min_similarity: 0.6,
            dynamic_similarity: true,
            max_rerank_candidates: 10,
            rerank: true,
            position_weight: 0.1,
            recency_weight: 0.1,
            recency_window_hours: 24,
            context_max_tokens: 1024,
        }
    }
}

impl MemoryConfig {
    /// Check the settings that would make chunking or search meaningless.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".into());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )
            .into());
        }
        if self.embedding_models.is_empty() {
            return Err("at least one embedding model is required".into());
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(format!(
                "min_similarity ({}) must be within [-1, 1]",
                self.min_similarity
            )
            .into());
        }
        Ok(())
    }

    /// The configured key, or `OPENAI_API_KEY` when it is empty.
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.is_empty() {
            env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    /// Rerank weights, or `None` when reranking is off.
    pub fn rerank_weights(&self) -> Option<Rerank> {
        self.rerank.then(|| Rerank {
            position_weight: self.position_weight,
            recency_weight: self.recency_weight,
            recency_window: Duration::from_secs(self.recency_window_hours * 60 * 60),
        })
    }
}

/// Loads the memory store's configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid YAML, or fails
/// [`MemoryConfig::validate`].
pub fn load_config(file: &str) -> Result<MemoryConfig, Box<dyn Error>> {
    debug!("Loading config: {:?}", file);
    let content = fs::read_to_string(file)?;
    let config: MemoryConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
