//! # Embedding providers
//!
//! The [`EmbeddingProvider`] trait is the only thing the [`Embedder`](crate::embedder::Embedder)
//! knows about the outside world: text and a model name in, a vector (or an
//! [`EmbedError`]) out. Retrying, fallback and caching all live above it.
//!
//! [`OpenAiEmbeddings`] speaks the OpenAI-compatible `POST {api_base}/embeddings`
//! protocol, which also covers most local inference servers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::EmbedError;

/// A single-shot embedding call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text` with `model`. One attempt, no retries.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    /// Build a client for `api_base` (e.g. `https://api.openai.com/v1`).
    ///
    /// An empty `api_key` sends no `Authorization` header, which is what most
    /// local servers expect.
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        if self.api_base.ends_with("/embeddings") {
            self.api_base.clone()
        } else {
            format!("{}/embeddings", self.api_base)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::InvalidRequest("empty input".into()));
        }

        let mut request = self
            .client
            .post(self.endpoint())
            .json(&EmbeddingRequest { model, input: text });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        debug!("POST {} model={}", self.endpoint(), model);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbedError::EmptyResponse)?;

        if vector.is_empty() {
            return Err(EmbedError::EmptyResponse);
        }
        Ok(vector)
    }
}
