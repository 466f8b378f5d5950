//! # Embedder
//!
//! Turns text into vectors through an [`EmbeddingProvider`], with:
//!
//! - an [`EmbeddingCache`] consulted before and populated after every call,
//! - a primary → fallback model list,
//! - per-model retries with capped exponential backoff ([`RetryPolicy`]),
//! - dimensionality validation against the dimension the store has already
//!   established, so vectors from different embedding spaces never mix.
//!
//! [`Embedder::embed`] never fails. When every model and attempt is exhausted
//! it caches an empty vector for that exact text and returns it; the caller
//! treats the chunk as unsearchable and moves on.
//!
//! The cache and the established dimension share one [`tokio::sync::Mutex`].
//! The lock is never held across a provider call.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::EmbeddingCache;
use crate::error::EmbedError;
use crate::provider::EmbeddingProvider;

/// How hard to try each model before falling back to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per model, including the first one.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single sleep.
    pub max_backoff: Duration,
    /// Optional wall-clock bound across all models and attempts for one text.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            deadline: None,
        }
    }

    /// Sleep before retry number `attempt + 1` (0-based): `initial * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
struct EmbedderState {
    cache: EmbeddingCache,
    dimension: Option<usize>,
}

/// Cached, retrying front-end to an embedding provider.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    models: Vec<String>,
    policy: RetryPolicy,
    retry_failed: bool,
    state: Mutex<EmbedderState>,
}

impl Embedder {
    /// Create an embedder trying `models` in order.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        models: Vec<String>,
        policy: RetryPolicy,
        cache: EmbeddingCache,
    ) -> Self {
        Self {
            provider,
            models,
            policy,
            retry_failed: false,
            state: Mutex::new(EmbedderState {
                cache,
                dimension: None,
            }),
        }
    }

    /// Pin the dimensionality up front instead of learning it from the first success.
    pub fn with_dimension(mut self, dimension: Option<usize>) -> Self {
        self.state.get_mut().dimension = dimension;
        self
    }

    /// When `true`, cached failure sentinels are retried instead of returned.
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Embed `text`, returning an empty vector on total failure.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.try_embed(text).await {
            Ok(vector) => vector,
            Err(err) => {
                debug!("Embedding unavailable: {}", err);
                Vec::new()
            }
        }
    }

    /// Embed `text`, reporting why it failed.
    ///
    /// On exhaustion the failure sentinel is cached and the last provider
    /// error is returned.
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidRequest("empty input".into()));
        }
        if self.models.is_empty() {
            return Err(EmbedError::InvalidRequest(
                "no embedding models configured".into(),
            ));
        }

        {
            let mut state = self.state.lock().await;
            let cached = state.cache.get(text).map(<[f32]>::to_vec);
            match cached {
                Some(vector) if vector.is_empty() && !self.retry_failed => {
                    debug!("Cached failure sentinel, not retrying");
                    return Err(EmbedError::PreviouslyFailed);
                }
                Some(vector)
                    if !vector.is_empty()
                        && state.dimension.is_none_or(|d| d == vector.len()) =>
                {
                    debug!("Embedding cache hit ({} dims)", vector.len());
                    if state.dimension.is_none() {
                        info!("Embedding dimension established: {}", vector.len());
                        state.dimension = Some(vector.len());
                    }
                    return Ok(vector);
                }
                _ => {}
            }
        }

        let started = Instant::now();
        let mut last_error = EmbedError::EmptyResponse;

        'models: for model in &self.models {
            for attempt in 0..self.policy.max_attempts {
                if let Some(deadline) = self.policy.deadline {
                    if started.elapsed() >= deadline {
                        // No sentinel: the text stays retryable.
                        warn!("Embedding deadline of {:?} exceeded", deadline);
                        return Err(EmbedError::DeadlineExceeded(deadline));
                    }
                }

                info!("Embedding attempt {} with model={}", attempt + 1, model);
                let err = match self.provider.embed(text, model).await {
                    Ok(vector) => match self.accept(text, vector).await {
                        Ok(vector) => return Ok(vector),
                        Err(err) => err,
                    },
                    Err(err) => err,
                };

                warn!("Embedding failed with {}: {}", model, err);
                let transient = err.is_transient();
                last_error = err;

                if !transient {
                    continue 'models;
                }
                if attempt + 1 < self.policy.max_attempts {
                    let mut pause = self.policy.backoff(attempt);
                    if let Some(deadline) = self.policy.deadline {
                        pause = pause.min(deadline.saturating_sub(started.elapsed()));
                    }
                    tokio::time::sleep(pause).await;
                }
            }
        }

        error!("All embedding attempts failed, caching empty embedding");
        self.state.lock().await.cache.put(text, Vec::new());
        Err(last_error)
    }

    /// Validate a fresh vector, fix the dimension if unset, and cache it.
    async fn accept(&self, text: &str, vector: Vec<f32>) -> Result<Vec<f32>, EmbedError> {
        if vector.is_empty() {
            return Err(EmbedError::EmptyResponse);
        }

        let mut state = self.state.lock().await;
        match state.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => {
                info!("Embedding dimension established: {}", vector.len());
                state.dimension = Some(vector.len());
            }
        }

        state.cache.put(text, vector.clone());
        debug!("Embedding cached");
        Ok(vector)
    }

    /// Dimension established so far, if any.
    pub async fn dimension(&self) -> Option<usize> {
        self.state.lock().await.dimension
    }

    /// Tell the cache a record built from `text` exists at `timestamp`.
    pub async fn note_reference(&self, text: &str, timestamp: DateTime<Utc>) {
        self.state.lock().await.cache.note_reference(text, timestamp);
    }

    /// Number of cache entries (failure sentinels included).
    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Evict up to `count` of the oldest cache entries and persist the result.
    pub async fn evict_cache(&self, count: usize) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.cache.evict(count);
        if removed > 0 {
            state.cache.persist();
        }
        removed
    }
}
