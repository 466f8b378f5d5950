//! Deterministic embedding provider for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::EmbedError;
use crate::provider::EmbeddingProvider;

/// Embeds text as keyword counts over a fixed vocabulary.
///
/// Texts containing `poison` fail permanently on every model.
pub struct KeywordProvider {
    vocabulary: Vec<&'static str>,
    calls: AtomicUsize,
}

impl KeywordProvider {
    pub fn new() -> Self {
        Self {
            vocabulary: vec![
                "france", "paris", "capital", "rust", "memory", "borrow", "python", "snake",
            ],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.vocabulary
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("poison") {
            return Err(EmbedError::Status {
                status: 400,
                body: "rejected".into(),
            });
        }
        Ok(self.vector(text))
    }
}
