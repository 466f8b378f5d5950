//! # Context window (retrieved memories → chat preamble)
//!
//! A small buffer of retrieved [`SearchMatch`]es sized for a chat prompt.
//! It does no embedding or ranking itself; callers push in whatever
//! [`VectorStore::search`](crate::vector_store::VectorStore::search) returned.
//!
//! - Enforces a token budget (`max_tokens`) against the serialized memories.
//!   When over budget, the **lowest-scoring** match is evicted first.
//! - Produces a three-message preamble:
//!   1. a system message with the caller's system prompt,
//!   2. a user message carrying the memories as JSON,
//!   3. an assistant `"Ok"` acknowledgement.
//!
//! ## Quick start
//! ```rust
//! use std::sync::Arc;
//! use jade_memory::chunker::Cl100kTokenizer;
//! use jade_memory::context::{ContextWindow, Role};
//! use jade_memory::search::SearchMatch;
//!
//! let tokenizer = Arc::new(Cl100kTokenizer::new().unwrap());
//! let mut window = ContextWindow::new(256, "You are a helpful assistant.", tokenizer);
//! window.push(SearchMatch {
//!     id: "doc1_chunk_0".into(),
//!     source: "doc1".into(),
//!     text: "Paris is the capital of France.".into(),
//!     similarity: 0.82,
//!     score: 0.9,
//! });
//!
//! let preamble = window.build_preamble();
//! assert_eq!(preamble.len(), 3);
//! assert_eq!(preamble[2].role, Role::Assistant);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chunker::Tokenizer;
use crate::search::SearchMatch;

const ABOUT: &str = "This JSON object holds memories retrieved for the current question, \
     most relevant first.";

const PREFACE: &str = "Below is a JSON representation of memories relevant to this conversation. \
     Please only respond to this message with \"Ok.\":\n";

/// Chat role of a preamble message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message (role + content), in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Retrieved memories held under a token budget.
pub struct ContextWindow {
    memories: Vec<SearchMatch>,
    max_tokens: usize,
    system_prompt: String,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindow")
            .field("memories", &self.memories.len())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ContextWindow {
    pub fn new(
        max_tokens: usize,
        system_prompt: impl Into<String>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            memories: Vec::new(),
            max_tokens,
            system_prompt: system_prompt.into(),
            tokenizer,
        }
    }

    /// Memories currently held, highest score first.
    pub fn memories(&self) -> &[SearchMatch] {
        &self.memories
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Add one match and enforce the budget.
    pub fn push(&mut self, memory: SearchMatch) {
        self.memories.push(memory);
        self.memories.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.enforce_token_limit();
    }

    /// Add every match in `memories` and enforce the budget once.
    pub fn extend(&mut self, memories: impl IntoIterator<Item = SearchMatch>) {
        self.memories.extend(memories);
        self.memories.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.enforce_token_limit();
    }

    pub fn clear(&mut self) {
        self.memories.clear();
    }

    /// Token count of [`get_serialized`](Self::get_serialized).
    pub fn token_count(&self) -> usize {
        self.tokenizer.count(&self.get_serialized())
    }

    /// Drop lowest-scoring memories until the serialized form fits.
    fn enforce_token_limit(&mut self) {
        let mut tokens = self.token_count();
        while tokens > self.max_tokens && !self.memories.is_empty() {
            if let Some(evicted) = self.memories.pop() {
                debug!(
                    "Context over budget ({} > {}), evicting {}",
                    tokens, self.max_tokens, evicted.id
                );
            }
            tokens = self.token_count();
        }
        info!(
            "Context holds {} memories ({} tokens)",
            self.memories.len(),
            tokens
        );
    }

    /// Preface line followed by `{"about": ..., "memories": [...]}`.
    pub fn get_serialized(&self) -> String {
        let memories: Vec<_> = self
            .memories
            .iter()
            .map(|m| json!({ "id": m.id, "source": m.source, "content": m.text }))
            .collect();
        let body = json!({ "about": ABOUT, "memories": memories });
        format!("{PREFACE}{body}")
    }

    /// system → user(memories JSON) → assistant("Ok").
    pub fn build_preamble(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::System, self.system_prompt.clone()),
            ChatMessage::new(Role::User, self.get_serialized()),
            ChatMessage::new(Role::Assistant, "Ok"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            text.split_whitespace().map(|_| 0).collect()
        }

        fn decode(&self, _tokens: &[u32]) -> Option<String> {
            None
        }
    }

    fn hit(id: &str, text: &str, score: f32) -> SearchMatch {
        SearchMatch {
            id: id.into(),
            source: "doc".into(),
            text: text.into(),
            similarity: score,
            score,
        }
    }

    #[test]
    fn test_preamble_shape() {
        let mut window = ContextWindow::new(1_000, "Be brief.", Arc::new(WordTokenizer));
        window.push(hit("doc_chunk_0", "Paris is the capital of France.", 0.9));

        let preamble = window.build_preamble();
        let roles: Vec<Role> = preamble.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(preamble[0].content, "Be brief.");
        assert!(preamble[1].content.contains("Paris is the capital of France."));
        assert_eq!(preamble[2].content, "Ok");

        let wire = serde_json::to_value(&preamble[2]).unwrap();
        assert_eq!(wire, json!({ "role": "assistant", "content": "Ok" }));
    }

    #[test]
    fn test_budget_evicts_lowest_score_first() {
        let empty = ContextWindow::new(0, "", Arc::new(WordTokenizer)).token_count();
        let long_text = "word ".repeat(20);

        let mut window = ContextWindow::new(empty + 30, "", Arc::new(WordTokenizer));
        window.extend(vec![
            hit("weak", &long_text, 0.2),
            hit("strong", &long_text, 0.9),
        ]);

        let ids: Vec<&str> = window.memories().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["strong"]);
        assert!(window.token_count() <= window.max_tokens());
    }

    #[test]
    fn test_nothing_fits_leaves_window_empty() {
        let mut window = ContextWindow::new(1, "", Arc::new(WordTokenizer));
        window.push(hit("a", "some text", 0.5));
        assert!(window.memories().is_empty());
        assert_eq!(window.build_preamble().len(), 3);
    }
}
