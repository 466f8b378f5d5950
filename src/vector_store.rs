//! # VectorStore
//!
//! Local long-term memory for a chat agent.
//!
//! This module composes the pieces of the crate behind two operations:
//!
//! - [`VectorStore::add_text`]: hash the document, chunk it into token windows,
//!   embed each chunk and append one [`MemoryRecord`] per chunk.
//! - [`VectorStore::search`]: embed the query, cosine-scan every record, apply
//!   the similarity floor, rerank and return the best matches.
//!
//! plus the maintenance operations (`list_memories`, `get_memory_stats`,
//! `delete_memory`, `delete_source`, `clean_duplicates`, `clear_all_memories`).
//!
//! ## Responsibilities
//! - **Embedding**: delegated to an [`Embedder`] (cache + retries + model fallback).
//! - **Chunking**: [`Chunker`] over a [`Tokenizer`] (`cl100k_base` by default).
//! - **Persistence**: both snapshots are loaded at construction and rewritten
//!   after every mutation.
//! - **Concurrency**: records sit behind a [`tokio::sync::RwLock`]. Searches
//!   share the read lock; mutations take the write lock. No lock is held
//!   while waiting on the embedding provider.
//!
//! Nothing here returns an error to the caller. Embedding failures make a
//! chunk unsearchable (or a search empty); disk failures are logged.
//!
//! ## Quick Example
//! ```no_run
//! use jade_memory::config::MemoryConfig;
//! use jade_memory::vector_store::VectorStore;
//!
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = VectorStore::open(&MemoryConfig::default())?;
//! store.add_text("Paris is the capital of France.", "doc1").await;
//! for hit in store.search("capital of France", 1, None).await {
//!     println!("{:.3} {}", hit.similarity, hit.snippet());
//! }
//! # Ok(()) }
//! ```

use chrono::Utc;
use serde_json::{Value, json};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::chunker::{Chunker, Cl100kTokenizer, Tokenizer};
use crate::config::MemoryConfig;
use crate::context::ContextWindow;
use crate::embedder::Embedder;
use crate::provider::{EmbeddingProvider, OpenAiEmbeddings};
use crate::record::{
    MemoryRecord, MemoryStats, MemorySummary, RecordMeta, content_hash, record_id,
};
use crate::search::{
    FixedThreshold, QueryLengthThreshold, Rerank, SearchMatch, SearchParams, ThresholdStrategy,
    rank,
};
use crate::store::RecordStore;

/// Default number of results for [`VectorStore::search`] callers with no preference.
pub const DEFAULT_TOP_K: usize = 3;

/// Embedding-backed memory store.
pub struct VectorStore {
    embedder: Embedder,
    chunker: Chunker,
    records: RwLock<RecordStore>,
    threshold: Box<dyn ThresholdStrategy>,
    max_rerank_candidates: usize,
    rerank: Option<Rerank>,
    context_max_tokens: usize,
}

impl VectorStore {
    /// Open the store described by `config` using the OpenAI-compatible
    /// provider and the `cl100k_base` tokenizer.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the tokenizer
    /// cannot be built. Missing or corrupt snapshot files are not errors.
    pub fn open(config: &MemoryConfig) -> Result<Self, Box<dyn Error>> {
        config.validate()?;
        let provider = Arc::new(OpenAiEmbeddings::new(
            config.api_base.clone(),
            config.resolved_api_key(),
        ));
        let tokenizer = Arc::new(Cl100kTokenizer::new()?);
        Ok(Self::new(config, provider, tokenizer))
    }

    /// Build a store around an explicit provider and tokenizer.
    ///
    /// Loads both snapshot files named in `config`. The embedding dimension is
    /// taken from `expected_dimension` if set, otherwise from the first stored
    /// record with an embedding.
    pub fn new(
        config: &MemoryConfig,
        provider: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let records = RecordStore::load(&config.vector_db_file);
        let mut cache = EmbeddingCache::load(&config.embed_cache_file, config.max_cache_size);
        for record in records.records() {
            cache.note_reference(&record.text, record.timestamp);
        }

        let dimension = config.expected_dimension.or_else(|| records.dimension());
        if let Some(dimension) = dimension {
            debug!("Embedding dimension: {}", dimension);
        }

        let embedder = Embedder::new(
            provider,
            config.embedding_models.clone(),
            config.retry_policy(),
            cache,
        )
        .with_dimension(dimension)
        .with_retry_failed(config.retry_failed_embeddings);

        let threshold: Box<dyn ThresholdStrategy> = if config.dynamic_similarity {
            Box::new(QueryLengthThreshold::new(config.min_similarity))
        } else {
            Box::new(FixedThreshold(config.min_similarity))
        };

        info!("Vector store ready: {} memories", records.len());

        Self {
            embedder,
            chunker: Chunker::new(tokenizer, config.chunk_size, config.chunk_overlap),
            records: RwLock::new(records),
            threshold,
            max_rerank_candidates: config.max_rerank_candidates,
            rerank: config.rerank_weights(),
            context_max_tokens: config.context_max_tokens,
        }
    }

    /// Replace the similarity floor strategy used when a search gives none.
    pub fn with_threshold_strategy(mut self, strategy: Box<dyn ThresholdStrategy>) -> Self {
        self.threshold = strategy;
        self
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Chunk, embed and store `text` under `source`. Returns the number of
    /// records added.
    ///
    /// Blank text and text already stored (same document or chunk hash) are
    /// no-ops. Chunks whose embedding fails are skipped.
    pub async fn add_text(&self, text: &str, source: &str) -> usize {
        if text.trim().is_empty() {
            debug!("Ignoring empty text from source={}", source);
            return 0;
        }

        info!("Storing text from source='{}', length={}", source, text.len());
        let document_hash = content_hash(text);
        if self.records.read().await.contains_hash(&document_hash) {
            info!("Duplicate content detected for source={}, skipping", source);
            return 0;
        }

        let chunks = self.chunker.chunk(text);
        let total_chunks = chunks.len();
        let timestamp = Utc::now();

        let mut embedded = Vec::with_capacity(total_chunks);
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let embedding = self.embedder.embed(&chunk.text).await;
            if embedding.is_empty() {
                warn!(
                    "Skipping chunk {} of source={}: embedding failed",
                    chunk_index, source
                );
                continue;
            }
            embedded.push((chunk_index, chunk, embedding));
        }

        let added: Vec<String> = {
            let mut records = self.records.write().await;
            if records.contains_hash(&document_hash) {
                info!("Content from source={} was stored concurrently, skipping", source);
                return 0;
            }

            let base = records.next_chunk_index(source);
            let new_records: Vec<MemoryRecord> = embedded
                .into_iter()
                .map(|(chunk_index, chunk, embedding)| MemoryRecord {
                    id: record_id(source, base + chunk_index),
                    meta: RecordMeta {
                        source: source.to_string(),
                        chunk_index,
                        total_chunks,
                        start: chunk.start,
                        end: chunk.end,
                        document_hash: Some(document_hash.clone()),
                        ..Default::default()
                    },
                    text_hash: content_hash(&chunk.text),
                    text: chunk.text,
                    embedding,
                    timestamp,
                })
                .collect();

            let texts = new_records.iter().map(|r| r.text.clone()).collect();
            records.insert(new_records);
            info!("Done storing. DB now has {} entries.", records.len());
            texts
        };

        for text in &added {
            self.embedder.note_reference(text, timestamp).await;
        }
        added.len()
    }

    /// Best matches for `query`, most relevant first.
    ///
    /// With `min_similarity == None` the floor comes from the threshold
    /// strategy. Returns an empty list if the query cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: Option<f32>,
    ) -> Vec<SearchMatch> {
        if query.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }
        if self.records.read().await.is_empty() {
            debug!("DB empty");
            return Vec::new();
        }

        let query_embedding = self.embedder.embed(query).await;
        if query_embedding.is_empty() {
            warn!("Empty embedding for query, returning no results");
            return Vec::new();
        }

        let params = SearchParams {
            top_k,
            min_similarity: min_similarity.unwrap_or_else(|| self.threshold.threshold(query)),
            max_candidates: self.max_rerank_candidates,
            rerank: self.rerank.clone(),
        };

        let hits = {
            let records = self.records.read().await;
            rank(records.records(), &query_embedding, &params, Utc::now())
        };

        debug!(
            "{} hits for query (floor {:.2})",
            hits.len(),
            params.min_similarity
        );
        for (i, hit) in hits.iter().enumerate() {
            let snippet: String = hit.text.chars().take(60).collect();
            debug!(
                " {}) ID={}, Score={:.4}, Similarity={:.4}, chunk={}",
                i + 1,
                hit.id,
                hit.score,
                hit.similarity,
                snippet
            );
        }
        hits
    }

    /// [`search`](Self::search) rendered as `"[{id}] {text}"` strings.
    pub async fn search_snippets(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: Option<f32>,
    ) -> Vec<String> {
        self.search(query, top_k, min_similarity)
            .await
            .iter()
            .map(SearchMatch::snippet)
            .collect()
    }

    /// Partial retrieval payload for agent tool calls.
    pub async fn search_long_response(&self, query: &str, top_k: usize) -> Value {
        let chunks = self.search_snippets(query, top_k, None).await;
        json!({
            "chunks": chunks,
            "info": "Partial RAG data. Re-run if needed.",
        })
    }

    /// Search `query` and load the hits into a [`ContextWindow`] bounded by
    /// `context_max_tokens`.
    pub async fn context_window(
        &self,
        query: &str,
        top_k: usize,
        system_prompt: &str,
    ) -> ContextWindow {
        let mut window = ContextWindow::new(
            self.context_max_tokens,
            system_prompt,
            self.chunker.tokenizer().clone(),
        );
        window.extend(self.search(query, top_k, None).await);
        window
    }

    pub async fn list_memories(&self) -> Vec<MemorySummary> {
        self.records.read().await.list_memories()
    }

    pub async fn get_memory_stats(&self) -> MemoryStats {
        self.records.read().await.get_memory_stats()
    }

    pub async fn get_memory(&self, id: &str) -> Option<MemoryRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn delete_memory(&self, id: &str) -> bool {
        self.records.write().await.delete_memory(id)
    }

    pub async fn delete_source(&self, source: &str) -> usize {
        self.records.write().await.delete_source(source)
    }

    pub async fn clean_duplicates(&self) -> usize {
        self.records.write().await.clean_duplicates()
    }

    pub async fn clear_all_memories(&self) -> usize {
        self.records.write().await.clear_all_memories()
    }

    /// Evict up to `count` embedding cache entries, least recently referenced first.
    pub async fn evict_cache(&self, count: usize) -> usize {
        self.embedder.evict_cache(count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordProvider;
    use std::collections::HashSet;
    use tempfile::{TempDir, tempdir};

    fn config(dir: &TempDir) -> MemoryConfig {
        MemoryConfig {
            embed_cache_file: dir.path().join("embedding_cache.json"),
            vector_db_file: dir.path().join("vector_db.json"),
            embedding_models: vec!["primary".into(), "fallback".into()],
            retry: crate::config::RetryConfig {
                max_attempts: 1,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
                deadline_ms: None,
            },
            ..Default::default()
        }
    }

    fn store_with(config: &MemoryConfig, provider: Arc<KeywordProvider>) -> VectorStore {
        let tokenizer = Arc::new(Cl100kTokenizer::new().unwrap());
        VectorStore::new(config, provider, tokenizer)
    }

    #[test]
    fn test_vector_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VectorStore>();
    }

    #[tokio::test]
    async fn test_add_then_search_finds_document() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider);

        assert_eq!(store.add_text("Paris is the capital of France.", "doc1").await, 1);
        store
            .add_text("Rust ownership and the borrow checker keep memory safe.", "doc2")
            .await;

        let hits = store.search("capital of France", 1, None).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "doc1");
        assert_eq!(hits[0].id, "doc1_chunk_0");
        assert!(hits[0].similarity >= 0.7);

        let snippets = store.search_snippets("capital of France", 1, None).await;
        assert_eq!(snippets, vec!["[doc1_chunk_0] Paris is the capital of France."]);
    }

    #[tokio::test]
    async fn test_ingestion_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut config = config(&dir);
        config.chunk_size = 8;
        config.chunk_overlap = 2;
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config, provider.clone());

        let text = "Rust memory safety comes from the borrow checker. Python relies on a garbage collector instead.";
        let first = store.add_text(text, "essay").await;
        assert!(first > 1);
        let calls = provider.calls();

        assert_eq!(store.add_text(text, "essay").await, 0);
        assert_eq!(store.add_text(text, "another-source").await, 0);
        assert_eq!(store.len().await, first);
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_blank_text_is_a_no_op() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider.clone());

        assert_eq!(store.add_text("", "s").await, 0);
        assert_eq!(store.add_text("  \n\t ", "s").await, 0);
        assert!(store.is_empty().await);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let mut config = config(&dir);
        config.chunk_size = 6;
        config.chunk_overlap = 0;
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config, provider);

        let text = "Paris is the capital of France. This poison sentence will fail. Rust is memory safe.";
        let added = store.add_text(text, "mixed").await;
        let records = store.list_memories().await;

        assert_eq!(records.len(), added);
        assert!(added >= 2);
        assert!(records.iter().all(|r| !r.text_preview.contains("poison")));
    }

    #[tokio::test]
    async fn test_search_bounds_and_floor() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider);

        for (i, text) in [
            "Paris is the capital of France.",
            "France has Paris as its capital city.",
            "The capital question again: Paris, France.",
            "Rust borrow checker.",
            "A python is a snake.",
        ]
        .iter()
        .enumerate()
        {
            store.add_text(text, &format!("doc{i}")).await;
        }

        for (query, k, floor) in [
            ("Paris France capital", 2, 0.5),
            ("rust memory", 3, 0.1),
            ("snake", 5, 0.0),
        ] {
            let hits = store.search(query, k, Some(floor)).await;
            assert!(hits.len() <= k);
            assert!(hits.iter().all(|h| h.similarity >= floor));
        }
    }

    #[tokio::test]
    async fn test_unembeddable_query_returns_empty() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider);

        store.add_text("Paris is the capital of France.", "doc1").await;
        assert!(store.search("poison query", 3, Some(0.0)).await.is_empty());
        assert!(store.search("   ", 3, Some(0.0)).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_and_cache_reuse() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        let first_provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config, first_provider);
        store.add_text("Paris is the capital of France.", "doc1").await;
        store.add_text("A python is a snake.", "doc2").await;
        let before = store.list_memories().await;
        let original = store.get_memory("doc1_chunk_0").await.unwrap();

        let second_provider = Arc::new(KeywordProvider::new());
        let reopened = store_with(&config, second_provider.clone());
        assert_eq!(reopened.list_memories().await, before);
        assert_eq!(reopened.get_memory("doc1_chunk_0").await.unwrap(), original);
        assert_eq!(reopened.embedder().dimension().await, Some(8));

        // The chunk text is cached, so embedding it again is free.
        reopened.embedder().embed("Paris is the capital of France.").await;
        assert_eq!(second_provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_dimension_invariant_holds() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider);

        store.add_text("Paris is the capital of France.", "a").await;
        store.add_text("Rust borrow checker.", "b").await;
        store.add_text("Nothing in the vocabulary here.", "c").await;

        let reopened = store_with(&config(&dir), Arc::new(KeywordProvider::new()));
        let records = reopened.records.read().await;
        let dims: HashSet<usize> = records
            .records()
            .iter()
            .filter(|r| r.is_searchable())
            .map(|r| r.embedding.len())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(dims.len(), 1);
    }

    #[tokio::test]
    async fn test_maintenance_operations() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(KeywordProvider::new());
        let store = store_with(&config(&dir), provider);

        store.add_text("Paris is the capital of France.", "doc1").await;
        store.add_text("Rust borrow checker.", "doc2").await;
        store.add_text("A python is a snake.", "doc2").await;

        let stats = store.get_memory_stats().await;
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.source_counts["doc2"], 2);
        assert!(store.get_memory("doc2_chunk_1").await.is_some());

        assert!(!store.delete_memory("missing").await);
        assert_eq!(store.len().await, 3);
        assert!(store.delete_memory("doc1_chunk_0").await);
        assert_eq!(store.delete_source("doc2").await, 2);
        assert_eq!(store.delete_source("doc2").await, 0);
        assert!(store.is_empty().await);

        store.add_text("A python is a snake.", "doc3").await;
        assert_eq!(store.clear_all_memories().await, 1);
        assert_eq!(store.get_memory_stats().await, MemoryStats::default());
    }

    #[tokio::test]
    async fn test_clean_duplicates_on_loaded_snapshot() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let duplicate = |id: &str, source: &str| MemoryRecord {
            id: id.into(),
            meta: RecordMeta {
                source: source.into(),
                total_chunks: 1,
                ..Default::default()
            },
            text: "Paris is the capital of France.".into(),
            text_hash: content_hash("Paris is the capital of France."),
            embedding: vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            timestamp: Utc::now(),
        };
        crate::snapshot::save_json(
            &config.vector_db_file,
            &vec![duplicate("a_chunk_0", "first"), duplicate("b_chunk_0", "second")],
        )
        .unwrap();

        let store = store_with(&config, Arc::new(KeywordProvider::new()));
        assert_eq!(store.clean_duplicates().await, 1);

        let remaining = store.list_memories().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source, "first");
    }

    #[tokio::test]
    async fn test_long_response_payload() {
        let dir = tempdir().unwrap();
        let store = store_with(&config(&dir), Arc::new(KeywordProvider::new()));
        store.add_text("Paris is the capital of France.", "doc1").await;

        let payload = store.search_long_response("Paris capital of France", 3).await;
        assert_eq!(payload["chunks"][0], "[doc1_chunk_0] Paris is the capital of France.");
        assert!(payload["info"].as_str().unwrap().contains("Partial"));
    }

    #[tokio::test]
    async fn test_context_window_from_search() {
        let dir = tempdir().unwrap();
        let store = store_with(&config(&dir), Arc::new(KeywordProvider::new()));
        store.add_text("Paris is the capital of France.", "doc1").await;

        let window = store
            .context_window("Paris capital of France", DEFAULT_TOP_K, "Answer briefly.")
            .await;
        assert_eq!(window.memories().len(), 1);
        assert_eq!(window.max_tokens(), 1024);

        let preamble = window.build_preamble();
        assert_eq!(preamble[0].content, "Answer briefly.");
        assert!(preamble[1].content.contains("doc1_chunk_0"));
    }

    #[tokio::test]
    async fn test_evict_cache_drops_entries() {
        let dir = tempdir().unwrap();
        let store = store_with(&config(&dir), Arc::new(KeywordProvider::new()));
        store.add_text("Paris is the capital of France.", "doc1").await;
        assert_eq!(store.embedder().cache_len().await, 1);

        assert_eq!(store.evict_cache(10).await, 1);
        assert_eq!(store.embedder().cache_len().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_cache_vector_fixes_dimension() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        std::fs::write(
            &config.embed_cache_file,
            r#"{"Paris is the capital of France.": [1.0, 0.0]}"#,
        )
        .unwrap();

        let store = store_with(&config, Arc::new(KeywordProvider::new()));
        store.add_text("Paris is the capital of France.", "a").await;
        store.add_text("Rust borrow checker.", "b").await;

        let records = store.records.read().await;
        let dims: HashSet<usize> = records
            .records()
            .iter()
            .filter(|r| r.is_searchable())
            .map(|r| r.embedding.len())
            .collect();
        assert_eq!(dims, HashSet::from([2]));
        assert!(records.get("b_chunk_0").is_none());
    }
}
