//! Agent tool boundary.
//!
//! Exposes the store's operations by name with JSON arguments, so an agent
//! runtime can call them as tools. Every call yields a [`ToolResult`]; the
//! store itself never errors, so `Error` only reports a bad call (unknown
//! tool, missing or mistyped argument).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::vector_store::{DEFAULT_TOP_K, VectorStore};

/// Tools understood by [`dispatch`].
pub const TOOL_NAMES: &[&str] = &[
    "add_text",
    "search",
    "search_long_response",
    "list_memories",
    "get_memory_stats",
    "delete_memory",
    "delete_source",
    "clean_duplicates",
    "clear_all_memories",
];

/// Outcome of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ToolResult {
    Success(Value),
    Error(String),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    pub fn into_result(self) -> Result<Value, String> {
        match self {
            ToolResult::Success(value) => Ok(value),
            ToolResult::Error(message) => Err(message),
        }
    }
}

impl From<Result<Value, String>> for ToolResult {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => ToolResult::Success(value),
            Err(message) => ToolResult::Error(message),
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string argument '{key}'"))
}

fn opt_usize_arg(args: &Value, key: &str) -> Result<Option<usize>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| format!("argument '{key}' must be a non-negative integer")),
    }
}

fn opt_f32_arg(args: &Value, key: &str) -> Result<Option<f32>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|n| Some(n as f32))
            .ok_or_else(|| format!("argument '{key}' must be a number")),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

async fn call(store: &VectorStore, name: &str, args: &Value) -> Result<Value, String> {
    match name {
        "add_text" => {
            let text = str_arg(args, "text")?;
            let source = str_arg(args, "source")?;
            let added = store.add_text(text, source).await;
            Ok(json!({ "added": added }))
        }
        "search" => {
            let query = str_arg(args, "query")?;
            let top_k = opt_usize_arg(args, "top_k")?.unwrap_or(DEFAULT_TOP_K);
            let min_similarity = opt_f32_arg(args, "min_similarity")?;
            to_value(store.search(query, top_k, min_similarity).await)
        }
        "search_long_response" => {
            let query = str_arg(args, "query")?;
            let top_k = opt_usize_arg(args, "top_k")?.unwrap_or(DEFAULT_TOP_K);
            Ok(store.search_long_response(query, top_k).await)
        }
        "list_memories" => to_value(store.list_memories().await),
        "get_memory_stats" => to_value(store.get_memory_stats().await),
        "delete_memory" => {
            let id = str_arg(args, "id")?;
            Ok(json!({ "deleted": store.delete_memory(id).await }))
        }
        "delete_source" => {
            let source = str_arg(args, "source")?;
            Ok(json!({ "deleted": store.delete_source(source).await }))
        }
        "clean_duplicates" => Ok(json!({ "removed": store.clean_duplicates().await })),
        "clear_all_memories" => Ok(json!({ "removed": store.clear_all_memories().await })),
        other => Err(format!(
            "unknown tool '{other}', expected one of: {}",
            TOOL_NAMES.join(", ")
        )),
    }
}

/// Run the tool `name` against `store` with JSON `args`.
pub async fn dispatch(store: &VectorStore, name: &str, args: &Value) -> ToolResult {
    debug!("Tool call {} {}", name, args);
    let result = call(store, name, args).await;
    if let Err(message) = &result {
        warn!("Tool call {} failed: {}", name, message);
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Cl100kTokenizer;
    use crate::config::{MemoryConfig, RetryConfig};
    use crate::testing::KeywordProvider;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    fn store(dir: &TempDir) -> VectorStore {
        let config = MemoryConfig {
            embed_cache_file: dir.path().join("embedding_cache.json"),
            vector_db_file: dir.path().join("vector_db.json"),
            retry: RetryConfig {
                max_attempts: 1,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
                deadline_ms: None,
            },
            ..Default::default()
        };
        let tokenizer = Arc::new(Cl100kTokenizer::new().unwrap());
        VectorStore::new(&config, Arc::new(KeywordProvider::new()), tokenizer)
    }

    #[test]
    fn test_tool_result_wire_shape() {
        let ok = ToolResult::Success(json!({ "removed": 2 }));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "status": "success", "result": { "removed": 2 } })
        );

        let err: ToolResult =
            serde_json::from_value(json!({ "status": "error", "result": "nope" })).unwrap();
        assert_eq!(err, ToolResult::Error("nope".into()));
        assert_eq!(err.into_result(), Err("nope".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_add_search_and_stats() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let added = dispatch(
            &store,
            "add_text",
            &json!({ "text": "Paris is the capital of France.", "source": "doc1" }),
        )
        .await;
        assert_eq!(added, ToolResult::Success(json!({ "added": 1 })));

        let hits = dispatch(&store, "search", &json!({ "query": "capital of France", "top_k": 1 }))
            .await
            .into_result()
            .unwrap();
        assert_eq!(hits[0]["id"], "doc1_chunk_0");

        let stats = dispatch(&store, "get_memory_stats", &Value::Null)
            .await
            .into_result()
            .unwrap();
        assert_eq!(stats["total_memories"], 1);
        assert_eq!(stats["source_counts"]["doc1"], 1);

        let long = dispatch(&store, "search_long_response", &json!({ "query": "Paris" }))
            .await
            .into_result()
            .unwrap();
        assert!(long["chunks"].is_array());
    }

    #[tokio::test]
    async fn test_dispatch_maintenance() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.add_text("A python is a snake.", "zoo").await;
        store.add_text("Rust has a borrow checker.", "lang").await;

        let deleted = dispatch(&store, "delete_memory", &json!({ "id": "zoo_chunk_0" })).await;
        assert_eq!(deleted, ToolResult::Success(json!({ "deleted": true })));

        let deleted = dispatch(&store, "delete_source", &json!({ "source": "lang" })).await;
        assert_eq!(deleted, ToolResult::Success(json!({ "deleted": 1 })));

        let cleaned = dispatch(&store, "clean_duplicates", &json!({})).await;
        assert_eq!(cleaned, ToolResult::Success(json!({ "removed": 0 })));

        let listed = dispatch(&store, "list_memories", &json!({})).await;
        assert_eq!(listed, ToolResult::Success(json!([])));

        let cleared = dispatch(&store, "clear_all_memories", &json!({})).await;
        assert_eq!(cleared, ToolResult::Success(json!({ "removed": 0 })));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_calls() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let unknown = dispatch(&store, "forget_everything", &json!({})).await;
        assert!(!unknown.is_success());

        let missing = dispatch(&store, "add_text", &json!({ "text": "no source" })).await;
        assert_eq!(
            missing,
            ToolResult::Error("missing string argument 'source'".into())
        );

        let mistyped = dispatch(&store, "search", &json!({ "query": "x", "top_k": "three" })).await;
        assert!(!mistyped.is_success());
        assert!(store.is_empty().await);
    }
}
