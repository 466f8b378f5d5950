//! # Memory records
//!
//! One [`MemoryRecord`] per stored chunk. The serialized shape is the vector
//! database file format:
//!
//! ```json
//! {
//!   "id": "notes.md_chunk_0",
//!   "meta": { "source": "notes.md", "chunk_index": 0, "total_chunks": 3, "start": 0, "end": 500 },
//!   "text": "...",
//!   "text_hash": "<blake3 hex>",
//!   "embedding": [0.01, -0.2, ...],
//!   "timestamp": "2024-05-01T12:00:00Z"
//! }
//! ```
//!
//! Older snapshots that only carry `id`, `meta.source`, `text` and `embedding`
//! still load; the missing fields take defaults and the hash is recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable content digest: lowercase hex BLAKE3 of the UTF-8 bytes.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// `"{source}_chunk_{index}"`.
pub fn record_id(source: &str, index: usize) -> String {
    format!("{source}_chunk_{index}")
}

/// Auxiliary attributes of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub source: String,
    /// Position of this chunk within the document it came from.
    #[serde(default)]
    pub chunk_index: usize,
    /// Number of chunks the document was split into (0 if unknown).
    #[serde(default)]
    pub total_chunks: usize,
    /// Token offsets of the chunk in the source document.
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    /// Hash of the whole document this chunk came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub meta: RecordMeta,
    pub text: String,
    #[serde(default)]
    pub text_hash: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn source(&self) -> &str {
        &self.meta.source
    }

    /// Records with an empty embedding are kept but never searched.
    pub fn is_searchable(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Relative position in the source document, `0.0` for the first chunk.
    pub fn position(&self) -> f32 {
        if self.meta.total_chunks == 0 {
            0.0
        } else {
            self.meta.chunk_index as f32 / self.meta.total_chunks as f32
        }
    }

    /// The first `max_chars` characters, with `...` when truncated.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }

    /// Fill in fields that legacy snapshots did not carry.
    pub(crate) fn repair(&mut self) {
        if self.text_hash.is_empty() {
            self.text_hash = content_hash(&self.text);
        }
    }
}

/// Listing row returned by `list_memories`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySummary {
    pub id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub text_preview: String,
}

/// Store-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_sources: usize,
    pub source_counts: BTreeMap<String, usize>,
    pub oldest_memory: Option<DateTime<Utc>>,
    pub newest_memory: Option<DateTime<Utc>>,
}
