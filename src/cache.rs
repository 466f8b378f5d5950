//! # Embedding cache
//!
//! Exact-text → vector map sitting in front of the embedding provider.
//!
//! - Keys are the *exact* chunk text. No normalization: `"a b"` and `"a  b"`
//!   are different entries.
//! - An empty vector is a failure sentinel: the text was attempted and every
//!   model failed. [`EmbeddingCache::get`] returns it as an empty slice so
//!   callers can tell "never tried" (`None`) from "tried and failed" (`Some(&[])`).
//! - Size is bounded by `max_entries`. When a `put` pushes the cache over the
//!   bound, roughly the oldest 10% are evicted. Age is the timestamp of the most
//!   recent memory record that referenced the text; entries that no record ever
//!   referenced go first.
//! - Every `put` rewrites the whole cache file. The embedding call it follows
//!   dominates latency anyway.
//!
//! On disk the cache is a flat JSON object `{ "<text>": [f32, ...] }`.
//! Failure sentinels are written out but ignored when loading, so a new
//! session retries texts that failed in an earlier one.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::snapshot::{load_json, save_json};

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    /// Newest timestamp of any record built from this text.
    referenced_at: Option<DateTime<Utc>>,
    /// Insertion order, used to break ties between equally old entries.
    seq: u64,
}

/// Bounded, file-backed text → embedding cache.
#[derive(Debug)]
pub struct EmbeddingCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    path: Option<PathBuf>,
    next_seq: u64,
}

impl EmbeddingCache {
    /// In-memory cache that never touches disk.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            path: None,
            next_seq: 0,
        }
    }

    /// Load the cache from `path` (missing or corrupt files give an empty cache).
    ///
    /// Subsequent `put`s write back to the same file.
    pub fn load(path: impl AsRef<Path>, max_entries: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let raw: BTreeMap<String, Vec<f32>> = load_json(&path);

        let mut cache = Self {
            entries: HashMap::with_capacity(raw.len()),
            max_entries,
            path: Some(path),
            next_seq: 0,
        };

        let mut skipped = 0usize;
        for (text, vector) in raw {
            if vector.is_empty() {
                skipped += 1;
                continue;
            }
            cache.insert_entry(text, vector);
        }

        info!(
            "Embedding cache loaded: {} entries ({} failure sentinels dropped)",
            cache.len(),
            skipped
        );
        cache
    }

    /// Look up the exact `text`.
    ///
    /// `Some(&[])` is the failure sentinel.
    pub fn get(&self, text: &str) -> Option<&[f32]> {
        self.entries.get(text).map(|e| e.vector.as_slice())
    }

    /// Insert or replace the vector for `text`, evict if over capacity, then persist.
    pub fn put(&mut self, text: &str, vector: Vec<f32>) {
        match self.entries.get_mut(text) {
            Some(entry) => entry.vector = vector,
            None => self.insert_entry(text.to_string(), vector),
        }

        if self.entries.len() > self.max_entries {
            let len = self.entries.len();
            let count = (len / 10).max(len - self.max_entries).max(1);
            self.evict(count);
        }

        self.persist();
    }

    /// Remove up to `count` of the oldest entries. Returns how many were removed.
    ///
    /// Order: never-referenced entries first, then by oldest reference
    /// timestamp, then by insertion order.
    pub fn evict(&mut self, count: usize) -> usize {
        if count == 0 || self.entries.is_empty() {
            return 0;
        }

        let mut ranked: Vec<(&String, &CacheEntry)> = self.entries.iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            a.referenced_at
                .is_some()
                .cmp(&b.referenced_at.is_some())
                .then(a.referenced_at.cmp(&b.referenced_at))
                .then(a.seq.cmp(&b.seq))
        });

        let victims: Vec<String> = ranked
            .into_iter()
            .take(count)
            .map(|(text, _)| text.clone())
            .collect();

        for text in &victims {
            self.entries.remove(text);
        }

        info!(
            "Evicted {} embedding cache entries ({} remain)",
            victims.len(),
            self.entries.len()
        );
        victims.len()
    }

    /// Record that a memory created at `timestamp` was built from `text`.
    ///
    /// Only moves the reference time forward; unknown texts are ignored.
    pub fn note_reference(&mut self, text: &str, timestamp: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(text) {
            if entry.referenced_at.is_none_or(|t| t < timestamp) {
                entry.referenced_at = Some(timestamp);
            }
        }
    }

    /// Number of cached entries, failure sentinels included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the cache file. Failures are logged, not returned.
    pub fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let flat: BTreeMap<&str, &[f32]> = self
            .entries
            .iter()
            .map(|(text, entry)| (text.as_str(), entry.vector.as_slice()))
            .collect();

        match save_json(path, &flat) {
            Ok(()) => debug!("Embedding cache saved ({} entries)", flat.len()),
            Err(err) => warn!("Failed saving {}: {}", path.display(), err),
        }
    }

    fn insert_entry(&mut self, text: String, vector: Vec<f32>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            text,
            CacheEntry {
                vector,
                referenced_at: None,
                seq,
            },
        );
    }
}
