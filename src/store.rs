//! # Record store
//!
//! The in-memory list of [`MemoryRecord`]s plus its JSON snapshot file.
//! Insertion order is preserved and meaningful: deduplication keeps the
//! first-seen record and search ties fall back to it.
//!
//! Every mutating operation rewrites the snapshot. Write failures are logged
//! and swallowed; the in-memory state stays authoritative for the session.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::record::{MemoryRecord, MemoryStats, MemorySummary};
use crate::snapshot::{load_json, save_json};

/// Characters kept in [`MemorySummary::text_preview`].
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<MemoryRecord>,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// In-memory store that never touches disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`. A missing or corrupt file gives an empty store.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut records: Vec<MemoryRecord> = load_json(&path);
        records.iter_mut().for_each(MemoryRecord::repair);

        info!("Vector DB loaded: {} entries", records.len());
        Self {
            records,
            path: Some(path),
        }
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Whether any record has `hash` as its chunk hash or its document hash.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.records.iter().any(|r| {
            r.text_hash == hash || r.meta.document_hash.as_deref() == Some(hash)
        })
    }

    /// Next free chunk number for ids of the form `{source}_chunk_{n}`.
    pub fn next_chunk_index(&self, source: &str) -> usize {
        let prefix = format!("{source}_chunk_");
        self.records
            .iter()
            .filter_map(|r| r.id.strip_prefix(&prefix))
            .filter_map(|n| n.parse::<usize>().ok())
            .map(|n| n + 1)
            .max()
            .unwrap_or(0)
    }

    /// Dimensionality of the first searchable record, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.records
            .iter()
            .find(|r| r.is_searchable())
            .map(|r| r.embedding.len())
    }

    /// Append records and persist.
    pub fn insert(&mut self, records: Vec<MemoryRecord>) {
        if records.is_empty() {
            return;
        }
        for record in &records {
            debug!("Saved chunk={}, chunk_length={}", record.id, record.text.len());
        }
        self.records.extend(records);
        self.persist();
    }

    /// Summaries of every record, newest first.
    pub fn list_memories(&self) -> Vec<MemorySummary> {
        let mut ordered: Vec<&MemoryRecord> = self.records.iter().collect();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        ordered
            .into_iter()
            .map(|r| MemorySummary {
                id: r.id.clone(),
                source: r.source().to_string(),
                timestamp: r.timestamp,
                text_preview: r.preview(PREVIEW_CHARS),
            })
            .collect()
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        let mut source_counts = BTreeMap::new();
        for record in &self.records {
            *source_counts.entry(record.source().to_string()).or_insert(0) += 1;
        }

        MemoryStats {
            total_memories: self.records.len(),
            total_sources: source_counts.len(),
            source_counts,
            oldest_memory: self.records.iter().map(|r| r.timestamp).min(),
            newest_memory: self.records.iter().map(|r| r.timestamp).max(),
        }
    }

    /// Remove the record with `id`. Returns whether one was removed.
    pub fn delete_memory(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before;

        if removed {
            info!("Deleted memory {}", id);
            self.persist();
        } else {
            debug!("No memory with id {}", id);
        }
        removed
    }

    /// Remove every record from `source`. Returns how many were removed.
    pub fn delete_source(&mut self, source: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.source() != source);
        let removed = before - self.records.len();

        if removed > 0 {
            info!("Deleted {} memories from source {}", removed, source);
            self.persist();
        }
        removed
    }

    /// Keep the first record for each `text_hash`, drop the rest.
    pub fn clean_duplicates(&mut self) -> usize {
        let before = self.records.len();
        let mut seen = HashSet::new();
        self.records.retain(|r| seen.insert(r.text_hash.clone()));
        let removed = before - self.records.len();

        info!("Removed {} duplicate memories", removed);
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Remove everything. Returns the previous count.
    pub fn clear_all_memories(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        info!("Cleared {} memories", removed);
        self.persist();
        removed
    }

    /// Rewrite the snapshot file. Failures are logged, not returned.
    pub fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        match save_json(path, &self.records) {
            Ok(()) => debug!("Vector DB saved ({} entries)", self.records.len()),
            Err(err) => warn!("Failed saving {}: {}", path.display(), err),
        }
    }
}
