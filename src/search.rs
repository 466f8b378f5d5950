//! # Similarity search
//!
//! Brute-force cosine scan over every searchable record, followed by an
//! optional rerank pass.
//!
//! 1. Score each record with [`cosine_similarity`].
//! 2. Drop records below the similarity floor. The floor comes from the caller
//!    or from a [`ThresholdStrategy`].
//! 3. Sort descending (stable, so ties keep insertion order) and keep the
//!    first `max_candidates`.
//! 4. If reranking is on, subtract a position penalty (later chunks of a
//!    document rank lower) and add a recency boost that decays linearly to
//!    zero over the recency window.
//! 5. Return the first `top_k`.
//!
//! The floor always applies to the raw similarity, never to the reranked score.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::record::MemoryRecord;

/// Norms below this are treated as zero.
const NORM_EPSILON: f32 = 1e-10;

/// `dot(a, b) / (|a| * |b|)`, or `0.0` if either vector is (near) zero or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < NORM_EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Picks a similarity floor for a query when the caller does not give one.
pub trait ThresholdStrategy: Send + Sync {
    fn threshold(&self, query: &str) -> f32;
}

/// Same floor for every query.
#[derive(Debug, Clone, Copy)]
pub struct FixedThreshold(pub f32);

impl ThresholdStrategy for FixedThreshold {
    fn threshold(&self, _query: &str) -> f32 {
        self.0
    }
}

/// Stricter floor for short queries, looser for long ones.
///
/// Short queries are ambiguous and match a lot of noise; long queries are
/// specific enough to tolerate a lower bar. Word count is whitespace-split.
#[derive(Debug, Clone, Copy)]
pub struct QueryLengthThreshold {
    pub base: f32,
    /// Queries with at most this many words get `base + adjustment`.
    pub short_query_words: usize,
    /// Queries with at least this many words get `base - adjustment`.
    pub long_query_words: usize,
    pub adjustment: f32,
}

impl QueryLengthThreshold {
    pub fn new(base: f32) -> Self {
        Self {
            base,
            short_query_words: 3,
            long_query_words: 10,
            adjustment: 0.1,
        }
    }
}

impl ThresholdStrategy for QueryLengthThreshold {
    fn threshold(&self, query: &str) -> f32 {
        let words = query.split_whitespace().count();
        let floor = if words <= self.short_query_words {
            self.base + self.adjustment
        } else if words >= self.long_query_words {
            self.base - self.adjustment
        } else {
            self.base
        };
        floor.clamp(-1.0, 1.0)
    }
}

/// Weights for the rerank pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Rerank {
    /// Multiplied by `chunk_index / total_chunks` and subtracted.
    pub position_weight: f32,
    /// Added in full for a brand-new record, decaying to zero at `recency_window`.
    pub recency_weight: f32,
    pub recency_window: Duration,
}

impl Default for Rerank {
    fn default() -> Self {
        Self {
            position_weight: 0.1,
            recency_weight: 0.1,
            recency_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Rerank {
    /// Reranked score for a record with raw `similarity`.
    pub fn score(&self, record: &MemoryRecord, similarity: f32, now: DateTime<Utc>) -> f32 {
        let penalty = self.position_weight * record.position();

        let window = self.recency_window.as_secs_f32();
        let age = (now - record.timestamp).num_milliseconds().max(0) as f32 / 1000.0;
        let boost = if window > 0.0 {
            self.recency_weight * (1.0 - age / window).max(0.0)
        } else {
            0.0
        };

        similarity - penalty + boost
    }
}

/// Knobs for one ranking pass.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub top_k: usize,
    pub min_similarity: f32,
    pub max_candidates: usize,
    pub rerank: Option<Rerank>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub id: String,
    pub source: String,
    pub text: String,
    /// Raw cosine similarity to the query.
    pub similarity: f32,
    /// Final ranking score (equals `similarity` without reranking).
    pub score: f32,
}

impl SearchMatch {
    /// `"[{id}] {text}"`, the form handed to prompt builders.
    pub fn snippet(&self) -> String {
        format!("[{}] {}", self.id, self.text)
    }
}

/// Rank `records` against `query`.
pub fn rank<'a, I>(
    records: I,
    query: &[f32],
    params: &SearchParams,
    now: DateTime<Utc>,
) -> Vec<SearchMatch>
where
    I: IntoIterator<Item = &'a MemoryRecord>,
{
    if query.is_empty() || params.top_k == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(&MemoryRecord, f32, f32)> = records
        .into_iter()
        .filter(|r| r.is_searchable())
        .filter_map(|r| {
            let similarity = cosine_similarity(query, &r.embedding);
            (similarity >= params.min_similarity).then_some((r, similarity, similarity))
        })
        .collect();

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    candidates.truncate(params.max_candidates.max(params.top_k));

    if let Some(rerank) = &params.rerank {
        for candidate in candidates.iter_mut() {
            candidate.2 = rerank.score(candidate.0, candidate.1, now);
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    }

    candidates
        .into_iter()
        .take(params.top_k)
        .map(|(record, similarity, score)| SearchMatch {
            id: record.id.clone(),
            source: record.source().to_string(),
            text: record.text.clone(),
            similarity,
            score,
        })
        .collect()
}
