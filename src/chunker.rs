//! # Chunker
//!
//! Splits text into fixed-size, overlapping token windows.
//!
//! The text is tokenized once, a window of `size` tokens slides across it in
//! steps of `size - overlap`, and each window is decoded back to text. The last
//! window may be shorter. Offsets are token offsets into the source text,
//! half-open (`[start, end)`).
//!
//! ```text
//! 1200 tokens, size 500, overlap 100  →  [0,500) [400,900) [800,1200)
//! ```

use std::error::Error;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Text ⇄ token ids.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// `None` when the tokens do not decode to valid UTF-8 (e.g. a window cut
    /// through a multi-byte character).
    fn decode(&self, tokens: &[u32]) -> Option<String>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` BPE, the encoding used by the OpenAI embedding models.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| e.to_string())?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        self.bpe.decode(tokens.to_vec()).ok()
    }
}

/// One window of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// First token of the window.
    pub start: usize,
    /// One past the last token of the window.
    pub end: usize,
}

/// Sliding-window token chunker.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    size: usize,
    overlap: usize,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("size", &self.size)
            .field("overlap", &self.overlap)
            .finish()
    }
}

impl Chunker {
    /// `overlap` is clamped below `size`; `size` is at least 1.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            tokenizer,
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Split `text` into windows. Empty input gives no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let tokens = self.tokenizer.encode(text);

        windows(tokens.len(), self.size, self.overlap)
            .into_iter()
            .filter_map(|(start, end)| {
                let chunk = self.decode_window(&tokens, start, end);
                if chunk.is_none() {
                    warn!("Could not decode tokens [{}, {}), skipping chunk", start, end);
                }
                chunk
            })
            .collect()
    }

    /// Decode a window, shaving up to three tokens off either edge if it was
    /// cut through a multi-byte character. The chunk carries the span that
    /// was actually decoded.
    fn decode_window(&self, tokens: &[u32], start: usize, end: usize) -> Option<Chunk> {
        for shave_start in 0..=3 {
            for shave_end in 0..=3 {
                let (s, e) = (start + shave_start, end.saturating_sub(shave_end));
                if s >= e {
                    continue;
                }
                if let Some(text) = self.tokenizer.decode(&tokens[s..e]) {
                    return Some(Chunk {
                        text,
                        start: s,
                        end: e,
                    });
                }
            }
        }
        None
    }
}

/// Window boundaries for `len` tokens.
///
/// Windows start at multiples of `size - overlap` and stop as soon as one
/// reaches the end of the input.
pub fn windows(len: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    if len == 0 || size == 0 {
        return Vec::new();
    }
    let stride = size.saturating_sub(overlap).max(1);

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        spans.push((start, end));
        if end == len {
            break;
        }
        start += stride;
    }
    spans
}
