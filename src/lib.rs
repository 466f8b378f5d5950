//! # Jade Memory (library root)
//!
//! Local long-term memory for a chat agent: text goes in, is split into
//! overlapping token windows, embedded through an OpenAI-compatible API and
//! kept in a JSON snapshot; queries come back as the most similar chunks.
//!
//! - Embedding with cache, retries and model fallback (`cache`, `provider`, `embedder`).
//! - Chunking over `cl100k_base` tokens (`chunker`).
//! - Records, their snapshot file and maintenance (`record`, `store`, `snapshot`).
//! - Similarity ranking with threshold strategies and rerank (`search`).
//! - The store facade (`vector_store`), agent tool dispatch (`tool`) and
//!   prompt assembly from retrieved memories (`context`).
//! - CLI parsing (`commands`) and YAML configuration (`config`).
//!
//! ## Modules
//! - [`cache`], [`chunker`], [`commands`], [`config`], [`context`], [`embedder`],
//!   [`error`], [`provider`], [`record`], [`search`], [`snapshot`], [`store`],
//!   [`tool`], [`vector_store`]

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod cache;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod provider;
pub mod record;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod tool;
pub mod vector_store;

#[cfg(test)]
mod testing;

/// Return the per-platform configuration directory used by Jade Memory.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "awful-sec", "jade-memory")`, so you get the right place on each OS
/// (e.g., `~/.config/jade-memory` on Linux).
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
///
/// # Examples
/// ```rust
/// let cfg = jade_memory::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "awful-sec", "jade-memory")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
