//! This module defines the command-line interface for `jm` using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum with one variant per store operation.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use jade_memory::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Search { query, .. } = cli.command {
//!     println!("searching for {query}");
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of `<config dir>/config.yaml`.
    #[arg(long, short = 'c', global = true, env = "JADE_MEMORY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file to the config directory.
    Init,

    /// Chunk, embed and store text.
    #[clap(name = "add", alias = "a")]
    Add {
        /// Source label for the stored chunks.
        #[arg(long, short = 's')]
        source: String,

        /// Text to store. Ignored when `--file` is given.
        text: Option<String>,

        /// Read the text from a file.
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Print the best matches for a query.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        #[arg(long, short = 'k', default_value_t = 3)]
        top_k: usize,

        /// Fixed similarity floor. Without it the floor depends on query length.
        #[arg(long)]
        min_similarity: Option<f32>,
    },

    /// Print the retrieval payload handed to agents.
    Recall {
        query: String,

        #[arg(long, short = 'k', default_value_t = 3)]
        top_k: usize,
    },

    /// List stored memories, newest first.
    #[clap(name = "list", alias = "ls")]
    List,

    /// Print memory statistics.
    Stats,

    /// Delete one memory by id.
    Delete { id: String },

    /// Delete every memory from a source.
    DeleteSource { source: String },

    /// Remove memories with duplicate content.
    Dedup,

    /// Remove every memory.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
}
