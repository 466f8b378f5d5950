//! Main module for the Jade Memory CLI (`jm`).
//!
//! Parses the command line, loads the configuration, opens the store and runs
//! one operation against it.
//!
//! # Examples
//!
//! ```sh
//! jm init
//! jm add --source notes "Paris is the capital of France."
//! jm search "capital of France" -k 1
//! jm stats --json
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `warn`).

use clap::Parser;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::{
    error::Error,
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use jade_memory::commands::{Cli, Commands};
use jade_memory::config::{self, MemoryConfig};
use jade_memory::config_dir;
use jade_memory::vector_store::VectorStore;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Run the parsed command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, an input file cannot
/// be read, or output cannot be written. Store operations themselves do not fail.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_dir()?.join("config.yaml"),
    };

    let command = match cli.command {
        Commands::Init => return init(&config_path),
        command => command,
    };

    let jade_config = load_or_default(&config_path)?;
    debug!("Config loaded: {:?}", jade_config);
    let store = VectorStore::open(&jade_config)?;

    match command {
        Commands::Init => {}
        Commands::Add { source, text, file } => {
            let text = match (file, text) {
                (Some(path), _) => fs::read_to_string(path)?,
                (None, Some(text)) => text,
                (None, None) => return Err("add needs TEXT or --file".into()),
            };
            let added = store.add_text(&text, &source).await;
            println!("Added {added} chunks from {source}");
        }
        Commands::Search {
            query,
            top_k,
            min_similarity,
        } => {
            let hits = store.search(&query, top_k, min_similarity).await;
            if cli.json {
                print_json(&hits)?;
            } else if hits.is_empty() {
                println!("No matches.");
            } else {
                for hit in &hits {
                    println!("{:.3}  {}", hit.similarity, hit.snippet());
                }
            }
        }
        Commands::Recall { query, top_k } => {
            print_json(&store.search_long_response(&query, top_k).await)?;
        }
        Commands::List => {
            let memories = store.list_memories().await;
            if cli.json {
                print_json(&memories)?;
            } else {
                for memory in &memories {
                    println!(
                        "{}  {}  {}",
                        memory.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        memory.id,
                        memory.text_preview
                    );
                }
            }
        }
        Commands::Stats => print_json(&store.get_memory_stats().await)?,
        Commands::Delete { id } => {
            if store.delete_memory(&id).await {
                println!("Deleted {id}");
            } else {
                println!("No memory with id {id}");
            }
        }
        Commands::DeleteSource { source } => {
            let removed = store.delete_source(&source).await;
            println!("Deleted {removed} memories from {source}");
        }
        Commands::Dedup => {
            let removed = store.clean_duplicates().await;
            println!("Removed {removed} duplicate memories");
        }
        Commands::Clear { yes } => {
            if yes || confirm("Remove every memory?")? {
                let removed = store.clear_all_memories().await;
                println!("Cleared {removed} memories");
            }
        }
    }

    Ok(())
}

/// Load the config at `path`, or defaults when the file does not exist yet.
fn load_or_default(path: &Path) -> Result<MemoryConfig, Box<dyn Error>> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(MemoryConfig::default());
    }
    let path = path.to_str().ok_or("config path is not valid UTF-8")?;
    config::load_config(path)
}

/// Write a default configuration file, with snapshot files under its directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Creating config directory: {}", dir.display());
    fs::create_dir_all(&dir)?;

    let repo = dir.join("knowledge_repo");
    let config = MemoryConfig {
        embed_cache_file: repo.join("embedding_cache.json"),
        vector_db_file: repo.join("vector_db.json"),
        ..Default::default()
    };

    info!("Creating config file: {}", config_path.display());
    fs::write(config_path, serde_yaml::to_string(&config)?)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn Error>> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
