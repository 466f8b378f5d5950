//! Whole-file JSON snapshots.
//!
//! Both the embedding cache and the vector database are stored as a single
//! JSON document that is rewritten on every mutation. Loading is forgiving
//! (a missing or corrupt file yields an empty value and a warning); saving
//! goes through a temp file in the same directory and an atomic rename so a
//! crash mid-write never leaves a truncated snapshot behind.

use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::SnapshotError;

/// Read `path` as JSON, falling back to `T::default()` when the file is
/// missing, unreadable or malformed.
pub fn load_json<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!("No snapshot at {}, starting empty", path.display());
        return T::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("Failed reading {}: {}", path.display(), err);
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            warn!("Failed parsing {}: {}", path.display(), err);
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Parent directories are created as needed.
pub fn save_json<T>(path: &Path, value: &T) -> Result<(), SnapshotError>
where
    T: Serialize + ?Sized,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    debug!("Wrote snapshot {}", path.display());
    Ok(())
}
