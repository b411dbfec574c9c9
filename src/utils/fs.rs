//! File system helpers for the cache layout.
//!
//! All helpers return [`EnvResult`] with the failing operation and path attached, so a
//! failure deep inside slot allocation still tells the user which file was involved.

use crate::core::{EnvError, EnvResult};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Ensure a directory exists, creating it and all parents if necessary.
///
/// Fails if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> EnvResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(EnvError::io(
            "creating directory",
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path exists but is not a directory"),
        ));
    }
    fs::create_dir_all(path).map_err(|e| EnvError::io("creating directory", path, e))
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Write the content to `<path>.tmp`
/// 2. Sync the temporary file to disk
/// 3. Rename it over `path`
///
/// Readers never observe a partially written file. Parent directories are created.
pub fn atomic_write(path: &Path, content: &[u8]) -> EnvResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| EnvError::io("creating temp file", &temp_path, e))?;
        file.write_all(content)
            .map_err(|e| EnvError::io("writing temp file", &temp_path, e))?;
        file.sync_all().map_err(|e| EnvError::io("syncing temp file", &temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| EnvError::io("renaming temp file", path, e))
}

/// Read a file, returning `None` when it does not exist.
pub fn read_optional(path: &Path) -> EnvResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EnvError::io("reading file", path, e)),
    }
}
