//! Persistent `hash → slot` mapping.
//!
//! The mapping file is a flat UTF-8 text file at the cache root with one `hash=slot` pair
//! per line. It is rewritten in full (write-then-rename) whenever a new hash is inserted.
//! Lines without a `=` are skipped when loading.
//!
//! A mapping file that cannot be read is deleted and the mapping starts empty. Slot
//! directories are never removed, so losing the file only loses associations: slots
//! re-allocated afterwards are still kept apart by their sentinel files.

use crate::core::{EnvError, EnvResult};
use crate::utils::fs::atomic_write;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory copy of the mapping file.
#[derive(Debug)]
pub struct DirectoryMapping {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl DirectoryMapping {
    /// Load the mapping at `path`, recovering from an unreadable file.
    ///
    /// A missing file yields an empty mapping. Any other read failure (including content
    /// that is not UTF-8) deletes the file and yields an empty mapping; only a failure to
    /// delete it is reported.
    pub fn load(path: &Path) -> EnvResult<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => parse_entries(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(
                    target: "cache",
                    "Mapping file {} is unreadable ({e}), starting over",
                    path.display()
                );
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(EnvError::io("deleting corrupt mapping file", path, err)),
                }
                BTreeMap::new()
            }
        };

        debug!(target: "cache", "Loaded {} slot mappings from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Slot name mapped to `hash`.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    /// Insert a new association and persist the whole file.
    pub fn insert(&mut self, hash: &str, slot: &str) -> EnvResult<()> {
        self.entries.insert(hash.to_string(), slot.to_string());
        atomic_write(&self.path, self.render().as_bytes())
    }

    /// Number of mapped hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is mapped yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(hash, slot)` pairs ordered by hash.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (hash, slot) in &self.entries {
            out.push_str(hash);
            out.push('=');
            out.push_str(slot);
            out.push('\n');
        }
        out
    }
}

fn parse_entries(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (hash, slot) = line.split_once('=')?;
            let (hash, slot) = (hash.trim(), slot.trim());
            if hash.is_empty() || slot.is_empty() {
                return None;
            }
            Some((hash.to_string(), slot.to_string()))
        })
        .collect()
}
