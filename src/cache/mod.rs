//! Content-addressed cache slots.
//!
//! Every environment spec is installed into its own directory (a *slot*) under a cache
//! root. [`SlotResolver`] turns the content of a spec into that directory:
//!
//! ```text
//! <root>/
//! ├── slot-mapping.txt        # hash=slot lines
//! ├── 0/
//! │   ├── environment.key     # identity bytes, verbatim
//! │   ├── pixi.toml
//! │   ├── pixi.lock           # localized
//! │   └── .pixi/envs/default/ # installed environment
//! ├── 1/
//! └── 1_0/                    # collision of a different spec with slot 1
//! ```
//!
//! # Resolution
//!
//! 1. Hash the content (SHA-256 hex unless a test hash function is injected)
//! 2. Look the hash up in the [`DirectoryMapping`]; an unmapped hash gets the next decimal
//!    slot name (`mapping.len()`) and the mapping file is rewritten
//! 3. Probe the slot: a directory without a sentinel is claimed by writing one, a sentinel
//!    equal to the content is a hit, anything else moves on to `<slot>_0`, `<slot>_1`, ...
//!
//! Mapped slots are probed as well. This keeps specs whose hashes collide in distinct,
//! stable directories on every call: the sentinel, not the hash, decides ownership.
//!
//! # Concurrency
//!
//! All resolution runs under the resolver's mutex with blocking file IO, so async callers
//! go through [`SlotResolver::resolve_async`], which hops onto the blocking pool. Only
//! callers sharing one resolver object are serialized; other processes are not.

pub mod mapping;
pub mod single_flight;

pub use mapping::DirectoryMapping;
pub use single_flight::{Flight, SingleFlight};

use crate::constants::{MAPPING_FILE, MAX_PROBE_ATTEMPTS, SENTINEL_FILE};
use crate::core::{EnvError, EnvResult};
use crate::utils::fs::{atomic_write, ensure_dir, read_optional};
use crate::utils::sha256_hex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Hash function used to derive a slot key from content.
pub type HashFn = fn(&[u8]) -> String;

/// Maps content to a slot directory under a cache root.
#[derive(Debug)]
pub struct SlotResolver {
    root: PathBuf,
    hash_fn: HashFn,
    mapping: Mutex<Option<DirectoryMapping>>,
}

/// A mapping entry as reported by [`SlotResolver::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    /// Content hash
    pub hash: String,
    /// Slot name relative to the cache root
    pub slot: String,
    /// Absolute slot directory
    pub path: PathBuf,
}

impl SlotResolver {
    /// Create a resolver hashing with SHA-256.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_hasher(root, sha256_hex)
    }

    /// Create a resolver with a custom hash function.
    ///
    /// Mostly useful in tests that need two different contents to collide.
    pub fn with_hasher(root: impl Into<PathBuf>, hash_fn: HashFn) -> Self {
        Self {
            root: root.into(),
            hash_fn,
            mapping: Mutex::new(None),
        }
    }

    /// The cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `content` to its slot directory, allocating one if needed.
    ///
    /// Blocks on file IO; use [`resolve_async`](Self::resolve_async) from async code.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Io`] if the cache root, a slot or the mapping cannot be written
    /// - [`EnvError::CollisionExhausted`] if every probed candidate holds other content
    pub fn resolve(&self, content: &[u8]) -> EnvResult<PathBuf> {
        let hash = (self.hash_fn)(content);
        let mut guard = self.lock_mapping()?;
        let mapping = self.loaded(&mut guard)?;

        let slot = match mapping.get(&hash) {
            Some(slot) => slot.to_string(),
            None => {
                let slot = mapping.len().to_string();
                mapping.insert(&hash, &slot)?;
                info!(target: "cache", "Allocated slot {slot} for {}", short(&hash));
                slot
            }
        };

        probe(&self.root.join(&slot), content)
    }

    /// Async wrapper running [`resolve`](Self::resolve) on the blocking pool.
    pub async fn resolve_async(self: &Arc<Self>, content: Vec<u8>) -> EnvResult<PathBuf> {
        let resolver = Arc::clone(self);
        tokio::task::spawn_blocking(move || resolver.resolve(&content)).await?
    }

    /// All mapped hashes with their slot directories, ordered by hash.
    pub fn entries(&self) -> EnvResult<Vec<SlotEntry>> {
        let mut guard = self.lock_mapping()?;
        let mapping = self.loaded(&mut guard)?;
        Ok(mapping
            .iter()
            .map(|(hash, slot)| SlotEntry {
                hash: hash.to_string(),
                slot: slot.to_string(),
                path: self.root.join(slot),
            })
            .collect())
    }

    /// Load the mapping on first use.
    fn loaded<'a>(
        &self,
        slot: &'a mut Option<DirectoryMapping>,
    ) -> EnvResult<&'a mut DirectoryMapping> {
        if slot.is_none() {
            *slot = Some(DirectoryMapping::load(&self.root.join(MAPPING_FILE))?);
        }
        slot.as_mut()
            .ok_or_else(|| EnvError::Interrupted("slot mapping was not loaded".to_string()))
    }

    fn lock_mapping(&self) -> EnvResult<MutexGuard<'_, Option<DirectoryMapping>>> {
        self.mapping
            .lock()
            .map_err(|_| EnvError::Interrupted("slot resolver mutex poisoned".to_string()))
    }
}

/// Find the first candidate at or after `base` that is free or already holds `content`.
fn probe(base: &Path, content: &[u8]) -> EnvResult<PathBuf> {
    for attempt in 0..MAX_PROBE_ATTEMPTS {
        let candidate = candidate_dir(base, attempt);
        ensure_dir(&candidate)?;

        let sentinel = candidate.join(SENTINEL_FILE);
        match read_optional(&sentinel)? {
            None => {
                atomic_write(&sentinel, content)?;
                debug!(target: "cache", "Claimed {}", candidate.display());
                return Ok(candidate);
            }
            Some(existing) if existing == content => {
                debug!(target: "cache", "Cache hit at {}", candidate.display());
                return Ok(candidate);
            }
            Some(_) => {
                debug!(
                    target: "cache",
                    "{} holds different content, probing next candidate",
                    candidate.display()
                );
            }
        }
    }

    Err(EnvError::CollisionExhausted {
        base: base.to_path_buf(),
        attempts: MAX_PROBE_ATTEMPTS,
    })
}

/// `base` for the first attempt, then `base_0`, `base_1`, ...
fn candidate_dir(base: &Path, attempt: usize) -> PathBuf {
    if attempt == 0 {
        return base.to_path_buf();
    }
    let mut name = base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!("_{}", attempt - 1));
    base.with_file_name(name)
}

/// First 12 characters of a hash for display, or all of it when that would split a character.
pub(crate) fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
