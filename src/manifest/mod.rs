//! Content-identified environment specifications.
//!
//! An [`EnvironmentSpec`] is the input to everything else in the crate: a fully pinned
//! lockfile, optionally paired with the manifest it was solved from. Its identity is the
//! SHA-256 digest of its identity bytes, so two specs with the same text always land in the
//! same cache slot regardless of where they were read from.
//!
//! # Identity Bytes
//!
//! - lockfile only: the lockfile bytes
//! - lockfile + manifest: lockfile bytes, a NUL byte, then the manifest bytes
//!
//! The NUL separator keeps `("ab", "c")` and `("a", "bc")` apart.
//!
//! # Examples
//!
//! ```rust
//! use envslot::manifest::EnvironmentSpec;
//!
//! let plain = EnvironmentSpec::new("version: 6\n");
//! let paired = EnvironmentSpec::with_manifest("version: 6\n", "[workspace]\n");
//!
//! assert_ne!(plain.content_hash(), paired.content_hash());
//! assert_eq!(plain.content_hash(), EnvironmentSpec::new("version: 6\n").content_hash());
//! ```

use crate::core::{EnvError, EnvResult};
use crate::utils::sha256_hex;
use std::path::Path;

/// Immutable lockfile text with an optional manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    lock: String,
    manifest: Option<String>,
}

impl EnvironmentSpec {
    /// A spec made of a lockfile alone.
    pub fn new(lock: impl Into<String>) -> Self {
        Self {
            lock: lock.into(),
            manifest: None,
        }
    }

    /// A spec pairing a lockfile with its manifest.
    pub fn with_manifest(lock: impl Into<String>, manifest: impl Into<String>) -> Self {
        Self {
            lock: lock.into(),
            manifest: Some(manifest.into()),
        }
    }

    /// Read a spec from disk.
    pub fn from_files(lock_path: &Path, manifest_path: Option<&Path>) -> EnvResult<Self> {
        let lock = std::fs::read_to_string(lock_path)
            .map_err(|e| EnvError::io("reading lockfile", lock_path, e))?;
        let manifest = manifest_path
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| EnvError::io("reading manifest", path, e))
            })
            .transpose()?;
        Ok(Self { lock, manifest })
    }

    /// The lockfile text.
    #[must_use]
    pub fn lock(&self) -> &str {
        &self.lock
    }

    /// The manifest text, if one was supplied.
    #[must_use]
    pub fn manifest(&self) -> Option<&str> {
        self.manifest.as_deref()
    }

    /// Bytes hashed for the identity and stored verbatim in the slot sentinel.
    #[must_use]
    pub fn identity_bytes(&self) -> Vec<u8> {
        let mut bytes = self.lock.as_bytes().to_vec();
        if let Some(manifest) = &self.manifest {
            bytes.push(0);
            bytes.extend_from_slice(manifest.as_bytes());
        }
        bytes
    }

    /// Lowercase hex SHA-256 of [`identity_bytes`](Self::identity_bytes).
    #[must_use]
    pub fn content_hash(&self) -> String {
        sha256_hex(&self.identity_bytes())
    }
}
