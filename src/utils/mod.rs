//! Utility modules shared across envslot.
//!
//! - [`fs`]: atomic writes and directory helpers with [`EnvError`](crate::core::EnvError) context
//! - [`platform`]: interpreter layout and path expansion
//! - [`progress`]: the [`ProgressSink`] trait and terminal spinner

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, read_optional};
pub use platform::{is_windows, python_executable, resolve_path};
pub use progress::{NoProgress, ProgressSink, SpinnerProgress};

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `content`.
///
/// ```rust
/// use envslot::utils::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
