//! Platform-specific helpers.
//!
//! Conda environments lay out their interpreter differently on Windows, and user-supplied
//! paths in the configuration may contain `~` or environment variables.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Location of the Python interpreter inside a conda environment directory.
///
/// - **Unix**: `<env>/bin/python`
/// - **Windows**: `<env>/python.exe`
#[must_use]
pub fn python_executable(env_dir: &Path) -> PathBuf {
    if is_windows() {
        env_dir.join("python.exe")
    } else {
        env_dir.join("bin").join("python")
    }
}

/// Resolves a path with tilde expansion and environment variable substitution.
///
/// ```rust
/// use envslot::utils::platform::resolve_path;
///
/// let path = resolve_path("/opt/mirror").unwrap();
/// assert_eq!(path, std::path::PathBuf::from("/opt/mirror"));
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {path}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Get the user's home directory.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}
