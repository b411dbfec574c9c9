//! envslot: content-addressed, offline installation of pixi environments
//!
//! envslot takes a fully pinned pixi lockfile (optionally with its manifest), gives it a
//! cache directory of its own, rewrites it so every package comes from a local mirror, and
//! runs `pixi install --frozen` in that directory. However many tasks ask for the same
//! environment at once, the installer runs once and everyone sees the same outcome.
//!
//! # Architecture Overview
//!
//! ```text
//! EnvironmentSpec ──► SlotResolver ──► EnvironmentHandle ──► InstallCoordinator ──► Installer
//!   (manifest)         (cache)          (installer)           (installer)          (installer::command)
//!                                                     │
//!                                                     └─► localize (lockfile)
//! ```
//!
//! - [`manifest`] - [`EnvironmentSpec`](manifest::EnvironmentSpec) and its content hash
//! - [`cache`] - slot resolution with collision probing, and the [`SingleFlight`](cache::SingleFlight) primitive
//! - [`lockfile`] - order-preserving lockfile document and the offline rewrite
//! - [`installer`] - two-tier install coordination and the pixi subprocess runner
//! - [`config`] - global TOML configuration
//! - [`core`] - error types and cancellation
//! - [`utils`] - file system, platform and progress helpers
//! - [`cli`] - the `envslot` command line
//!
//! # Cache Layout
//!
//! ```text
//! <cache_root>/
//! ├── slot-mapping.txt
//! ├── .pixi-cache/               # installer download caches
//! └── 0/
//!     ├── environment.key
//!     ├── pixi.toml
//!     ├── pixi.lock
//!     └── .pixi/envs/default/conda-meta/history
//! ```
//!
//! Only callers within one process are coordinated; envslot takes no cross-process locks
//! and never deletes slots.

// Core functionality modules
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;

// Environment handling
pub mod installer;
pub mod lockfile;
pub mod manifest;

// Supporting modules
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
