//! Integration test suite for envslot
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **slot_resolution**: content hash to directory mapping, collisions, persistence
//! - **install_coordination**: single-flight installs across tasks and handles
//! - **localize**: offline lockfile rewrite
//! - **config**: configuration file loading and the path override
//! - **cli**: the `envslot` binary end to end

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod config;
mod install_coordination;
mod localize;
