//! Global constants used throughout the envslot codebase.
//!
//! File names that make up the on-disk cache layout, installer defaults, and the
//! bounds used by slot probing live here so the layout is discoverable in one place.

use std::time::Duration;

/// Name of the mapping file (`hash=slot` lines) at the cache root.
pub const MAPPING_FILE: &str = "slot-mapping.txt";

/// Sentinel file inside each slot holding the identity bytes verbatim.
pub const SENTINEL_FILE: &str = "environment.key";

/// Localized lockfile written into each slot.
pub const LOCKFILE_NAME: &str = "pixi.lock";

/// Manifest written into each slot.
pub const MANIFEST_NAME: &str = "pixi.toml";

/// Maximum number of candidate directories tried for one content hash.
///
/// The first candidate is the mapped slot itself, followed by `<slot>_0`, `<slot>_1`, ...
pub const MAX_PROBE_ATTEMPTS: usize = 10;

/// The only lockfile format version the localizer accepts.
pub const SUPPORTED_LOCK_VERSION: u64 = 6;

/// Default name of the environment installed from a lockfile.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Default installer executable looked up on `PATH`.
pub const DEFAULT_INSTALLER: &str = "pixi";

/// Timeout for one installer invocation (20 minutes).
///
/// Installing a large environment from a local mirror still unpacks thousands of files.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Directory under the cache root that receives the installer's own download caches.
pub const INSTALLER_CACHE_DIR: &str = ".pixi-cache";

/// Arguments passed to every installer invocation.
pub const INSTALL_ARGS: &[&str] = &["install", "--frozen", "--no-progress", "--color", "never"];
