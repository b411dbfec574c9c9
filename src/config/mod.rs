//! Global configuration for envslot
//!
//! User-wide settings live in a TOML file:
//!
//! - Unix/macOS: `~/.envslot/config.toml`
//! - Windows: `%LOCALAPPDATA%\envslot\config.toml`
//!
//! The location can be overridden using the `ENVSLOT_CONFIG_PATH` environment variable.
//! A missing file is not an error; every field has a default.
//!
//! ```toml
//! cache_root = "~/.envslot/envs"
//! resource_root = "/opt/offline-mirror"
//! environment = "default"
//! installer_path = "/usr/local/bin/pixi"
//! install_timeout_secs = 1200
//!
//! [extra_env]
//! PIXI_NO_PATH_UPDATE = "1"
//! ```
//!
//! Path values support `~` and `$VAR` expansion.

use crate::constants::{DEFAULT_ENVIRONMENT, INSTALL_TIMEOUT};
use crate::installer::{InstallOptions, PixiInstaller};
use crate::utils::fs::atomic_write;
use crate::utils::platform::resolve_path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "ENVSLOT_CONFIG_PATH";

/// User-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Directory holding the cache slots and the mapping file
    pub cache_root: String,

    /// Root of the offline mirror (`channel/` and `pypi/` below it)
    pub resource_root: String,

    /// Lockfile environment to install
    pub environment: String,

    /// Installer executable; looked up on `PATH` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer_path: Option<String>,

    /// Timeout for one installer run, in seconds
    pub install_timeout_secs: u64,

    /// Extra environment variables passed to the installer
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            cache_root: "~/.envslot/envs".to_string(),
            resource_root: "~/.envslot/mirror".to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            installer_path: None,
            install_timeout_secs: INSTALL_TIMEOUT.as_secs(),
            extra_env: BTreeMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load from the default location, falling back to defaults when the file is missing.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save to the default location.
    pub async fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path).await
    }

    /// Save to a specific file, atomically.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let path_buf = path.to_path_buf();
        tokio::task::spawn_blocking(move || atomic_write(&path_buf, content.as_bytes()))
            .await
            .context("Config writer task failed")?
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// The configuration file location, honouring `ENVSLOT_CONFIG_PATH`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return resolve_path(&path);
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("envslot")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".envslot")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Expanded cache root.
    pub fn cache_root_path(&self) -> Result<PathBuf> {
        resolve_path(&self.cache_root).context("Invalid cache_root")
    }

    /// Expanded resource root.
    pub fn resource_root_path(&self) -> Result<PathBuf> {
        resolve_path(&self.resource_root).context("Invalid resource_root")
    }

    /// Installer timeout.
    #[must_use]
    pub const fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Options for an [`InstallCoordinator`](crate::installer::InstallCoordinator).
    pub fn install_options(&self) -> Result<InstallOptions> {
        let mut options = InstallOptions::new(self.resource_root_path()?)
            .with_environment(&self.environment)
            .with_timeout(self.install_timeout());
        options.extra_env = self.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(options)
    }

    /// The installer described by this configuration.
    pub fn installer(&self) -> Result<PixiInstaller> {
        match &self.installer_path {
            Some(path) => Ok(PixiInstaller::with_executable(
                resolve_path(path).context("Invalid installer_path")?,
            )),
            None => Ok(PixiInstaller::new()),
        }
    }

    /// A commented starting configuration for `envslot config init`.
    #[must_use]
    pub fn init_example() -> String {
        let defaults = Self::default();
        format!(
            "# envslot configuration\n\
             \n\
             # Where environments are installed (one directory per lockfile)\n\
             cache_root = \"{}\"\n\
             \n\
             # Offline mirror with channel/<subdir>/<file> and pypi/<file>\n\
             resource_root = \"{}\"\n\
             \n\
             # Lockfile environment to install\n\
             environment = \"{}\"\n\
             \n\
             # installer_path = \"/usr/local/bin/pixi\"\n\
             install_timeout_secs = {}\n",
            defaults.cache_root,
            defaults.resource_root,
            defaults.environment,
            defaults.install_timeout_secs
        )
    }
}
