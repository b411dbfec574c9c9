//! Command-line interface for envslot.
//!
//! # Commands
//!
//! - `resolve` - Print the cache slot a lockfile maps to (allocating it if needed)
//! - `install` - Install a lockfile's environment into its slot, at most once
//! - `localize` - Print a lockfile rewritten against the offline mirror
//! - `list` - Show all known slots and whether they are installed
//! - `config` - Show, locate or create the configuration file
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress all output except errors
//! - `--config <path>` - Use a specific configuration file
//! - `--no-progress` - Disable the spinner
//!
//! `RUST_LOG` overrides the log level chosen by `--verbose`/`--quiet`.
//!
//! # Examples
//!
//! ```bash
//! envslot resolve --lock pixi.lock
//! envslot --verbose install --lock pixi.lock --manifest pixi.toml
//! envslot install --lock pixi.lock --json
//! envslot localize --lock pixi.lock --resource-root /opt/mirror
//! envslot list --json
//! envslot config init
//! ```

mod config;
mod install;
mod list;
mod localize;
mod resolve;

use crate::cache::SlotResolver;
use crate::config::GlobalConfig;
use crate::manifest::EnvironmentSpec;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Settings derived from the global flags, applied before a command runs.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for the tracing subscriber (`None` means errors only)
    pub log_level: Option<String>,

    /// Whether the spinner is disabled
    pub no_progress: bool,

    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
}

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Loaded configuration
    pub config: GlobalConfig,
    /// Whether the spinner is disabled
    pub no_progress: bool,
    /// Configuration file location in effect
    pub config_path: Option<PathBuf>,
}

impl CommandContext {
    /// A slot resolver over the configured cache root.
    pub fn resolver(&self) -> Result<Arc<SlotResolver>> {
        Ok(Arc::new(SlotResolver::new(self.config.cache_root_path()?)))
    }

    /// Read the spec named by `--lock` and `--manifest`.
    pub fn read_spec(lock: &Path, manifest: Option<&Path>) -> Result<EnvironmentSpec> {
        EnvironmentSpec::from_files(lock, manifest)
            .with_context(|| format!("Failed to read environment spec {}", lock.display()))
    }
}

/// Main CLI structure for envslot.
#[derive(Parser)]
#[command(
    name = "envslot",
    about = "Content-addressed, offline installation of pixi environments",
    version,
    long_about = "envslot maps a pixi lockfile to its own cache directory, rewrites it against a local mirror and installs it at most once, however many callers ask for it concurrently."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "ENVSLOT_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Disable progress indicators.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache slot directory for a lockfile
    Resolve(resolve::ResolveCommand),

    /// Install a lockfile's environment into its cache slot
    Install(install::InstallCommand),

    /// Print a lockfile rewritten to install from the offline mirror
    Localize(localize::LocalizeCommand),

    /// List cache slots
    List(list::ListCommand),

    /// Manage the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit [`CliConfig`].
    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        init_logging(cli_config.log_level.as_deref());

        if let Commands::Config(cmd) = self.command {
            return cmd.execute(cli_config.config_path).await;
        }

        let ctx = CommandContext {
            config: GlobalConfig::load_with_optional(cli_config.config_path.clone()).await?,
            no_progress: cli_config.no_progress,
            config_path: cli_config.config_path,
        };

        match self.command {
            Commands::Resolve(cmd) => cmd.execute(&ctx).await,
            Commands::Install(cmd) => cmd.execute(&ctx).await,
            Commands::Localize(cmd) => cmd.execute(&ctx).await,
            Commands::List(cmd) => cmd.execute(&ctx).await,
            Commands::Config(_) => Ok(()),
        }
    }
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `level`; `None` means errors only.
fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("error")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
