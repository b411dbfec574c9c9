//! Configuration file management.

use crate::config::GlobalConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Show, locate or create the configuration file.
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Print the configuration file location
    Path,

    /// Print the effective configuration (defaults included)
    Show,

    /// Write a commented starting configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let path = match config_path {
            Some(path) => path,
            None => GlobalConfig::default_path()?,
        };

        match self.command {
            Some(ConfigSubcommands::Path) => {
                println!("{}", path.display());
                Ok(())
            }
            Some(ConfigSubcommands::Show) | None => {
                let config = GlobalConfig::load_with_optional(Some(path.clone())).await?;
                if !path.exists() {
                    println!("{}", format!("# {} does not exist, showing defaults", path.display()).dimmed());
                }
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            Some(ConfigSubcommands::Init {
                force,
            }) => Self::init(&path, force).await,
        }
    }

    async fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            println!("❌ Config already exists at: {}", path.display());
            println!("   Use --force to overwrite");
            return Ok(());
        }

        let content = GlobalConfig::init_example();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            crate::utils::fs::atomic_write(&target, content.as_bytes())
        })
        .await?
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

        println!("✅ Created config at: {}", path.display());
        println!("\n{}", "Next steps:".yellow());
        println!("  1. Point resource_root at your offline mirror");
        println!("  2. Run `envslot install --lock pixi.lock`");
        Ok(())
    }
}
