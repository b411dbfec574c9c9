//! Print a localized lockfile.

use super::CommandContext;
use crate::lockfile::{LockfileDocument, localize};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Rewrite a lockfile so that one environment installs from the offline mirror.
///
/// Prints the result, or writes it to `--output`.
#[derive(Args)]
pub struct LocalizeCommand {
    /// Lockfile to rewrite
    #[arg(long)]
    lock: PathBuf,

    /// Environment to keep (defaults to the configured one)
    #[arg(short, long)]
    environment: Option<String>,

    /// Offline mirror root (defaults to the configured one)
    #[arg(long)]
    resource_root: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl LocalizeCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let environment = self.environment.unwrap_or_else(|| ctx.config.environment.clone());
        let resource_root = match self.resource_root {
            Some(root) => root,
            None => ctx.config.resource_root_path()?,
        };

        let doc = LockfileDocument::from_file(&self.lock)?;
        let localized = localize(doc, &environment, &resource_root)
            .with_context(|| format!("Failed to localize {}", self.lock.display()))?;

        match self.output {
            Some(path) => {
                localized.write_to(&path)?;
                tracing::info!("Wrote {}", path.display());
            }
            None => print!("{}", localized.to_yaml()?),
        }
        Ok(())
    }
}
