//! Install a lockfile's environment.

use super::CommandContext;
use crate::core::CancelToken;
use crate::core::cancel::cancel_on_ctrl_c;
use crate::installer::InstallCoordinator;
use crate::utils::progress::{ProgressSink, SpinnerProgress};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Install the environment described by a lockfile into its cache slot.
///
/// Running the command again for the same lockfile returns immediately once the
/// environment is installed.
#[derive(Args)]
pub struct InstallCommand {
    /// Lockfile to install
    #[arg(long)]
    lock: PathBuf,

    /// Manifest paired with the lockfile
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Lockfile environment to install (defaults to the configured one)
    #[arg(short, long)]
    environment: Option<String>,

    /// Offline mirror to install from (defaults to the configured one)
    #[arg(long)]
    resource_root: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct InstallReport {
    slot: PathBuf,
    environment: String,
    environment_dir: PathBuf,
    python: PathBuf,
}

impl InstallCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let spec = CommandContext::read_spec(&self.lock, self.manifest.as_deref())?;

        let mut options = ctx.config.install_options()?;
        if let Some(environment) = self.environment {
            options.environment = environment;
        }
        if let Some(resource_root) = self.resource_root {
            options.resource_root = resource_root;
        }
        let environment = options.environment.clone();

        let coordinator = Arc::new(InstallCoordinator::new(
            ctx.resolver()?,
            Arc::new(ctx.config.installer()?),
            options,
        ));
        let handle = coordinator.handle(spec).await?;

        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone());
        let progress: Arc<dyn ProgressSink> =
            Arc::new(SpinnerProgress::new(ctx.no_progress || self.json));

        let result = handle.ensure_installed(progress, &cancel).await;
        if result.is_err() {
            coordinator.shutdown();
        }
        let env_dir = result?;

        let report = InstallReport {
            slot: handle.slot_dir().to_path_buf(),
            environment,
            environment_dir: env_dir,
            python: handle.python_executable(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{} {}", "✓".green(), format!("Environment '{}' ready", report.environment).bold());
            println!("  slot:        {}", report.slot.display());
            println!("  environment: {}", report.environment_dir.display());
            println!("  python:      {}", report.python.display());
        }
        Ok(())
    }
}
