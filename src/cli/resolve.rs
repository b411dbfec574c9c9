//! Print the cache slot for a lockfile.

use super::CommandContext;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Resolve a lockfile (and optional manifest) to its cache slot directory.
///
/// The slot is allocated and its sentinel written on first use, but nothing is installed.
#[derive(Args)]
pub struct ResolveCommand {
    /// Lockfile to resolve
    #[arg(long)]
    lock: PathBuf,

    /// Manifest paired with the lockfile
    #[arg(long)]
    manifest: Option<PathBuf>,
}

impl ResolveCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let spec = CommandContext::read_spec(&self.lock, self.manifest.as_deref())?;
        let resolver = ctx.resolver()?;

        let slot = resolver.resolve_async(spec.identity_bytes()).await?;
        tracing::debug!("Content hash {}", spec.content_hash());
        println!("{}", slot.display());
        Ok(())
    }
}
