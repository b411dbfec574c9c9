//! List cache slots.

use super::CommandContext;
use crate::cache::short;
use crate::installer::{environment_dir, installed_marker};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Show every mapped slot with its content hash and install state.
#[derive(Args)]
pub struct ListCommand {
    /// Print the slots as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct SlotRow {
    hash: String,
    slot: String,
    path: PathBuf,
    installed: bool,
}

impl ListCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let resolver = ctx.resolver()?;
        let environment = ctx.config.environment.clone();

        let entries = tokio::task::spawn_blocking(move || resolver.entries()).await??;
        let rows: Vec<SlotRow> = entries
            .into_iter()
            .map(|entry| SlotRow {
                installed: installed_marker(&environment_dir(&entry.path, &environment)).exists(),
                hash: entry.hash,
                slot: entry.slot,
                path: entry.path,
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if rows.is_empty() {
            println!("No cache slots under {}", ctx.config.cache_root_path()?.display());
            return Ok(());
        }

        for row in &rows {
            let state =
                if row.installed { "installed".green() } else { "not installed".yellow() };
            println!("{:<6} {}  {}", row.slot.bold(), short(&row.hash), state);
        }
        Ok(())
    }
}
