//! Config commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

/// Show or change stored configuration.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Show the stored configuration.
    Show,

    /// Set one value, e.g. `coordinator` or `executor.grace_ms`.
    ///
    /// An empty value clears an optional address.
    Set {
        key: String,
        value: String,
    },
}

impl ConfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ConfigSubcommand::Show => show(ctx),
            ConfigSubcommand::Set { key, value } => set(ctx, &key, &value),
        }
    }
}

fn show(ctx: CommandContext) -> Result<()> {
    let config = &ctx.config;
    match ctx.format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Table => {
            println!("rpc_url: {}", config.rpc_url);
            println!("coordinator: {}", config.coordinator.as_deref().unwrap_or("-"));
            println!("from: {}", config.from.as_deref().unwrap_or("-"));
            println!("artifacts: {}", config.artifacts.display());
            println!("log_level: {}", config.log_level);
            let executor = &config.executor;
            println!("executor.gas_padding: {}", executor.gas_padding);
            println!("executor.backoff_floor_ms: {}", executor.backoff_floor_ms);
            println!("executor.jitter_max_ms: {}", executor.jitter_max_ms);
            println!("executor.backoff_cap_ms: {}", executor.backoff_cap_ms);
            println!("executor.grace_ms: {}", executor.grace_ms);
            println!("executor.receipt_poll_ms: {}", executor.receipt_poll_ms);
            println!(
                "executor.inclusion_timeout_secs: {}",
                executor.inclusion_timeout_secs
            );
        }
    }
    Ok(())
}

fn set(mut ctx: CommandContext, key: &str, value: &str) -> Result<()> {
    ctx.config.set(key, value)?;
    let path = ctx.config.save()?;

    match ctx.format {
        OutputFormat::Json => print_json(&serde_json::json!({ "ok": true, "key": key })),
        OutputFormat::Table => {
            print_success(&format!("Set {key} in {}", path.display()))
        }
    }
    Ok(())
}
