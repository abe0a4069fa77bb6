//! Verify command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use stepchain_abi::B256;

use crate::error::CliError;
use crate::output::{print_json, OutputFormat};

use super::CommandContext;

/// Check that a bundle hash matches a deployment definition.
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,

    /// 32-byte 0x-prefixed bundle hash to check.
    #[arg(long, value_name = "HASH")]
    bundle: B256,
}

impl VerifyCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, bundle) = ctx.load_bundle(&self.deployment)?;
        let computed = bundle.hash();
        let valid = bundle.verify(&self.bundle);

        match ctx.format {
            OutputFormat::Json => print_json(&json!({
                "valid": valid,
                "provided": self.bundle,
                "computed": computed,
            })),
            OutputFormat::Table => {
                if valid {
                    println!("{}", "OK: Provided bundle hash is valid!".green().bold());
                } else {
                    println!("{}", "ERROR: Provided bundle hash is invalid!".red().bold());
                }
                println!("Provided: {}", self.bundle);
                println!("Computed: {computed}");
            }
        }

        if !valid {
            return Err(CliError::BundleMismatch {
                provided: self.bundle,
                computed,
            }
            .into());
        }
        Ok(())
    }
}
