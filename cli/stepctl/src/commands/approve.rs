//! Approve command.
//!
//! Approval authorizes every operation in the bundle, so it asks twice: a
//! yes/no question, then the tail of the bundle hash typed back.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use stepchain_abi::B256;
use stepchain_reconcile::{CoordinatorView, Ledger};
use tracing::info;

use crate::error::CliError;
use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

/// Hex characters of the bundle hash the operator must type back.
const CONFIRM_SUFFIX_LEN: usize = 8;

/// Approve a bundle on the coordinator.
#[derive(Debug, Args)]
pub struct ApproveCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,

    /// Skip the interactive confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

impl ApproveCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, bundle) = ctx.load_bundle(&self.deployment)?;
        let coordinator = ctx.coordinator()?;

        if !self.yes {
            let stdin = io::stdin();
            let confirmed = confirm(
                &mut stdin.lock(),
                &mut io::stderr(),
                &bundle.hash(),
                bundle.len(),
                &coordinator.to_string(),
            )
            .context("Failed to read confirmation")?;
            if !confirmed {
                return Err(CliError::NotConfirmed.into());
            }
        }

        let client = ctx.client().await?;
        if ctx.format == OutputFormat::Table {
            print_info(&format!("Approving bundle {} from {}", bundle.hash(), client.from()));
        }

        let pending = client
            .approve(&bundle.hash())
            .await
            .map_err(|e| anyhow::anyhow!("Approval was not accepted: {e}"))?;
        let receipt = client
            .await_finality(&pending)
            .await
            .map_err(|e| anyhow::anyhow!("Approval transaction {pending} failed: {e}"))?;
        info!(bundle = %bundle.hash(), tx = %receipt.tx_hash, "Bundle approved");

        match ctx.format {
            OutputFormat::Json => print_json(&json!({
                "bundle_hash": bundle.hash(),
                "coordinator": coordinator,
                "tx_hash": receipt.tx_hash,
                "block_number": receipt.block_number,
            })),
            OutputFormat::Table => print_success(&format!(
                "Bundle {} approved in block {} (tx {})",
                bundle.hash(),
                receipt.block_number,
                receipt.tx_hash
            )),
        }
        Ok(())
    }
}

fn read_answer(input: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Asks for a yes/no answer, then for the last characters of the hash.
fn confirm(
    input: &mut impl BufRead,
    output: &mut impl Write,
    hash: &B256,
    operations: usize,
    coordinator: &str,
) -> io::Result<bool> {
    writeln!(
        output,
        "About to approve bundle {hash} ({operations} operation(s)) on coordinator {coordinator}."
    )?;
    write!(output, "Approve this bundle? [y/N] ")?;
    output.flush()?;
    if !matches!(read_answer(input)?.to_lowercase().as_str(), "y" | "yes") {
        return Ok(false);
    }

    let hex = hash.to_string();
    let suffix = &hex[hex.len() - CONFIRM_SUFFIX_LEN..];
    write!(
        output,
        "Type the last {CONFIRM_SUFFIX_LEN} characters of the bundle hash to confirm: "
    )?;
    output.flush()?;
    Ok(read_answer(input)?.eq_ignore_ascii_case(suffix))
}
