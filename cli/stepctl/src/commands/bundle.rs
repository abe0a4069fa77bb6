//! Bundle command.
//!
//! Offline apart from the coordinator address, which placeholder addresses
//! depend on.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use stepchain_bundle::Bundle;
use tabled::Tabled;

use crate::output::{print_info, print_json, print_output, OutputFormat};

use super::CommandContext;

/// Build a bundle from a deployment definition.
#[derive(Debug, Args)]
pub struct BundleCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,
}

#[derive(Debug, Serialize, Tabled)]
struct OperationRow {
    #[tabled(rename = "#")]
    index: usize,
    kind: &'static str,
    target: String,
    #[tabled(rename = "gas limit")]
    resource_limit: u64,
    #[tabled(rename = "payload bytes")]
    payload_len: usize,
    fingerprint: String,
}

#[derive(Debug, Serialize)]
struct BundleView<'a> {
    bundle_hash: String,
    coordinator: String,
    operations: &'a [OperationRow],
}

fn rows(bundle: &Bundle) -> Vec<OperationRow> {
    bundle
        .operations()
        .iter()
        .zip(bundle.fingerprints())
        .enumerate()
        .map(|(index, (op, fingerprint))| OperationRow {
            index,
            kind: if op.is_create { "create" } else { "call" },
            target: op
                .target
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
            resource_limit: op.resource_limit,
            payload_len: op.payload.len(),
            fingerprint: fingerprint.to_string(),
        })
        .collect()
}

impl BundleCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, bundle) = ctx.load_bundle(&self.deployment)?;
        let rows = rows(&bundle);

        match ctx.format {
            OutputFormat::Json => print_json(&BundleView {
                bundle_hash: bundle.hash().to_string(),
                coordinator: ctx.coordinator()?.to_string(),
                operations: &rows,
            }),
            OutputFormat::Table => {
                print_info(&format!("Bundle hash: {}", bundle.hash()));
                print_output(&rows, ctx.format);
            }
        }
        Ok(())
    }
}
