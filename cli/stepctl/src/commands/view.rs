//! Review listing of a deployment.

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use stepchain_bundle::{definition_hash, Action, Bundle, DeploymentDefinition};

use crate::output::{print_json, rule, OutputFormat};

use super::CommandContext;

/// Print every action of a deployment for human review.
#[derive(Debug, Args)]
pub struct ViewCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    actions: &'a [Action],
    total_transactions: usize,
    bundle_hash: String,
    definition_hash: String,
}

impl ViewCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (definition, bundle) = ctx.load_bundle(&self.deployment)?;
        let digest = definition_hash(&definition);

        match ctx.format {
            OutputFormat::Json => print_json(&Summary {
                actions: &definition.actions,
                total_transactions: bundle.len(),
                bundle_hash: bundle.hash().to_string(),
                definition_hash: digest,
            }),
            OutputFormat::Table => print!("{}", render(&definition, &bundle, &digest)),
        }
        Ok(())
    }
}

fn display_argument(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_field(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn write_arguments(out: &mut String, heading: &str, args: &[Value]) {
    let _ = writeln!(out, "{heading}:");
    if args.is_empty() {
        let _ = writeln!(out, "   >> NO ARGUMENTS PROVIDED <<");
    }
    for (j, arg) in args.iter().enumerate() {
        let _ = writeln!(out, "   {}. {}", j + 1, display_argument(arg));
    }
}

fn render(definition: &DeploymentDefinition, bundle: &Bundle, digest: &str) -> String {
    let mut out = String::from("\n");

    for (i, action) in definition.actions.iter().enumerate() {
        let gas = action
            .gas_limit()
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string());

        match action {
            Action::Deploy(deploy) => {
                let _ = writeln!(out, "Action #{}: Contract DEPLOYMENT", i + 1);
                let _ = writeln!(out, "{}", rule());
                let _ = writeln!(out, "Contract: {}", display_field(deploy.contract.as_deref()));
                if let Some(name) = &deploy.name {
                    let _ = writeln!(out, "Contract Alias: {name}");
                }
                let _ = writeln!(out, "Gas Limit: {gas}");
                write_arguments(&mut out, "Constructor Arguments", &deploy.arguments);
            }
            Action::Call(call) => {
                let _ = writeln!(out, "Action #{}: Contract CALL", i + 1);
                let _ = writeln!(out, "{}", rule());
                let _ = writeln!(out, "Contract: {}", display_field(call.target.as_deref()));
                let _ = writeln!(out, "Gas Limit: {gas}");
                let _ = writeln!(
                    out,
                    "Function Name: {}",
                    display_field(call.function.as_deref())
                );
                write_arguments(&mut out, "Function Arguments", &call.arguments);
            }
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Deployment Summary");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Total Transactions: {}", bundle.len());
    let _ = writeln!(out, "Bundle Hash: {}", bundle.hash());
    let _ = writeln!(out, "Definition Hash: {digest}");
    out
}
