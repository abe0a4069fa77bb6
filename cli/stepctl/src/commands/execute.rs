//! Execute command.
//!
//! Runs the executor until the bundle is finished or no longer active. Safe to
//! run alongside other agents and to restart; progress is re-derived from the
//! coordinator every time.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use stepchain_reconcile::{ExecuteError, Execution, Executor, Outcome};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::CliError;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

use super::CommandContext;

/// Execute an approved bundle.
#[derive(Debug, Args)]
pub struct ExecuteCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,
}

impl ExecuteCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, bundle) = ctx.load_bundle(&self.deployment)?;
        let client = ctx.client().await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next safe point");
                let _ = cancel_tx.send(true);
            }
        });

        if ctx.format == OutputFormat::Table {
            print_info(&format!(
                "Executing bundle {} ({} operation(s)) from {}",
                bundle.hash(),
                bundle.len(),
                client.from()
            ));
        }

        let result = Executor::new(&bundle, &client, &client, cancel_rx)
            .with_config(ctx.config.executor.executor_config())
            .run()
            .await;

        let execution = match result {
            Ok(execution) => execution,
            Err(ExecuteError::Cancelled { cursor }) => {
                info!(cursor, "Execution cancelled");
                return Err(CliError::Cancelled(cursor).into());
            }
        };

        report(&execution, ctx.format);
        match execution.outcome {
            Outcome::Aborted(cause) => Err(CliError::Aborted(cause).into()),
            Outcome::Completed | Outcome::NotActive => Ok(()),
        }
    }
}

fn report(execution: &Execution, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(execution),
        OutputFormat::Table => match &execution.outcome {
            Outcome::Completed => print_success(&format!(
                "Bundle completed; this run submitted {} operation(s) in {} attempt(s)",
                execution.submissions.len(),
                execution.attempts
            )),
            Outcome::NotActive => print_warning(
                "Provided deployment is not active. Are you sure you have the right deployment?",
            ),
            Outcome::Aborted(_) => {}
        },
    }
}
