//! Error handling and display for the CLI.

use colored::Colorize;
use stepchain_abi::B256;
use thiserror::Error;

use crate::rpc::RpcError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No coordinator address. Pass --coordinator or run `step config set coordinator <ADDRESS>`.")]
    NoCoordinator,

    #[error("The node has no unlocked accounts to send from")]
    NoAccount,

    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Bundle hash mismatch: provided {provided}, computed {computed}")]
    BundleMismatch { provided: B256, computed: B256 },

    #[error("Execution aborted: {0}")]
    Aborted(String),

    #[error("Execution cancelled at operation #{0}")]
    Cancelled(usize),

    #[error("Approval not confirmed")]
    NotConfirmed,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    // Check for specific error types and provide hints
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NoAccount => {
                eprintln!(
                    "\n{}",
                    "Hint: Pass --from with an account the node can sign for.".yellow()
                );
            }
            CliError::Rpc(RpcError::Transport(_)) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the node is reachable at --rpc-url.".yellow()
                );
            }
            CliError::BundleMismatch { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The definition, artifacts or coordinator differ from the ones the hash was computed with."
                        .yellow()
                );
            }
            CliError::Cancelled(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `step execute` again to resume from the coordinator's position."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
