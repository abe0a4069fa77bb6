//! CLI commands.

mod approve;
mod bundle;
mod config;
mod deploy_coordinator;
mod execute;
mod status;
mod verify;
mod view;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stepchain_abi::Address;
use stepchain_bundle::{resolve, ArtifactDir, Bundle, DeploymentDefinition};
use tracing::debug;

use crate::config::Config;
use crate::error::CliError;
use crate::output::OutputFormat;
use crate::rpc::{CoordinatorClient, JsonRpc};

/// step - Build, review, approve and execute deployment bundles.
#[derive(Debug, Parser)]
#[command(name = "step")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, env = "STEP_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// JSON-RPC endpoint of the node.
    #[arg(long, global = true, env = "STEP_RPC_URL")]
    rpc_url: Option<String>,

    /// Coordinator contract address.
    #[arg(long, global = true, env = "STEP_COORDINATOR")]
    coordinator: Option<Address>,

    /// Sending account; defaults to the node's first account.
    #[arg(long, global = true, env = "STEP_FROM")]
    from: Option<Address>,

    /// Directory searched for compiled contract artifacts.
    #[arg(long, global = true, env = "STEP_ARTIFACTS")]
    artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a bundle and print its hash and operations.
    Bundle(bundle::BundleCommand),

    /// Print a review listing of a deployment.
    View(view::ViewCommand),

    /// Check a bundle hash against a deployment.
    Verify(verify::VerifyCommand),

    /// Approve a bundle on the coordinator.
    Approve(approve::ApproveCommand),

    /// Execute the approved bundle until it is finished.
    Execute(execute::ExecuteCommand),

    /// Show the coordinator's pointer relative to a bundle.
    Status(status::StatusCommand),

    /// Deploy a new coordinator contract.
    DeployCoordinator(deploy_coordinator::DeployCoordinatorCommand),

    /// Show or change stored configuration.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, config: Config) -> Result<()> {
        let ctx = CommandContext {
            config,
            format: self.format,
            rpc_url: self.rpc_url,
            coordinator: self.coordinator,
            from: self.from,
            artifacts: self.artifacts,
        };

        match self.command {
            Commands::Bundle(cmd) => cmd.run(ctx).await,
            Commands::View(cmd) => cmd.run(ctx).await,
            Commands::Verify(cmd) => cmd.run(ctx).await,
            Commands::Approve(cmd) => cmd.run(ctx).await,
            Commands::Execute(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::DeployCoordinator(cmd) => cmd.run(ctx).await,
            Commands::Config(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub rpc_url: Option<String>,
    pub coordinator: Option<Address>,
    pub from: Option<Address>,
    pub artifacts: Option<PathBuf>,
}

impl CommandContext {
    /// JSON-RPC endpoint, preferring flag over config.
    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or(&self.config.rpc_url)
    }

    /// Coordinator address, preferring flag over config.
    pub fn coordinator(&self) -> Result<Address> {
        if let Some(coordinator) = self.coordinator {
            return Ok(coordinator);
        }
        match self.config.coordinator.as_deref() {
            Some(stored) => stored
                .parse::<Address>()
                .with_context(|| format!("Invalid coordinator address in config: {stored}")),
            None => Err(CliError::NoCoordinator.into()),
        }
    }

    /// Sender, preferring flag over config. `None` means the node's first account.
    pub fn from(&self) -> Result<Option<Address>> {
        if let Some(from) = self.from {
            return Ok(Some(from));
        }
        self.config
            .from
            .as_deref()
            .map(|stored| {
                stored
                    .parse::<Address>()
                    .with_context(|| format!("Invalid sender address in config: {stored}"))
            })
            .transpose()
    }

    pub fn artifacts(&self) -> &Path {
        self.artifacts.as_deref().unwrap_or(&self.config.artifacts)
    }

    /// Load a definition and build its bundle for the current coordinator.
    pub fn load_bundle(&self, deployment: &Path) -> Result<(DeploymentDefinition, Bundle)> {
        let coordinator = self.coordinator()?;
        let definition = DeploymentDefinition::load(deployment)?;
        let artifacts = ArtifactDir::new(self.artifacts());
        let operations = resolve(&definition, &coordinator, &artifacts)
            .with_context(|| format!("Invalid deployment {}", deployment.display()))?;
        let bundle = Bundle::new(operations);
        debug!(
            deployment = %deployment.display(),
            operations = bundle.len(),
            bundle = %bundle.hash(),
            "Built bundle"
        );
        Ok((definition, bundle))
    }

    /// Coordinator client for the configured node and sender.
    pub async fn client(&self) -> Result<CoordinatorClient> {
        let rpc = JsonRpc::new(self.rpc_url()).map_err(CliError::from)?;
        let client = CoordinatorClient::connect(
            rpc,
            self.coordinator()?,
            self.from()?,
            &self.config.executor,
        )
        .await?;
        Ok(client)
    }

    /// Client for sending contract creations; no coordinator is needed yet.
    pub async fn deployer(&self) -> Result<CoordinatorClient> {
        let rpc = JsonRpc::new(self.rpc_url()).map_err(CliError::from)?;
        let client =
            CoordinatorClient::connect(rpc, Address::ZERO, self.from()?, &self.config.executor)
                .await?;
        Ok(client)
    }

    /// Read-only client; never asks the node for accounts.
    pub fn reader(&self) -> Result<CoordinatorClient> {
        let rpc = JsonRpc::new(self.rpc_url()).map_err(CliError::from)?;
        Ok(CoordinatorClient::new(
            rpc,
            self.coordinator()?,
            self.from()?.unwrap_or(Address::ZERO),
            &self.config.executor,
        ))
    }
}
