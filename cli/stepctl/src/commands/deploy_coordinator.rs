//! Deploy a coordinator contract.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;
use stepchain_abi::{Address, DynSolType, SolValue};
use stepchain_bundle::{Artifact, ArtifactDir, ArtifactSource};
use tracing::info;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

/// Deploy a new coordinator instance.
#[derive(Debug, Args)]
pub struct DeployCoordinatorCommand {
    /// Artifact name of the coordinator contract.
    #[arg(long, value_name = "NAME")]
    artifact: String,

    /// Owner passed to the constructor. Defaults to the sender.
    #[arg(long, value_name = "ADDRESS")]
    owner: Option<Address>,
}

/// Creation code for `artifact`, with `owner` as the constructor argument
/// when the constructor takes a single address.
fn init_code(artifact: &Artifact, owner: Address) -> Result<Vec<u8>> {
    let mut code = artifact.bytecode.clone();
    match artifact.constructor_types()?.as_slice() {
        [] => {}
        [DynSolType::Address] => code.extend(owner.abi_encode()),
        other => bail!(
            "Contract '{}' has an unsupported constructor ({}); expected (address) or no arguments",
            artifact.contract_name,
            other
                .iter()
                .map(|ty| ty.sol_type_name())
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
    Ok(code)
}

impl DeployCoordinatorCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let artifacts = ArtifactDir::new(ctx.artifacts());
        let artifact = artifacts
            .artifact(&self.artifact)
            .with_context(|| format!("Failed to load artifact '{}'", self.artifact))?;

        let client = ctx.deployer().await?;
        let owner = self.owner.unwrap_or_else(|| client.from());
        let code = init_code(&artifact, owner)?;

        if ctx.format == OutputFormat::Table {
            print_info(&format!("Deploying new {}", artifact.contract_name));
            println!("Owner: {owner}");
            println!("Sender: {}", client.from());
        }

        let receipt = client.deploy(&code).await?;
        let address = receipt
            .contract_address
            .context("Receipt does not report a contract address")?;
        info!(%address, tx = %receipt.tx_hash, "Coordinator deployed");

        match ctx.format {
            OutputFormat::Json => print_json(&json!({
                "address": address,
                "owner": owner,
                "tx_hash": receipt.tx_hash,
                "block_number": receipt.block_number,
            })),
            OutputFormat::Table => {
                println!("Transaction hash: {}", receipt.tx_hash);
                print_success(&format!("{} address: {address}", artifact.contract_name));
            }
        }
        Ok(())
    }
}
