//! Status command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use stepchain_abi::B256;
use stepchain_bundle::{Bundle, Position};
use stepchain_reconcile::CoordinatorView;

use crate::output::{print_json, OutputFormat};

use super::CommandContext;

/// Show where the coordinator's pointer is relative to a bundle.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Deployment definition (JSON or TOML).
    #[arg(long, short = 'd', value_name = "PATH")]
    deployment: PathBuf,
}

#[derive(Debug, Serialize)]
struct StatusView {
    bundle_hash: B256,
    pointer: B256,
    /// `next`, `inactive` or `foreign`.
    state: &'static str,
    /// Zero-based index of the next operation when `state` is `next`.
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<usize>,
    total: usize,
}

fn status_view(bundle: &Bundle, pointer: B256) -> StatusView {
    let (state, next) = match bundle.position_of(&pointer) {
        Position::Next(index) => ("next", Some(index)),
        Position::Inactive => ("inactive", None),
        Position::Foreign => ("foreign", None),
    };
    StatusView {
        bundle_hash: bundle.hash(),
        pointer,
        state,
        next,
        total: bundle.len(),
    }
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, bundle) = ctx.load_bundle(&self.deployment)?;
        let client = ctx.reader()?;
        let pointer = client
            .current_expected_fingerprint()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read coordinator pointer: {}", e.0))?;

        let view = status_view(&bundle, pointer);
        match ctx.format {
            OutputFormat::Json => print_json(&view),
            OutputFormat::Table => {
                println!("Coordinator: {}", client.coordinator());
                println!("Bundle Hash: {}", view.bundle_hash);
                println!("Pointer: {}", view.pointer);
                match view.next {
                    Some(index) => println!(
                        "Position: operation #{} of {} is next",
                        index + 1,
                        view.total
                    ),
                    None if view.state == "inactive" => {
                        println!("Position: no bundle is active")
                    }
                    None => println!("Position: another bundle is active"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepchain_abi::Address;
    use stepchain_bundle::{RawOperation, NO_ACTIVE_BUNDLE};

    fn bundle() -> Bundle {
        let target = Address::new([3u8; 20]);
        Bundle::new(vec![
            RawOperation::call(target, vec![1], 21_000),
            RawOperation::call(target, vec![2], 21_000),
        ])
    }

    #[test]
    fn test_status_maps_pointer() {
        let bundle = bundle();

        let view = status_view(&bundle, bundle.fingerprints()[1]);
        assert_eq!(view.state, "next");
        assert_eq!(view.next, Some(1));
        assert_eq!(view.total, 2);

        let view = status_view(&bundle, NO_ACTIVE_BUNDLE);
        assert_eq!(view.state, "inactive");
        assert_eq!(view.next, None);

        let view = status_view(&bundle, B256::new([9u8; 32]));
        assert_eq!(view.state, "foreign");
    }
}
