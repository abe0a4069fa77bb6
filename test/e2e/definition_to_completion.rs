//! From a definition file on disk to a completed execution.
//!
//! Loads a definition and Hardhat artifacts from a temporary directory,
//! resolves and hashes the bundle, approves it on a fake coordinator and
//! drives it to completion.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p stepchain-e2e --test definition_to_completion
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stepchain_abi::{Address, Function, B256};
use stepchain_bundle::{
    alias_address, definition_hash, resolve, ArtifactDir, Bundle, DeploymentDefinition,
};
use stepchain_reconcile::{
    Backoff, BackoffPolicy, CoordinatorView, Executor, ExecutorConfig, Ledger, Outcome,
};
use stepchain_testing::{FakeCoordinator, RecordingClock, Step};
use tokio::sync::watch;

const COORDINATOR: Address = Address::new([0x42; 20]);

fn write_artifacts(root: &Path) {
    let counter = json!({
        "contractName": "Counter",
        "abi": [
            { "type": "constructor", "inputs": [{ "name": "start", "type": "uint256" }], "stateMutability": "nonpayable" },
            { "type": "function", "name": "add", "inputs": [{ "name": "x", "type": "uint256" }], "outputs": [], "stateMutability": "nonpayable" },
            { "type": "function", "name": "setOwner", "inputs": [{ "name": "owner", "type": "address" }], "outputs": [], "stateMutability": "nonpayable" }
        ],
        "bytecode": "0x6080604052348015600f57600080fd5b50"
    });
    let nested = root.join("contracts").join("Counter.sol");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("Counter.json"), counter.to_string()).unwrap();
}

fn write_definition(root: &Path) -> std::path::PathBuf {
    let definition = json!([
        { "action": "deploy", "contract": "Counter", "name": "counter", "arguments": [1], "gasLimit": 1_000_000 },
        { "action": "call", "target": "counter", "function": "add", "arguments": ["41"], "gasLimit": 80_000 },
        { "action": "call", "target": "counter", "function": "setOwner(address)", "arguments": ["counter"], "gasLimit": 60_000 }
    ]);
    let path = root.join("deployment.json");
    fs::write(&path, serde_json::to_string_pretty(&definition).unwrap()).unwrap();
    path
}

fn load_bundle(root: &Path) -> (DeploymentDefinition, Bundle) {
    let definition = DeploymentDefinition::load(&write_definition(root)).unwrap();
    let operations = resolve(&definition, &COORDINATOR, &ArtifactDir::new(root)).unwrap();
    (definition, Bundle::new(operations))
}

#[tokio::test]
async fn test_approved_bundle_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let (_, bundle) = load_bundle(dir.path());
    assert_eq!(bundle.len(), 3);

    let coordinator = FakeCoordinator::new(&bundle).inactive();
    let pending = coordinator.approve(&bundle.hash()).await.unwrap();
    coordinator.await_finality(&pending).await.unwrap();
    assert_eq!(coordinator.approvals(), vec![bundle.hash()]);

    let clock = Arc::new(RecordingClock::new());
    let policy = BackoffPolicy {
        floor: Duration::from_millis(10),
        jitter_max: Duration::from_millis(10),
        cap: Duration::from_secs(1),
    };
    let execution = Executor::new(&bundle, &coordinator, &coordinator, watch::channel(false).1)
        .with_config(ExecutorConfig {
            backoff: policy.clone(),
            ..ExecutorConfig::default()
        })
        .with_backoff(Backoff::seeded(policy, 1))
        .with_clock(clock.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![0, 1, 2]);

    let calls = coordinator.executions();
    assert!(calls[0].is_create);
    assert_eq!(calls[0].padded_limit, 1_100_000);

    let counter = alias_address(&COORDINATOR, 0, &bundle.operations()[0].payload);
    assert!(!calls[1].is_create);
    assert_eq!(calls[1].target, counter);
    assert_eq!(calls[2].target, counter);

    let set_owner = Function::parse("setOwner(address)").unwrap();
    assert_eq!(&calls[2].payload[..4], set_owner.selector().as_slice());
    assert_eq!(calls[2].payload[16..36], counter.as_slice()[..]);
}

#[tokio::test]
async fn test_independent_resolutions_agree_on_the_bundle() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();
    for dir in [&first_dir, &second_dir] {
        write_artifacts(dir.path());
    }

    let (first_definition, first) = load_bundle(first_dir.path());
    let (second_definition, second) = load_bundle(second_dir.path());

    assert_eq!(first.hash(), second.hash());
    assert_eq!(first.fingerprints(), second.fingerprints());
    assert_eq!(
        definition_hash(&first_definition),
        definition_hash(&second_definition)
    );
    assert!(first.verify(&second.hash()));
}

#[tokio::test]
async fn test_second_agent_joins_midway_and_finishes() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let (_, bundle) = load_bundle(dir.path());

    // Another agent already landed the deployment.
    let coordinator = FakeCoordinator::new(&bundle)
        .starting_at(1)
        .script([Step::RaceLost { advance: 1 }]);
    let clock = Arc::new(RecordingClock::new());

    let execution = Executor::new(&bundle, &coordinator, &coordinator, watch::channel(false).1)
        .with_clock(clock)
        .run()
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![1, 2]);
    assert_eq!(coordinator.pointer(), B256::ZERO);
}
