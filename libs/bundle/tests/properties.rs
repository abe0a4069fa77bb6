//! Property tests for resolution determinism and the fingerprint chain.

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::json;
use stepchain_abi::{Address, JsonAbi};
use stepchain_bundle::{
    bundle_hash, resolve, Action, Artifact, Bundle, DeploymentDefinition, RawOperation,
};

fn artifacts() -> HashMap<String, Artifact> {
    HashMap::from([(
        "Counter".to_string(),
        Artifact::new(
            "Counter",
            vec![0x60, 0x80, 0x60, 0x40, 0x52],
            JsonAbi::parse(["constructor(uint256 start)", "function add(uint256 amount)"]).unwrap(),
        ),
    )])
}

fn operation() -> impl Strategy<Value = RawOperation> {
    (
        any::<bool>(),
        any::<[u8; 20]>(),
        prop::collection::vec(any::<u8>(), 0..80),
        1u64..10_000_000,
    )
        .prop_map(|(is_create, target, payload, limit)| {
            if is_create {
                RawOperation::create(payload, limit)
            } else {
                RawOperation::call(Address::new(target), payload, limit)
            }
        })
}

/// Definitions whose calls only reference aliases deployed earlier.
fn definition() -> impl Strategy<Value = DeploymentDefinition> {
    prop::collection::vec((any::<bool>(), 0u64..1_000_000, 1u64..5_000_000), 1..8).prop_map(
        |steps| {
            let mut actions = Vec::new();
            let mut deployed = 0usize;
            for (is_call, value, gas) in steps {
                if is_call && deployed > 0 {
                    let target = format!("c{}", (value as usize) % deployed);
                    actions.push(
                        Action::call(target, "add", gas).with_arguments(vec![json!(value)]),
                    );
                } else {
                    actions.push(
                        Action::deploy("Counter", gas)
                            .named(format!("c{deployed}"))
                            .with_arguments(vec![json!(value.to_string())]),
                    );
                    deployed += 1;
                }
            }
            DeploymentDefinition::new(actions)
        },
    )
}

proptest! {
    #[test]
    fn test_resolving_twice_is_byte_identical(def in definition(), coordinator in any::<[u8; 20]>()) {
        let coordinator = Address::new(coordinator);
        let first = resolve(&def, &coordinator, &artifacts()).unwrap();
        let second = resolve(&def, &coordinator, &artifacts()).unwrap();
        prop_assert_eq!(&first, &second);

        let a = Bundle::new(first);
        let b = Bundle::new(second);
        prop_assert_eq!(a.hash(), b.hash());
        prop_assert_eq!(a.fingerprints(), b.fingerprints());
    }

    #[test]
    fn test_changing_one_payload_changes_only_that_fingerprint_and_later(
        ops in prop::collection::vec(operation(), 1..10),
        index in any::<prop::sample::Index>(),
        extra in any::<u8>(),
    ) {
        let i = index.index(ops.len());
        let mut changed = ops.clone();
        changed[i].payload.push(extra);

        let original = Bundle::new(ops);
        let modified = Bundle::new(changed);

        for k in 0..original.len() {
            if k < i {
                prop_assert_eq!(original.fingerprint(k), modified.fingerprint(k));
            } else {
                prop_assert_ne!(original.fingerprint(k), modified.fingerprint(k));
            }
        }
        prop_assert_ne!(original.hash(), modified.hash());
    }

    #[test]
    fn test_swapping_two_distinct_operations_changes_the_bundle_hash(
        ops in prop::collection::vec(operation(), 2..10),
        a in any::<prop::sample::Index>(),
        b in any::<prop::sample::Index>(),
    ) {
        let (i, j) = (a.index(ops.len()), b.index(ops.len()));
        prop_assume!(ops[i] != ops[j]);

        let mut swapped = ops.clone();
        swapped.swap(i, j);
        prop_assert_ne!(bundle_hash(&ops), bundle_hash(&swapped));
    }

    #[test]
    fn test_identical_sequences_hash_identically(ops in prop::collection::vec(operation(), 0..10)) {
        prop_assert_eq!(bundle_hash(&ops), bundle_hash(&ops.clone()));
    }
}
