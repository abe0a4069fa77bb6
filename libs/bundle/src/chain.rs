//! Bundle hash and per-operation fingerprint chain.
//!
//! Two digests are kept deliberately separate:
//!
//! - The **bundle hash** identifies the whole ordered sequence. Operators
//!   approve it and compare it out of band.
//! - The **chain fingerprint** of operation `i` is
//!   `keccak256(fingerprint(i - 1) ++ encode(op_i))`, with the zero word before
//!   the first operation. The coordinator only ever exposes the fingerprint it
//!   expects next, so executors locate their position by searching the chain.

use serde::Serialize;
use stepchain_abi::{keccak256, SolValue, B256};

use crate::RawOperation;

/// Pointer value meaning the coordinator has no active bundle. Also the
/// predecessor of the first operation in every chain.
pub const NO_ACTIVE_BUNDLE: B256 = B256::ZERO;

/// Chain fingerprint of `operation` given its predecessor's fingerprint.
pub fn fingerprint(previous: &B256, operation: &RawOperation) -> B256 {
    let mut preimage = previous.to_vec();
    preimage.extend(operation.encode());
    keccak256(preimage)
}

/// Identifier of the ordered sequence: `keccak256(abi.encode(operations[]))`.
pub fn bundle_hash(operations: &[RawOperation]) -> B256 {
    let members: Vec<_> = operations.iter().map(RawOperation::members).collect();
    keccak256(members.abi_encode())
}

/// Where a coordinator pointer falls relative to a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The coordinator expects the operation at this index next.
    Next(usize),
    /// The coordinator reports no active bundle.
    Inactive,
    /// The pointer belongs to some other bundle.
    Foreign,
}

/// An ordered operation sequence with its hash and fingerprint chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundle {
    operations: Vec<RawOperation>,
    hash: B256,
    fingerprints: Vec<B256>,
}

impl Bundle {
    pub fn new(operations: Vec<RawOperation>) -> Self {
        let hash = bundle_hash(&operations);

        let mut fingerprints = Vec::with_capacity(operations.len());
        let mut previous = NO_ACTIVE_BUNDLE;
        for operation in &operations {
            previous = fingerprint(&previous, operation);
            fingerprints.push(previous);
        }

        Self {
            operations,
            hash,
            fingerprints,
        }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn operations(&self) -> &[RawOperation] {
        &self.operations
    }

    pub fn operation(&self, index: usize) -> Option<&RawOperation> {
        self.operations.get(index)
    }

    pub fn fingerprints(&self) -> &[B256] {
        &self.fingerprints
    }

    pub fn fingerprint(&self, index: usize) -> Option<B256> {
        self.fingerprints.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Maps a coordinator pointer onto this bundle.
    pub fn position_of(&self, pointer: &B256) -> Position {
        if *pointer == NO_ACTIVE_BUNDLE {
            return Position::Inactive;
        }
        self.fingerprints
            .iter()
            .position(|fp| fp == pointer)
            .map_or(Position::Foreign, Position::Next)
    }

    /// True when `expected` equals this bundle's hash.
    pub fn verify(&self, expected: &B256) -> bool {
        self.hash == *expected
    }
}
