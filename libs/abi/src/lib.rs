//! # stepchain-abi
//!
//! Ledger-facing pieces shared by every stepchain crate, built on the alloy
//! primitives and ABI crates.
//!
//! - Re-exports of [`Address`], [`B256`], [`keccak256`] and the dynamic ABI
//!   types, so dependents agree on one set of ledger types
//! - [`ICoordinator`]: bindings for the coordinator contract's execution interface
//! - [`coerce`]: JSON arguments from deployment definitions to [`DynSolValue`]s
//! - [`revert_reason`]: the message inside `Error(string)` revert data

mod coerce;
mod coordinator;
mod error;

pub use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
pub use alloy_json_abi::{Function, JsonAbi, Param};
pub use alloy_primitives::{hex, keccak256, Address, Bytes, B256, I256, U256};
pub use alloy_sol_types::{Revert, SolCall, SolError, SolValue};

pub use coerce::coerce;
pub use coordinator::{revert_reason, ICoordinator};
pub use error::AbiError;
