//! Bindings for the coordinator contract.

use alloy_sol_types::{sol, Revert, SolError};

sol! {
    /// Execution interface of the bundle coordinator.
    ///
    /// `nextTransactionHash` is the chain fingerprint of the operation the
    /// coordinator accepts next, or zero when no bundle is active.
    interface ICoordinator {
        function nextTransactionHash() external view returns (bytes32);

        function executeTransaction(
            bytes32 expectedHash,
            bool isCreate,
            address target,
            uint256 gasLimit,
            bytes data
        ) external;

        function approveTransactionBundle(bytes32 bundleHash) external;
    }
}

/// Extracts the message from `Error(string)` revert data.
///
/// Returns `None` for empty data, custom errors and malformed payloads.
pub fn revert_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data).ok().map(|revert| revert.reason)
}
