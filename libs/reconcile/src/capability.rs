//! Capabilities the executor consumes from the outside world.
//!
//! The ledger is shared mutable state with uncoordinated writers. The executor
//! only sees it through these traits, so tests substitute a scripted fake
//! coordinator and a fake clock.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use stepchain_abi::{Address, B256};
use stepchain_bundle::RawOperation;
use thiserror::Error;

/// Handle to a submitted, not yet finalized ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PendingHandle {
    pub tx_hash: B256,
}

impl fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tx_hash)
    }
}

/// A finalized, successful ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// Address created by the transaction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
}

/// The ledger refused or never finalized a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Execution reverted; `reason` is the coordinator's message when known.
    #[error("reverted: {reason}")]
    Reverted { reason: String },

    /// No finality within the allowed time.
    #[error("not finalized after {waited:?}")]
    Timeout { waited: Duration },

    /// The transaction disappeared from the ledger's view.
    #[error("dropped: {0}")]
    Dropped(String),

    /// The ledger reported the transaction but its receipt could not be read.
    #[error("unreadable receipt: {0}")]
    InvalidReceipt(String),
}

impl Rejection {
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }

    /// True when the reason says another agent already advanced the coordinator.
    pub fn is_race_loss(&self, markers: &[String]) -> bool {
        match self {
            Self::Reverted { reason } => {
                let reason = reason.to_lowercase();
                markers
                    .iter()
                    .any(|marker| reason.contains(&marker.to_lowercase()))
            }
            Self::Timeout { .. } | Self::Dropped(_) | Self::InvalidReceipt(_) => false,
        }
    }
}

/// Failure to hand a transaction to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// Could not dispatch (network, node busy, nonce clash). Retry as-is.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The node refused the transaction up front with a revert.
    #[error("rejected before inclusion: {0}")]
    Rejected(Rejection),

    /// Retrying cannot help (unknown or locked sender account, bad credentials).
    #[error("fatal submission error: {0}")]
    Fatal(String),
}

/// Failure to read coordinator state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("coordinator unavailable: {0}")]
pub struct ReadError(pub String);

/// Arguments of one coordinator `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCall {
    /// Fingerprint the coordinator must currently expect.
    pub expected: B256,
    pub is_create: bool,
    pub target: Address,
    /// Declared resource limit of the operation itself.
    pub resource_limit: u64,
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Limit for the enclosing ledger transaction: declared limit plus padding.
    pub padded_limit: u64,
}

impl ExecuteCall {
    pub fn new(expected: B256, operation: &RawOperation, padding: u64) -> Self {
        Self {
            expected,
            is_create: operation.is_create,
            target: operation.target_or_zero(),
            resource_limit: operation.resource_limit,
            payload: operation.payload.clone(),
            padded_limit: operation.resource_limit.saturating_add(padding),
        }
    }
}

/// Live view of the coordinator.
#[async_trait]
pub trait CoordinatorView: Send + Sync {
    /// Fingerprint of the next accepted operation; zero means no active bundle.
    async fn current_expected_fingerprint(&self) -> Result<B256, ReadError>;

    /// Submit one bundle operation.
    async fn execute(&self, call: &ExecuteCall) -> Result<PendingHandle, SubmissionError>;

    /// Approve a bundle by hash. Irreversible.
    async fn approve(&self, bundle_hash: &B256) -> Result<PendingHandle, SubmissionError>;
}

/// Ledger finality.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn await_finality(&self, pending: &PendingHandle) -> Result<Receipt, Rejection>;
}

/// Source of suspension for backoff and grace waits.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
