//! Resumable bundle execution.
//!
//! Drives a [`Bundle`](stepchain_bundle::Bundle) to completion against a
//! coordinator that exposes only the chain fingerprint it expects next. Key
//! concepts:
//!
//! - **Pointer**: the coordinator's expected-next fingerprint, or zero when no
//!   bundle is active. Authoritative, shared with other agents, re-read after
//!   every attempt.
//! - **Cursor**: the local index derived from the pointer. Never incremented
//!   on the assumption that a submission landed.
//! - **Backoff**: one randomized, doubling delay. Reset on confirmed progress.
//!
//! # Invariants
//!
//! - Only the operation whose fingerprint equals the pointer is ever submitted
//! - Ledger failures drive state transitions; they never escape [`Executor::run`]
//! - Cancellation is observed at every suspension point and always reported

mod backoff;
mod capability;
mod executor;

use std::time::Duration;

pub use backoff::{Backoff, BackoffPolicy};
pub use capability::{
    Clock, CoordinatorView, ExecuteCall, Ledger, PendingHandle, ReadError, Receipt, Rejection,
    SubmissionError, TokioClock,
};
pub use executor::{ExecuteError, Execution, Executor, ExecutorConfig, Outcome, State};

/// Added to every operation's declared resource limit.
pub const DEFAULT_GAS_PADDING: u64 = 100_000;

/// Wait before re-checking a pointer that did not move as expected.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Constant term added before each doubling.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_millis(500);

/// Upper bound of the random backoff term.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(5_000);

/// Longest single backoff sleep.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(120);

/// Revert reasons meaning another agent advanced the coordinator first.
pub const RACE_LOSS_MARKERS: &[&str] = &[
    "there is no active bundle",
    "unexpected transaction hash",
    "not the next transaction",
];
