//! The executor state machine.
//!
//! [`Executor::step`] performs exactly one transition, so tests can drive the
//! machine state by state. [`Executor::run`] loops it from
//! [`State::Locating`] to a terminal state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stepchain_bundle::{Bundle, Position};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::capability::{
    Clock, CoordinatorView, ExecuteCall, Ledger, PendingHandle, Rejection, SubmissionError,
    TokioClock,
};
use crate::{DEFAULT_GAS_PADDING, DEFAULT_GRACE, RACE_LOSS_MARKERS};

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Added to each operation's resource limit for the enclosing transaction.
    pub gas_padding: u64,

    /// Wait before re-checking a pointer that did not advance by exactly one.
    pub grace: Duration,

    /// Backoff tuning.
    pub backoff: BackoffPolicy,

    /// Lowercase substrings of revert reasons that mean a lost race.
    pub race_loss_markers: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            gas_padding: DEFAULT_GAS_PADDING,
            grace: DEFAULT_GRACE,
            backoff: BackoffPolicy::default(),
            race_loss_markers: RACE_LOSS_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Executor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Read the pointer and find it in the local chain.
    Locating,

    /// Submit the operation at `cursor`.
    Submitting { cursor: usize },

    /// Wait for the submitted operation to finalize.
    AwaitingInclusion {
        cursor: usize,
        pending: PendingHandle,
    },

    /// Re-derive the cursor after an attempt at `cursor`.
    Reconciling {
        cursor: usize,
        /// The grace wait has already been spent.
        rechecked: bool,
        /// Backoff already grew for this attempt.
        backed_off: bool,
    },

    /// The pointer moved past the last operation.
    Completed,

    /// The coordinator is not progressing this bundle.
    NotActive,

    /// Unrecoverable submission failure.
    Aborted(String),
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::NotActive | Self::Aborted(_))
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "cause", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    NotActive,
    Aborted(String),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub outcome: Outcome,

    /// Last cursor derived from the pointer; the bundle length when completed.
    pub cursor: usize,

    /// Cursor of every operation handed to the ledger, in order.
    pub submissions: Vec<usize>,

    /// Calls to `execute`, including ones that failed to dispatch.
    pub attempts: u32,
}

/// Hard failures of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    #[error("execution cancelled at operation #{cursor}")]
    Cancelled { cursor: usize },
}

/// Drives one bundle against one coordinator.
pub struct Executor<'a> {
    bundle: &'a Bundle,
    coordinator: &'a dyn CoordinatorView,
    ledger: &'a dyn Ledger,
    clock: Arc<dyn Clock>,
    config: ExecutorConfig,
    backoff: Backoff,
    cancel: watch::Receiver<bool>,
    cursor: usize,
    submissions: Vec<usize>,
    attempts: u32,
}

impl<'a> Executor<'a> {
    /// Create an executor. Setting `cancel` to `true` stops it at the next
    /// suspension point.
    pub fn new(
        bundle: &'a Bundle,
        coordinator: &'a dyn CoordinatorView,
        ledger: &'a dyn Ledger,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let config = ExecutorConfig::default();
        Self {
            bundle,
            coordinator,
            ledger,
            clock: Arc::new(TokioClock),
            backoff: Backoff::new(config.backoff.clone()),
            config,
            cancel,
            cursor: 0,
            submissions: Vec::new(),
            attempts: 0,
        }
    }

    /// Replace the configuration. Resets the backoff to the new policy.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.backoff = Backoff::new(config.backoff.clone());
        self.config = config;
        self
    }

    /// Use a specific backoff, e.g. a seeded one.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Run from [`State::Locating`] to a terminal state.
    pub async fn run(mut self) -> Result<Execution, ExecuteError> {
        info!(
            bundle = %self.bundle.hash(),
            operations = self.bundle.len(),
            "Starting bundle execution"
        );

        let mut state = State::Locating;
        let outcome = loop {
            state = match state {
                State::Completed => break Outcome::Completed,
                State::NotActive => break Outcome::NotActive,
                State::Aborted(cause) => break Outcome::Aborted(cause),
                active => self.step(active).await?,
            };
        };

        info!(
            outcome = ?outcome,
            cursor = self.cursor,
            attempts = self.attempts,
            "Bundle execution finished"
        );

        Ok(Execution {
            outcome,
            cursor: self.cursor,
            submissions: self.submissions,
            attempts: self.attempts,
        })
    }

    /// Perform one transition.
    pub async fn step(&mut self, state: State) -> Result<State, ExecuteError> {
        if *self.cancel.borrow() {
            return Err(self.cancelled());
        }

        match state {
            State::Locating => self.locate().await,
            State::Submitting { cursor } => self.submit(cursor).await,
            State::AwaitingInclusion { cursor, pending } => {
                self.await_inclusion(cursor, pending).await
            }
            State::Reconciling {
                cursor,
                rechecked,
                backed_off,
            } => self.reconcile(cursor, rechecked, backed_off).await,
            terminal => Ok(terminal),
        }
    }

    async fn locate(&mut self) -> Result<State, ExecuteError> {
        let Some(position) = self.read_position().await? else {
            self.pause().await?;
            return Ok(State::Locating);
        };

        match position {
            Position::Next(cursor) => {
                self.cursor = cursor;
                info!(cursor, "Located bundle position");
                Ok(State::Submitting { cursor })
            }
            Position::Inactive => {
                info!("Coordinator has no active bundle");
                Ok(State::NotActive)
            }
            Position::Foreign => {
                info!("Coordinator is progressing a different bundle");
                Ok(State::NotActive)
            }
        }
    }

    async fn submit(&mut self, cursor: usize) -> Result<State, ExecuteError> {
        let delay = self.backoff.delay();
        if !delay.is_zero() {
            info!(cursor, delay_ms = delay.as_millis() as u64, "Backing off");
            self.sleep(delay).await?;
        }

        let (Some(operation), Some(expected)) =
            (self.bundle.operation(cursor), self.bundle.fingerprint(cursor))
        else {
            return Ok(State::Reconciling {
                cursor,
                rechecked: false,
                backed_off: false,
            });
        };

        let call = ExecuteCall::new(expected, operation, self.config.gas_padding);
        info!(
            cursor,
            operation = cursor + 1,
            is_create = call.is_create,
            gas = call.padded_limit,
            "Submitting operation"
        );

        self.attempts += 1;
        let coordinator = self.coordinator;
        match self.guard(coordinator.execute(&call)).await? {
            Ok(pending) => {
                self.submissions.push(cursor);
                debug!(cursor, tx = %pending, "Operation submitted");
                Ok(State::AwaitingInclusion { cursor, pending })
            }
            Err(SubmissionError::Dispatch(cause)) => {
                let delay = self.backoff.grow();
                warn!(
                    cursor,
                    cause = %cause,
                    delay_ms = delay.as_millis() as u64,
                    "Dispatch failed, retrying"
                );
                Ok(State::Submitting { cursor })
            }
            Err(SubmissionError::Rejected(rejection)) => Ok(self.rejected(cursor, rejection)),
            Err(SubmissionError::Fatal(cause)) => {
                warn!(cursor, cause = %cause, "Submission cannot succeed, aborting");
                Ok(State::Aborted(cause))
            }
        }
    }

    async fn await_inclusion(
        &mut self,
        cursor: usize,
        pending: PendingHandle,
    ) -> Result<State, ExecuteError> {
        let ledger = self.ledger;
        match self.guard(ledger.await_finality(&pending)).await? {
            Ok(receipt) => {
                info!(
                    cursor,
                    tx = %receipt.tx_hash,
                    block = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "Operation finalized"
                );
                Ok(State::Reconciling {
                    cursor,
                    rechecked: false,
                    backed_off: false,
                })
            }
            Err(rejection) => Ok(self.rejected(cursor, rejection)),
        }
    }

    fn rejected(&mut self, cursor: usize, rejection: Rejection) -> State {
        if rejection.is_race_loss(&self.config.race_loss_markers) {
            info!(cursor, reason = %rejection, "Operation already executed by another agent");
            return State::Reconciling {
                cursor,
                rechecked: false,
                backed_off: false,
            };
        }

        let delay = self.backoff.grow();
        warn!(
            cursor,
            cause = %rejection,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, reconciling before retry"
        );
        State::Reconciling {
            cursor,
            rechecked: false,
            backed_off: true,
        }
    }

    async fn reconcile(
        &mut self,
        cursor: usize,
        rechecked: bool,
        backed_off: bool,
    ) -> Result<State, ExecuteError> {
        let Some(position) = self.read_position().await? else {
            self.pause().await?;
            return Ok(State::Reconciling {
                cursor,
                rechecked,
                backed_off,
            });
        };

        let len = self.bundle.len();
        let expected_progress = match position {
            Position::Next(next) => next == cursor + 1,
            Position::Inactive => cursor + 1 >= len,
            Position::Foreign => false,
        };

        if expected_progress {
            self.backoff.reset();
            return Ok(self.advance(position, cursor));
        }

        if !rechecked {
            debug!(
                cursor,
                position = ?position,
                grace_ms = self.config.grace.as_millis() as u64,
                "Pointer did not advance by one, waiting before re-check"
            );
            let grace = self.config.grace;
            self.sleep(grace).await?;
            return Ok(State::Reconciling {
                cursor,
                rechecked: true,
                backed_off,
            });
        }

        match position {
            Position::Next(next) if next == cursor => {
                if !backed_off {
                    let delay = self.backoff.grow();
                    warn!(
                        cursor,
                        delay_ms = delay.as_millis() as u64,
                        "Pointer stalled, retrying operation"
                    );
                }
            }
            Position::Next(next) => {
                info!(from = cursor, to = next, "Pointer moved by other agents");
                self.backoff.reset();
            }
            Position::Inactive => {
                info!(cursor, "Coordinator finished the bundle");
                self.backoff.reset();
            }
            Position::Foreign => {
                warn!(cursor, "Pointer left this bundle");
            }
        }

        Ok(self.advance(position, cursor))
    }

    fn advance(&mut self, position: Position, cursor: usize) -> State {
        match position {
            Position::Next(next) => {
                self.cursor = next;
                State::Submitting { cursor: next }
            }
            Position::Inactive => {
                self.cursor = self.bundle.len();
                State::Completed
            }
            Position::Foreign => {
                self.cursor = cursor;
                State::NotActive
            }
        }
    }

    /// Reads the pointer. `None` when the coordinator could not be read; the
    /// backoff has grown by then.
    async fn read_position(&mut self) -> Result<Option<Position>, ExecuteError> {
        let coordinator = self.coordinator;
        match self.guard(coordinator.current_expected_fingerprint()).await? {
            Ok(pointer) => {
                let position = self.bundle.position_of(&pointer);
                debug!(pointer = %pointer, position = ?position, "Read coordinator pointer");
                Ok(Some(position))
            }
            Err(e) => {
                let delay = self.backoff.grow();
                warn!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to read coordinator pointer, retrying"
                );
                Ok(None)
            }
        }
    }

    async fn pause(&mut self) -> Result<(), ExecuteError> {
        let delay = self.backoff.delay();
        self.sleep(delay).await
    }

    async fn sleep(&mut self, duration: Duration) -> Result<(), ExecuteError> {
        let clock = Arc::clone(&self.clock);
        self.guard(clock.sleep(duration)).await
    }

    /// Runs `fut` unless cancellation arrives first.
    async fn guard<T>(&mut self, fut: impl Future<Output = T>) -> Result<T, ExecuteError> {
        let cancel = &mut self.cancel;
        if *cancel.borrow_and_update() {
            return Err(ExecuteError::Cancelled {
                cursor: self.cursor,
            });
        }

        tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(ExecuteError::Cancelled { cursor: self.cursor }),
            value = fut => Ok(value),
        }
    }

    fn cancelled(&self) -> ExecuteError {
        ExecuteError::Cancelled {
            cursor: self.cursor,
        }
    }
}

/// Resolves once the flag is set. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
