use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use stepchain_abi::{B256, U256};
use stepchain_bundle::Bundle;
use stepchain_reconcile::{
    CoordinatorView, ExecuteCall, Ledger, PendingHandle, ReadError, Receipt, Rejection,
    SubmissionError,
};
use tokio::sync::watch;

/// Revert reason the coordinator gives when the submitted fingerprint is stale.
pub const RACE_LOSS_REASON: &str = "TransactionBundleExecutor: there is no active bundle";

/// Scripted reaction to one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Finalize and advance the pointer by one.
    Accept,

    /// Finalize, then other agents execute `extra` more operations.
    AcceptThenOthers { extra: usize },

    /// Finalize, but the new pointer only becomes visible after `reads` reads.
    AcceptLagging { reads: usize },

    /// Another agent lands first and the pointer moves by `advance`; this
    /// submission reverts with [`RACE_LOSS_REASON`].
    RaceLost { advance: usize },

    /// Revert at inclusion with `reason`; pointer unchanged.
    Revert(String),

    /// Node refuses up front with a revert reason.
    RejectOnSubmit(String),

    /// Never finalizes.
    Timeout,

    /// Transaction could not be dispatched.
    DispatchFailure(String),

    /// Submission can never succeed.
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pointer {
    /// Index into the chain; past the end reads as zero.
    At(usize),
    Foreign(B256),
}

struct Inner {
    pointer: Pointer,
    /// Pointer to expose once `reads_left` reaches zero.
    lagging: Option<(usize, Pointer)>,
    script: VecDeque<Step>,
    fallback: Step,
    failing_reads: usize,
    reads: usize,
    executions: Vec<ExecuteCall>,
    approvals: Vec<B256>,
    outcomes: HashMap<B256, Result<(), Rejection>>,
    next_tx: u64,
    cancel: Option<(usize, watch::Sender<bool>)>,
}

/// Coordinator following one bundle's fingerprint chain.
///
/// Also implements [`Ledger`]: finality of each submission is decided when it
/// is submitted.
pub struct FakeCoordinator {
    bundle_hash: B256,
    fingerprints: Vec<B256>,
    inner: Mutex<Inner>,
}

impl FakeCoordinator {
    /// Pointer at the first operation, every submission accepted.
    pub fn new(bundle: &Bundle) -> Self {
        Self {
            bundle_hash: bundle.hash(),
            fingerprints: bundle.fingerprints().to_vec(),
            inner: Mutex::new(Inner {
                pointer: Pointer::At(0),
                lagging: None,
                script: VecDeque::new(),
                fallback: Step::Accept,
                failing_reads: 0,
                reads: 0,
                executions: Vec::new(),
                approvals: Vec::new(),
                outcomes: HashMap::new(),
                next_tx: 1,
                cancel: None,
            }),
        }
    }

    pub fn starting_at(self, index: usize) -> Self {
        self.lock().pointer = Pointer::At(index);
        self
    }

    /// Pointer reads as zero until the bundle is approved.
    pub fn inactive(self) -> Self {
        let past_end = self.fingerprints.len();
        self.lock().pointer = Pointer::At(past_end);
        self
    }

    /// Pointer belongs to some other bundle.
    pub fn foreign(self, pointer: B256) -> Self {
        self.lock().pointer = Pointer::Foreign(pointer);
        self
    }

    /// Reactions to successive submissions.
    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.lock().script.extend(steps);
        self
    }

    /// Reaction once the script is exhausted.
    pub fn otherwise(self, step: Step) -> Self {
        self.lock().fallback = step;
        self
    }

    /// The first `count` pointer reads fail.
    pub fn failing_reads(self, count: usize) -> Self {
        self.lock().failing_reads = count;
        self
    }

    /// Set `cancel` to `true` once `executions` submissions have been made.
    pub fn cancel_after(self, executions: usize, cancel: watch::Sender<bool>) -> Self {
        self.lock().cancel = Some((executions, cancel));
        self
    }

    /// Move the pointer as another agent would.
    pub fn set_position(&self, index: usize) {
        self.lock().pointer = Pointer::At(index);
    }

    /// The pointer as the coordinator currently reports it.
    pub fn pointer(&self) -> B256 {
        let pointer = self.lock().pointer;
        self.value_of(pointer)
    }

    pub fn executions(&self) -> Vec<ExecuteCall> {
        self.lock().executions.clone()
    }

    /// Chain index of each submission, by the fingerprint it claimed.
    pub fn submitted_indices(&self) -> Vec<Option<usize>> {
        self.executions()
            .iter()
            .map(|call| self.fingerprints.iter().position(|fp| *fp == call.expected))
            .collect()
    }

    pub fn approvals(&self) -> Vec<B256> {
        self.lock().approvals.clone()
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn value_of(&self, pointer: Pointer) -> B256 {
        match pointer {
            Pointer::At(index) => self.fingerprints.get(index).copied().unwrap_or(B256::ZERO),
            Pointer::Foreign(value) => value,
        }
    }

    fn pending(inner: &mut Inner, outcome: Result<(), Rejection>) -> PendingHandle {
        let tx_hash = B256::from(U256::from(inner.next_tx).to_be_bytes::<32>());
        inner.next_tx += 1;
        inner.outcomes.insert(tx_hash, outcome);
        PendingHandle { tx_hash }
    }
}

fn advanced(pointer: Pointer, by: usize) -> Pointer {
    match pointer {
        Pointer::At(index) => Pointer::At(index + by),
        foreign => foreign,
    }
}

#[async_trait]
impl CoordinatorView for FakeCoordinator {
    async fn current_expected_fingerprint(&self) -> Result<B256, ReadError> {
        let mut inner = self.lock();
        inner.reads += 1;

        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(ReadError("connection refused".to_string()));
        }

        if let Some((reads_left, pointer)) = inner.lagging {
            if reads_left == 0 {
                inner.pointer = pointer;
                inner.lagging = None;
            } else {
                inner.lagging = Some((reads_left - 1, pointer));
            }
        }

        let pointer = inner.pointer;
        drop(inner);
        Ok(self.value_of(pointer))
    }

    async fn execute(&self, call: &ExecuteCall) -> Result<PendingHandle, SubmissionError> {
        let mut inner = self.lock();
        inner.executions.push(call.clone());

        let count = inner.executions.len();
        if let Some((after, cancel)) = &inner.cancel {
            if count >= *after {
                let _ = cancel.send(true);
            }
        }

        let current = self.value_of(inner.pointer);
        if current != call.expected || current == B256::ZERO {
            return Ok(Self::pending(
                &mut inner,
                Err(Rejection::reverted(RACE_LOSS_REASON)),
            ));
        }

        let step = match inner.script.pop_front() {
            Some(step) => step,
            None => inner.fallback.clone(),
        };

        match step {
            Step::Accept => {
                inner.pointer = advanced(inner.pointer, 1);
                Ok(Self::pending(&mut inner, Ok(())))
            }
            Step::AcceptThenOthers { extra } => {
                inner.pointer = advanced(inner.pointer, 1 + extra);
                Ok(Self::pending(&mut inner, Ok(())))
            }
            Step::AcceptLagging { reads } => {
                let next = advanced(inner.pointer, 1);
                inner.lagging = Some((reads, next));
                Ok(Self::pending(&mut inner, Ok(())))
            }
            Step::RaceLost { advance } => {
                inner.pointer = advanced(inner.pointer, advance);
                Ok(Self::pending(
                    &mut inner,
                    Err(Rejection::reverted(RACE_LOSS_REASON)),
                ))
            }
            Step::Revert(reason) => Ok(Self::pending(&mut inner, Err(Rejection::reverted(reason)))),
            Step::RejectOnSubmit(reason) => {
                Err(SubmissionError::Rejected(Rejection::reverted(reason)))
            }
            Step::Timeout => Ok(Self::pending(
                &mut inner,
                Err(Rejection::Timeout {
                    waited: Duration::from_secs(120),
                }),
            )),
            Step::DispatchFailure(cause) => Err(SubmissionError::Dispatch(cause)),
            Step::Fatal(cause) => Err(SubmissionError::Fatal(cause)),
        }
    }

    async fn approve(&self, bundle_hash: &B256) -> Result<PendingHandle, SubmissionError> {
        let mut inner = self.lock();
        inner.approvals.push(*bundle_hash);

        if *bundle_hash != self.bundle_hash {
            return Err(SubmissionError::Rejected(Rejection::reverted(
                "TransactionBundleExecutor: unknown bundle",
            )));
        }
        inner.pointer = Pointer::At(0);
        Ok(Self::pending(&mut inner, Ok(())))
    }
}

#[async_trait]
impl Ledger for FakeCoordinator {
    async fn await_finality(&self, pending: &PendingHandle) -> Result<Receipt, Rejection> {
        let mut inner = self.lock();
        let outcome = inner
            .outcomes
            .remove(&pending.tx_hash)
            .unwrap_or_else(|| Err(Rejection::Dropped(format!("unknown transaction {pending}"))));
        let block_number = inner.next_tx;
        drop(inner);

        outcome.map(|()| Receipt {
            tx_hash: pending.tx_hash,
            block_number,
            gas_used: 21_000,
            contract_address: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use stepchain_abi::Address;
    use stepchain_bundle::RawOperation;

    use super::*;

    fn bundle() -> Bundle {
        Bundle::new(vec![
            RawOperation::create(vec![0x60, 0x80], 100),
            RawOperation::call(Address::new([1; 20]), vec![1], 200),
            RawOperation::call(Address::new([2; 20]), vec![2], 300),
        ])
    }

    fn call(bundle: &Bundle, index: usize) -> ExecuteCall {
        ExecuteCall::new(
            bundle.fingerprint(index).unwrap(),
            bundle.operation(index).unwrap(),
            0,
        )
    }

    #[tokio::test]
    async fn test_accepts_in_order_and_reads_zero_past_the_end() {
        let bundle = bundle();
        let fake = FakeCoordinator::new(&bundle);

        for index in 0..3 {
            assert_eq!(
                fake.current_expected_fingerprint().await.unwrap(),
                bundle.fingerprint(index).unwrap()
            );
            let pending = fake.execute(&call(&bundle, index)).await.unwrap();
            assert!(fake.await_finality(&pending).await.is_ok());
        }

        assert_eq!(fake.pointer(), B256::ZERO);
        assert_eq!(fake.submitted_indices(), vec![Some(0), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_stale_submission_reverts_as_race_loss() {
        let bundle = bundle();
        let fake = FakeCoordinator::new(&bundle).starting_at(1);

        let pending = fake.execute(&call(&bundle, 0)).await.unwrap();
        let rejection = fake.await_finality(&pending).await.unwrap_err();
        assert_eq!(rejection, Rejection::reverted(RACE_LOSS_REASON));
        assert_eq!(fake.pointer(), bundle.fingerprint(1).unwrap());
    }

    #[tokio::test]
    async fn test_lagging_pointer_appears_after_reads() {
        let bundle = bundle();
        let fake = FakeCoordinator::new(&bundle).script([Step::AcceptLagging { reads: 2 }]);
        fake.execute(&call(&bundle, 0)).await.unwrap();

        let first = bundle.fingerprint(0).unwrap();
        let second = bundle.fingerprint(1).unwrap();
        assert_eq!(fake.current_expected_fingerprint().await.unwrap(), first);
        assert_eq!(fake.current_expected_fingerprint().await.unwrap(), first);
        assert_eq!(fake.current_expected_fingerprint().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_approval_activates_the_bundle() {
        let bundle = bundle();
        let fake = FakeCoordinator::new(&bundle).inactive();
        assert_eq!(fake.pointer(), B256::ZERO);

        assert!(fake.approve(&B256::new([7; 32])).await.is_err());
        fake.approve(&bundle.hash()).await.unwrap();
        assert_eq!(fake.pointer(), bundle.fingerprint(0).unwrap());
        assert_eq!(fake.approvals().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_reads_then_recovers() {
        let bundle = bundle();
        let fake = FakeCoordinator::new(&bundle).failing_reads(1);
        assert!(fake.current_expected_fingerprint().await.is_err());
        assert!(fake.current_expected_fingerprint().await.is_ok());
        assert_eq!(fake.reads(), 2);
    }
}
