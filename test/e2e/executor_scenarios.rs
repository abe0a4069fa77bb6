//! Executor scenarios against a scripted coordinator.
//!
//! Every scenario runs without real time or networking: the coordinator is a
//! [`FakeCoordinator`] and sleeps go to a [`RecordingClock`].
//!
//! ## Running
//!
//! ```bash
//! cargo test -p stepchain-e2e --test executor_scenarios
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;
use stepchain_abi::{Address, B256};
use stepchain_bundle::{Bundle, RawOperation};
use stepchain_reconcile::{
    Backoff, BackoffPolicy, Clock, ExecuteError, Execution, Executor, ExecutorConfig, Outcome,
};
use stepchain_testing::{FakeCoordinator, RecordingClock, Step};
use tokio::sync::watch;

const GRACE: Duration = Duration::from_millis(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bundle(len: usize) -> Bundle {
    let operations = (0..len)
        .map(|i| {
            if i == 0 {
                RawOperation::create(vec![0x60, 0x80, 0x60, 0x40], 500_000)
            } else {
                RawOperation::call(Address::new([i as u8; 20]), vec![i as u8; 4], 50_000)
            }
        })
        .collect();
    Bundle::new(operations)
}

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        floor: Duration::from_millis(100),
        jitter_max: Duration::from_millis(50),
        cap: Duration::from_secs(600),
    }
}

fn config() -> ExecutorConfig {
    ExecutorConfig {
        grace: GRACE,
        backoff: policy(),
        ..ExecutorConfig::default()
    }
}

async fn execute(
    bundle: &Bundle,
    coordinator: &FakeCoordinator,
    clock: &Arc<RecordingClock>,
    cancel: watch::Receiver<bool>,
) -> Result<Execution, ExecuteError> {
    init_tracing();
    Executor::new(bundle, coordinator, coordinator, cancel)
        .with_config(config())
        .with_backoff(Backoff::seeded(policy(), 42))
        .with_clock(clock.clone())
        .run()
        .await
}

/// A receiver whose sender is gone: never cancels.
fn never_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// A clock whose sleeps never finish.
struct StalledClock;

#[async_trait]
impl Clock for StalledClock {
    async fn sleep(&self, _: Duration) {
        pending::<()>().await;
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[tokio::test]
async fn test_submits_the_operation_the_pointer_names(#[case] start: usize) {
    let bundle = bundle(3);
    let coordinator = FakeCoordinator::new(&bundle).starting_at(start);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    let expected: Vec<usize> = (start..3).collect();
    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, expected);
    assert_eq!(
        coordinator.submitted_indices(),
        expected.iter().map(|i| Some(*i)).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_pointer_jump_skips_operations_landed_elsewhere() {
    let bundle = bundle(5);
    let coordinator = FakeCoordinator::new(&bundle)
        .starting_at(1)
        .script([Step::AcceptThenOthers { extra: 1 }]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![1, 3, 4]);
    assert_eq!(execution.cursor, 5);
    assert_eq!(clock.sleeps(), vec![GRACE]);
}

#[tokio::test]
async fn test_no_active_bundle_submits_nothing() {
    let bundle = bundle(3);
    let coordinator = FakeCoordinator::new(&bundle).inactive();
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::NotActive);
    assert!(execution.submissions.is_empty());
    assert!(coordinator.executions().is_empty());
    assert_eq!(coordinator.reads(), 1);
}

#[tokio::test]
async fn test_foreign_pointer_is_not_active() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle).foreign(B256::new([0xab; 32]));
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::NotActive);
    assert_eq!(execution.attempts, 0);
}

#[tokio::test]
async fn test_race_lost_on_first_operation_still_completes() {
    let bundle = bundle(3);
    let coordinator = FakeCoordinator::new(&bundle).script([Step::RaceLost { advance: 1 }]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.cursor, 3);
    assert_eq!(execution.submissions, vec![0, 1, 2]);
    assert!(clock.sleeps().is_empty(), "race loss must not back off");
    assert_eq!(coordinator.pointer(), B256::ZERO);
}

#[tokio::test]
async fn test_race_lost_on_last_operation_completes() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle)
        .script([Step::Accept, Step::RaceLost { advance: 1 }]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.cursor, 2);
}

#[tokio::test]
async fn test_stalled_pointer_backs_off_until_cancelled() {
    let bundle = bundle(2);
    let (tx, rx) = watch::channel(false);
    let coordinator = FakeCoordinator::new(&bundle)
        .otherwise(Step::Revert("out of gas".to_string()))
        .cancel_after(5, tx);
    let clock = Arc::new(RecordingClock::new());

    let result = execute(&bundle, &coordinator, &clock, rx).await;

    assert_eq!(result, Err(ExecuteError::Cancelled { cursor: 0 }));
    assert_eq!(coordinator.submitted_indices(), vec![Some(0); 5]);

    let backoffs = clock.sleeps_except(GRACE);
    assert_eq!(backoffs.len(), 4, "one backoff before each resubmission");
    for pair in backoffs.windows(2) {
        assert!(pair[1] > pair[0], "backoff must grow: {backoffs:?}");
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_a_wait() {
    let bundle = bundle(2);
    let (tx, rx) = watch::channel(false);
    let coordinator =
        FakeCoordinator::new(&bundle).otherwise(Step::Revert("out of gas".to_string()));

    let executor = Executor::new(&bundle, &coordinator, &coordinator, rx)
        .with_config(config())
        .with_clock(Arc::new(StalledClock));

    let (result, ()) = tokio::join!(executor.run(), async {
        tokio::task::yield_now().await;
        let _ = tx.send(true);
    });

    assert_eq!(result, Err(ExecuteError::Cancelled { cursor: 0 }));
    assert!(coordinator.executions().len() <= 1);
}

#[tokio::test]
async fn test_lagging_pointer_is_rechecked_after_grace() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle).script([Step::AcceptLagging { reads: 1 }]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![0, 1]);
    assert_eq!(clock.sleeps(), vec![GRACE]);
}

#[tokio::test]
async fn test_dispatch_failures_retry_the_same_operation() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle).script([
        Step::DispatchFailure("connection reset".to_string()),
        Step::DispatchFailure("connection reset".to_string()),
    ]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.attempts, 4);
    assert_eq!(execution.submissions, vec![0, 1]);

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 2);
    assert!(sleeps[1] > sleeps[0]);
}

#[tokio::test]
async fn test_timeout_reconciles_then_resubmits() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle).script([Step::Timeout]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![0, 0, 1]);
    assert_eq!(clock.sleeps_except(GRACE).len(), 1);
}

#[tokio::test]
async fn test_refused_submission_is_handled_like_a_revert() {
    let bundle = bundle(2);
    let coordinator =
        FakeCoordinator::new(&bundle).script([Step::RejectOnSubmit("nonce too low".to_string())]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.attempts, 3);
    assert_eq!(execution.submissions, vec![0, 1]);
}

#[tokio::test]
async fn test_fatal_submission_aborts() {
    let bundle = bundle(2);
    let coordinator =
        FakeCoordinator::new(&bundle).script([Step::Fatal("unknown account".to_string())]);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Aborted("unknown account".to_string()));
    assert_eq!(execution.attempts, 1);
    assert!(execution.submissions.is_empty());
}

#[tokio::test]
async fn test_unreadable_coordinator_is_retried() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle).failing_reads(2);
    let clock = Arc::new(RecordingClock::new());

    let execution = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(execution.outcome, Outcome::Completed);
    assert_eq!(execution.submissions, vec![0, 1]);
    assert!(!clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_restarted_executor_finds_the_bundle_finished() {
    let bundle = bundle(3);
    let coordinator = FakeCoordinator::new(&bundle);
    let clock = Arc::new(RecordingClock::new());

    let first = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();
    let second = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    assert_eq!(first.outcome, Outcome::Completed);
    assert_eq!(second.outcome, Outcome::NotActive);
    assert_eq!(second.attempts, 0);
    assert_eq!(coordinator.executions().len(), 3);
}

#[tokio::test]
async fn test_resumes_from_the_pointer_after_a_crash() {
    let bundle = bundle(4);
    let (tx, rx) = watch::channel(false);
    let coordinator = FakeCoordinator::new(&bundle).cancel_after(2, tx);
    let clock = Arc::new(RecordingClock::new());

    let interrupted = execute(&bundle, &coordinator, &clock, rx).await;
    assert_eq!(interrupted, Err(ExecuteError::Cancelled { cursor: 1 }));

    let resumed = execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();
    assert_eq!(resumed.outcome, Outcome::Completed);
    assert_eq!(resumed.submissions, vec![2, 3]);
}

#[tokio::test]
async fn test_padded_limit_is_sent_with_each_operation() {
    let bundle = bundle(2);
    let coordinator = FakeCoordinator::new(&bundle);
    let clock = Arc::new(RecordingClock::new());

    execute(&bundle, &coordinator, &clock, never_cancelled())
        .await
        .unwrap();

    let calls = coordinator.executions();
    assert!(calls[0].is_create);
    assert_eq!(calls[0].target, Address::ZERO);
    assert_eq!(calls[0].padded_limit, 600_000);
    assert_eq!(calls[1].padded_limit, 150_000);
}

