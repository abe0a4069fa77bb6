use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use stepchain_reconcile::Clock;

/// Records sleeps instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requested sleeps other than `excluded`, e.g. without grace waits.
    pub fn sleeps_except(&self, excluded: Duration) -> Vec<Duration> {
        self.sleeps()
            .into_iter()
            .filter(|d| *d != excluded)
            .collect()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_without_waiting() {
        let clock = RecordingClock::new();
        clock.sleep(Duration::from_secs(3600)).await;
        clock.sleep(Duration::from_millis(5)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_millis(5)]
        );
        assert_eq!(
            clock.sleeps_except(Duration::from_millis(5)),
            vec![Duration::from_secs(3600)]
        );
        assert_eq!(clock.total(), Duration::from_millis(3_600_005));
    }
}
