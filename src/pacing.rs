//! Polite, cancellable delays between upstream requests.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::DelayRange;

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if the wait was cut short by cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

/// Randomized delay drawn from a [`DelayRange`] on every pause.
#[derive(Debug, Clone)]
pub struct Pacer {
    range: DelayRange,
    cancel: CancellationToken,
}

impl Pacer {
    #[must_use]
    pub fn new(range: DelayRange, cancel: CancellationToken) -> Self {
        Self { range, cancel }
    }

    /// Pick the next delay uniformly within the range.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let min = self.range.min.as_millis() as u64;
        let max = self.range.max.as_millis() as u64;
        if max <= min {
            return self.range.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Wait a random delay. Returns `false` if cancelled while waiting.
    pub async fn pause(&self) -> bool {
        let delay = self.next_delay();
        sleep_or_cancel(delay, &self.cancel).await
    }
}
