use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Token bucket of `capacity` tickets refilled one-at-a-time on a fixed
/// interval by an owned background task, rather than an unawaited
/// fire-and-forget continuation — shutdown simply aborts the task, it
/// never leaves a ticket permanently un-returned.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    replenisher: JoinHandle<()>,
}

impl RateLimiter {
    pub fn new(rate_per_minute: u32) -> Self {
        let capacity = rate_per_minute.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(capacity));
        let period = Duration::from_millis(60_000 / capacity as u64);

        let replenish_sem = semaphore.clone();
        let replenisher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if replenish_sem.available_permits() < capacity {
                    replenish_sem.add_permits(1);
                }
            }
        });

        Self {
            semaphore,
            replenisher,
        }
    }

    /// Waits for a ticket and consumes it permanently; the background task
    /// is what puts tickets back, on its own schedule, so a ticket is never
    /// "returned" by the caller — cancelling this future (e.g. on
    /// `tokio::select!` with a cancellation signal) simply drops the
    /// acquire future before a ticket is taken, matching §4.2's "cancellation
    /// releases tickets without penalty".
    pub async fn acquire(&self) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        permit.forget();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.replenisher.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_does_not_block_within_capacity() {
        let limiter = RateLimiter::new(60);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
