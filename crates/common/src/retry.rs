use std::time::Duration;

use backon::{Backoff, BackoffBuilder};
use rand::Rng;

/// `delay = base * 2^(attempt-1) + U[0, 1000)ms`, capped at `max_retries`
/// attempts — a "retry with jitter" backoff,
/// expressed as a `backon` backoff so call sites just say `.retry(policy)`.
#[derive(Debug, Clone, Copy)]
pub struct JitteredExponential {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl BackoffBuilder for JitteredExponential {
    type Backoff = JitteredExponentialIter;

    fn build(&self) -> Self::Backoff {
        JitteredExponentialIter {
            base_delay: self.base_delay,
            attempt: 0,
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug)]
pub struct JitteredExponentialIter {
    base_delay: Duration,
    attempt: u32,
    max_retries: u32,
}

impl Iterator for JitteredExponentialIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        self.attempt += 1;
        let exp = self.base_delay.saturating_mul(1u32 << (self.attempt - 1));
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        Some(exp + Duration::from_millis(jitter_ms))
    }
}

impl Backoff for JitteredExponentialIter {}
