//! Retry policy shared by every bootstrap stage.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Delay schedule between attempts: `initial_ms`, multiplied after every
/// failure and capped at `cap_ms`, for at most `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub multiplier: f64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn fixed(delay_ms: u64, max_attempts: u32) -> Self {
        BackoffPolicy {
            initial_ms: delay_ms,
            multiplier: 1.0,
            cap_ms: delay_ms,
            max_attempts,
        }
    }

    pub const fn exponential(initial_ms: u64, multiplier: f64, cap_ms: u64, max_attempts: u32) -> Self {
        BackoffPolicy {
            initial_ms,
            multiplier,
            cap_ms,
            max_attempts,
        }
    }

    /// Waits between consecutive attempts. Yields `max_attempts - 1` values.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        let mut current = policy.initial_ms.min(policy.cap_ms);
        (1..policy.max_attempts).map(move |_| {
            let delay = current;
            // truncated to whole milliseconds
            current = ((current as f64 * policy.multiplier) as u64).min(policy.cap_ms);
            Duration::from_millis(delay)
        })
    }

    pub fn attempts(&self, label: &'static str) -> Attempts {
        Attempts {
            label,
            max_attempts: self.max_attempts,
            attempt: 0,
            delays: Box::new(self.delays()),
        }
    }
}

/// Attempt counter driven with `while let Some(n) = attempts.next().await`.
/// Sleeps before every attempt but the first and never after the last.
pub struct Attempts {
    label: &'static str,
    max_attempts: u32,
    attempt: u32,
    delays: Box<dyn Iterator<Item = Duration> + Send>,
}

impl Attempts {
    pub async fn next(&mut self) -> Option<u32> {
        if self.attempt >= self.max_attempts {
            if self.max_attempts > 0 {
                warn!("{} failed after {} attempts", self.label, self.attempt);
            }
            return None;
        }
        if self.attempt > 0 {
            let delay = self.delays.next().unwrap_or_default();
            warn!(
                "{} attempt {}/{} failed, retrying in {:?}",
                self.label, self.attempt, self.max_attempts, delay
            );
            tokio::time::sleep(delay).await;
        }
        self.attempt += 1;
        debug!("{} attempt {}/{}", self.label, self.attempt, self.max_attempts);
        Some(self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn millis(policy: &BackoffPolicy) -> Vec<u64> {
        policy.delays().map(|d| d.as_millis() as u64).collect()
    }

    #[test]
    fn discovery_schedule_grows_and_caps() {
        let policy = BackoffPolicy::exponential(1000, 1.5, 10_000, 10);
        let delays = millis(&policy);

        assert_eq!(
            delays,
            vec![1000, 1500, 2250, 3375, 5062, 7593, 10_000, 10_000, 10_000]
        );
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn fixed_schedule_repeats() {
        assert_eq!(millis(&BackoffPolicy::fixed(500, 4)), vec![500, 500, 500]);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_sleep_between_but_not_after() {
        let policy = BackoffPolicy::fixed(1000, 3);
        let mut attempts = policy.attempts("test");
        let start = Instant::now();

        let mut seen = Vec::new();
        while let Some(n) = attempts.next().await {
            seen.push((n, start.elapsed().as_millis()));
        }

        assert_eq!(seen, vec![(1, 0), (2, 1000), (3, 2000)]);
        assert_eq!(start.elapsed().as_millis(), 2000);
    }

    #[tokio::test]
    async fn zero_attempts_never_runs() {
        let mut attempts = BackoffPolicy::fixed(10, 0).attempts("test");
        assert_eq!(attempts.next().await, None);
    }
}
