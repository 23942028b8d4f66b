// SPDX-License-Identifier: GPL-3.0-or-later

//! Retry-with-backoff combinator shared by the upstream rate limiters and the
//! job runner.
//!
//! Delay before retry `n` (0-based) is `min(base * multiplier^n + jitter, max_delay)`,
//! where jitter is drawn uniformly from `[0, policy.jitter]`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Parameters for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total executions allowed, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff. Zero disables jitter.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Pure exponential doubling with no jitter and no practical cap.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(24 * 60 * 60),
            jitter: Duration::ZERO,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before retry `retry` (0-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.capped(self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32))
    }

    fn jittered_delay_for(&self, retry: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            0.0
        } else {
            let max_ms = self.jitter.as_millis() as u64;
            rand::thread_rng().gen_range(0..=max_ms) as f64 / 1_000.0
        };
        self.capped(self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32) + jitter)
    }

    fn capped(&self, secs: f64) -> Duration {
        if !secs.is_finite() || secs < 0.0 || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Final result of a retried operation together with how often it ran.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `operation` until it succeeds, returns a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// The operation receives the 1-based attempt number. The last error is
/// returned unchanged when retries are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    label: &str,
    policy: &RetryPolicy,
    operation: F,
    is_retryable: P,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    retry_with_hint(label, policy, operation, is_retryable, |_| None).await
}

/// Like [`retry_with_backoff`], but `min_delay` may name a wait the failed
/// attempt asked for (a `Retry-After` header, say). The pause before the
/// next attempt is the larger of that and the policy's backoff.
pub async fn retry_with_hint<T, E, F, Fut, P, H>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
    min_delay: H,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    H: Fn(&E) -> Option<Duration>,
    E: Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(target: "retry", operation = label, attempt, "succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) => {
                if attempt >= max_attempts || !is_retryable(&err) {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }

                let backoff = policy.jittered_delay_for(attempt - 1);
                let delay = min_delay(&err).map_or(backoff, |floor| floor.max(backoff));
                warn!(
                    target: "retry",
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(60), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100))
            .with_jitter(Duration::from_millis(50));

        for _ in 0..100 {
            let delay = policy.jittered_delay_for(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
        let start = Instant::now();

        let outcome: RetryOutcome<(), String> = retry_with_backoff(
            "always-fails",
            &policy,
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("boom".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
        assert_eq!(outcome.result.unwrap_err(), "boom");
        // 10ms + 20ms of backoff between the three attempts
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));

        let outcome: RetryOutcome<(), String> = retry_with_backoff(
            "fatal",
            &policy,
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
            |err| err != "fatal",
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(5));

        let outcome: RetryOutcome<u32, String> = retry_with_backoff(
            "flaky",
            &policy,
            |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[derive(Debug)]
    struct Throttled(Duration);

    impl Display for Throttled {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "throttled for {:?}", self.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requested_delay_wins_over_shorter_backoff() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
        let start = Instant::now();

        let outcome: RetryOutcome<u32, Throttled> = retry_with_hint(
            "throttled",
            &policy,
            |attempt| async move {
                match attempt {
                    1 => Err(Throttled(Duration::from_secs(2))),
                    2 => Err(Throttled(Duration::from_millis(50))),
                    _ => Ok(attempt),
                }
            },
            |_| true,
            |err| Some(err.0),
        )
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        // 2s requested, then the 200ms backoff beats the 50ms request
        assert_eq!(start.elapsed(), Duration::from_millis(2_200));
    }
}
