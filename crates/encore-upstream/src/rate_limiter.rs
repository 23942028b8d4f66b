// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use encore_config::RateLimitConfig;
use encore_retry::{retry_with_hint, RetryPolicy};
use tokio::sync::oneshot;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, trace, warn};

use crate::error::{Result, UpstreamError};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Quotas, queue bounds and 429 backoff for one upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_day: u32,
    pub max_queue: usize,
    pub queue_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RateLimitPolicy {
    /// A policy with the given per-second quota and generous defaults elsewhere.
    pub fn per_second(per_second: u32) -> Self {
        Self {
            per_second,
            ..Self::from(&RateLimitConfig::default())
        }
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            per_second: config.per_second,
            per_minute: config.per_minute,
            per_day: config.per_day,
            max_queue: config.max_queue,
            queue_timeout: Duration::from_secs(config.queue_timeout_secs),
            retry: RetryPolicy::exponential(
                config.max_retries + 1,
                Duration::from_millis(config.base_delay_ms),
            )
            .with_multiplier(config.backoff_multiplier)
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_jitter(Duration::from_millis(config.jitter_ms)),
        }
    }
}

/// Sliding log of grants inside one quota window.
#[derive(Debug)]
struct Window {
    span: Duration,
    ceiling: u32,
    grants: VecDeque<Instant>,
}

impl Window {
    fn new(span: Duration, ceiling: u32) -> Self {
        Self {
            span,
            ceiling,
            grants: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.grants.front() {
            if *oldest + self.span <= now {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until one more grant fits, or `None` if it fits now. A zero ceiling
    /// disables the window.
    fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.ceiling == 0 || self.grants.len() < self.ceiling as usize {
            return None;
        }
        self.grants
            .front()
            .map(|oldest| (*oldest + self.span).saturating_duration_since(now))
    }

    fn record(&mut self, now: Instant) {
        if self.ceiling > 0 {
            self.grants.push_back(now);
        }
    }
}

struct Waiter {
    enqueued_at: Instant,
    grant: oneshot::Sender<Result<()>>,
}

struct LimiterState {
    queue: VecDeque<Waiter>,
    windows: [Window; 3],
    draining: bool,
}

struct Inner {
    upstream: String,
    policy: RateLimitPolicy,
    state: Mutex<LimiterState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(target: "rate_limiter", upstream = %self.upstream, "limiter state poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Per-upstream FIFO request scheduler enforcing second, minute and day quotas.
///
/// Callers wait in a bounded queue; a single drain task hands out grants in
/// arrival order once every window has room. Entries older than the queue
/// timeout are evicted with [`UpstreamError::QueueTimeout`], and enqueueing on
/// a full queue fails fast with [`UpstreamError::QueueFull`].
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("upstream", &self.inner.upstream)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(upstream: impl Into<String>, policy: RateLimitPolicy) -> Self {
        let windows = [
            Window::new(SECOND, policy.per_second),
            Window::new(MINUTE, policy.per_minute),
            Window::new(DAY, policy.per_day),
        ];
        Self {
            inner: Arc::new(Inner {
                upstream: upstream.into(),
                policy,
                state: Mutex::new(LimiterState {
                    queue: VecDeque::new(),
                    windows,
                    draining: false,
                }),
            }),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.inner.upstream
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Wait for a slot in every quota window.
    pub async fn acquire(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.lock();
            if state.queue.len() >= self.inner.policy.max_queue {
                warn!(target: "rate_limiter", upstream = %self.inner.upstream, "queue full, rejecting request");
                return Err(UpstreamError::QueueFull {
                    upstream: self.inner.upstream.clone(),
                    capacity: self.inner.policy.max_queue,
                });
            }
            state.queue.push_back(Waiter {
                enqueued_at: Instant::now(),
                grant: tx,
            });
            if !state.draining {
                state.draining = true;
                tokio::spawn(drain(self.inner.clone()));
            }
        }

        rx.await.unwrap_or_else(|_| {
            Err(UpstreamError::Unavailable {
                upstream: self.inner.upstream.clone(),
                message: "rate limiter dropped the request".to_string(),
            })
        })
    }

    /// Run `operation` under the quota, re-queueing it whenever the upstream
    /// answers 429. The pause before re-queueing is the policy backoff or the
    /// upstream's `Retry-After`, whichever is longer.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = retry_with_hint(
            &self.inner.upstream,
            &self.inner.policy.retry,
            |_| {
                let request = operation();
                async move {
                    self.acquire().await?;
                    request.await
                }
            },
            |err| matches!(err, UpstreamError::RateLimited { .. }),
            |err| match err {
                UpstreamError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            },
        )
        .await;

        match outcome.result {
            Err(UpstreamError::RateLimited { upstream, .. }) => {
                warn!(target: "rate_limiter", %upstream, attempts = outcome.attempts, "giving up after repeated 429s");
                Err(UpstreamError::RateLimitExceeded {
                    upstream,
                    attempts: outcome.attempts,
                })
            }
            other => other,
        }
    }
}

/// Hand out grants until the queue is empty. Only one drain task runs per
/// limiter; `draining` is cleared under the lock right before exiting.
async fn drain(inner: Arc<Inner>) {
    loop {
        let pause = {
            let mut state = inner.lock();
            let now = Instant::now();
            evict_stale(&inner, &mut state, now);

            if state.queue.is_empty() {
                state.draining = false;
                return;
            }

            for window in state.windows.iter_mut() {
                window.prune(now);
            }
            let wait = state
                .windows
                .iter()
                .filter_map(|window| window.wait_time(now))
                .max();

            match wait {
                None => {
                    if let Some(waiter) = state.queue.pop_front() {
                        for window in state.windows.iter_mut() {
                            window.record(now);
                        }
                        trace!(target: "rate_limiter", upstream = %inner.upstream, "grant");
                        let _ = waiter.grant.send(Ok(()));
                    }
                    continue;
                }
                Some(wait) => {
                    // Wake early if the head of the queue times out first.
                    let head_deadline = state
                        .queue
                        .front()
                        .map(|waiter| {
                            (waiter.enqueued_at + inner.policy.queue_timeout)
                                .saturating_duration_since(now)
                        })
                        .unwrap_or(wait);
                    wait.min(head_deadline).max(Duration::from_millis(1))
                }
            }
        };

        debug!(target: "rate_limiter", upstream = %inner.upstream, wait_ms = pause.as_millis() as u64, "quota reached, waiting");
        sleep(pause).await;
    }
}

fn evict_stale(inner: &Inner, state: &mut LimiterState, now: Instant) {
    let timeout = inner.policy.queue_timeout;
    let mut kept = VecDeque::with_capacity(state.queue.len());

    while let Some(waiter) = state.queue.pop_front() {
        if waiter.grant.is_closed() {
            continue;
        }
        let waited = now.saturating_duration_since(waiter.enqueued_at);
        if waited >= timeout {
            warn!(target: "rate_limiter", upstream = %inner.upstream, waited_ms = waited.as_millis() as u64, "evicting stale request");
            let _ = waiter.grant.send(Err(UpstreamError::QueueTimeout {
                upstream: inner.upstream.clone(),
                waited,
            }));
        } else {
            kept.push_back(waiter);
        }
    }

    state.queue = kept;
}
