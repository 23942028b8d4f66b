// SPDX-License-Identifier: GPL-3.0-or-later

//! Retrying job execution with process-wide run metrics.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use encore_config::SchedulerConfig;
use encore_retry::{retry_with_backoff, RetryPolicy};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::job::{Job, JobContext, JobOutput};

/// Outcome of one `run_with_retry` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_name: String,
    pub success: bool,
    pub message: String,
    /// Wall time of the whole run, backoff included
    pub processing_time_ms: u64,
    pub records_processed: Option<u64>,
    pub error_details: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStats {
    pub runs: u64,
    pub error_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobMetrics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Running mean, updated per run
    pub average_processing_time_ms: f64,
    pub jobs: HashMap<String, JobStats>,
}

impl JobMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 1.0;
        }
        self.successful_runs as f64 / self.total_runs as f64
    }

    fn record(&mut self, result: &JobResult, at: DateTime<Utc>) {
        self.total_runs += 1;
        self.average_processing_time_ms += (result.processing_time_ms as f64
            - self.average_processing_time_ms)
            / self.total_runs as f64;

        let stats = self.jobs.entry(result.job_name.clone()).or_default();
        stats.runs += 1;
        stats.last_run = Some(at);
        if result.success {
            self.successful_runs += 1;
            stats.last_success = Some(at);
        } else {
            self.failed_runs += 1;
            stats.error_count += 1;
            stats.last_error = result.error_details.clone();
        }
    }
}

/// Runs job functions with bounded, purely exponential retries.
pub struct JobRunner {
    policy: RetryPolicy,
    metrics: Mutex<JobMetrics>,
}

impl JobRunner {
    /// `max_attempts` bounds executions per run; retry `n` waits
    /// `base_delay * 2^(n-1)`.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            policy: RetryPolicy::exponential(max_attempts.max(1), base_delay),
            metrics: Mutex::new(JobMetrics::default()),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.job_max_attempts,
            Duration::from_millis(config.job_base_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub async fn run_with_retry<F, Fut>(&self, job_name: &str, job_fn: F) -> JobResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<JobOutput>>,
    {
        self.run_with_policy(job_name, &self.policy, job_fn).await
    }

    /// Run a registered job, once only when it is not retriable.
    pub async fn run_job(&self, job_id: &str, job: &dyn Job) -> JobResult {
        let policy = if job.is_retriable() {
            self.policy.clone()
        } else {
            RetryPolicy {
                max_attempts: 1,
                ..self.policy.clone()
            }
        };
        self.run_with_policy(job_id, &policy, |attempt| {
            job.execute(JobContext::new(job_id, attempt))
        })
        .await
    }

    async fn run_with_policy<F, Fut>(
        &self,
        job_name: &str,
        policy: &RetryPolicy,
        job_fn: F,
    ) -> JobResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<JobOutput>>,
    {
        info!(target: "jobs", job = job_name, max_attempts = policy.max_attempts, "starting job");
        let started = Instant::now();
        let outcome = retry_with_backoff(job_name, policy, job_fn, |_| true).await;
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let retry_count = outcome.retries();

        let result = match outcome.result {
            Ok(output) => {
                info!(
                    target: "jobs",
                    job = job_name,
                    elapsed_ms = processing_time_ms,
                    retries = retry_count,
                    records = ?output.records_processed,
                    message = %output.message,
                    "job succeeded"
                );
                JobResult {
                    job_name: job_name.to_string(),
                    success: true,
                    message: output.message,
                    processing_time_ms,
                    records_processed: output.records_processed,
                    error_details: None,
                    retry_count,
                }
            }
            Err(err) => {
                error!(
                    target: "jobs",
                    job = job_name,
                    elapsed_ms = processing_time_ms,
                    attempts = outcome.attempts,
                    error = %err,
                    "job failed"
                );
                JobResult {
                    job_name: job_name.to_string(),
                    success: false,
                    message: format!("{job_name} failed after {} attempts", outcome.attempts),
                    processing_time_ms,
                    records_processed: None,
                    error_details: Some(format!("{err:#}")),
                    retry_count,
                }
            }
        };

        self.lock_metrics().record(&result, Utc::now());
        result
    }

    /// Snapshot of the counters accumulated so far
    pub fn metrics(&self) -> JobMetrics {
        self.lock_metrics().clone()
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, JobMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| {
            warn!(target: "jobs", "job metrics mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let runner = JobRunner::new(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result = runner
            .run_with_retry("show-sync", |_| {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call < 3 {
                        Err(anyhow!("ticketing unavailable"))
                    } else {
                        Ok(JobOutput::new("12 processed").with_records(12))
                    }
                }
            })
            .await;

        assert!(result.success);
        assert_eq!(result.retry_count, 2);
        assert_eq!(result.records_processed, Some(12));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(result.processing_time_ms, 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_attempts() {
        let runner = JobRunner::new(3, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let result = runner
            .run_with_retry("artist-sync", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<JobOutput, _>(anyhow!("database locked")) }
            })
            .await;

        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.retry_count, 2);
        assert_eq!(result.error_details.as_deref(), Some("database locked"));
        assert_eq!(result.processing_time_ms, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_track_runs_and_running_average() {
        let runner = JobRunner::new(2, Duration::from_millis(500));

        runner
            .run_with_retry("trending", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(JobOutput::new("ok"))
            })
            .await;
        runner
            .run_with_retry("maintenance", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err::<JobOutput, _>(anyhow!("disk full"))
            })
            .await;

        let metrics = runner.metrics();
        assert_eq!(metrics.total_runs, 2);
        assert_eq!(metrics.successful_runs, 1);
        assert_eq!(metrics.failed_runs, 1);
        assert_eq!(metrics.success_rate(), 0.5);
        // 100ms, then 100 + 500 + 100
        assert_eq!(metrics.average_processing_time_ms, 400.0);

        let maintenance = &metrics.jobs["maintenance"];
        assert_eq!(maintenance.error_count, 1);
        assert_eq!(maintenance.last_error.as_deref(), Some("disk full"));
        assert!(maintenance.last_success.is_none());
        assert!(metrics.jobs["trending"].last_success.is_some());
    }

    struct OneShot {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Job for OneShot {
        fn job_type(&self) -> &'static str {
            "one_shot"
        }

        fn name(&self) -> String {
            "One Shot".to_string()
        }

        async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("attempt {} failed", ctx.attempt))
        }

        fn is_retriable(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_job_runs_once() {
        let runner = JobRunner::new(3, Duration::from_secs(1));
        let job = OneShot {
            calls: AtomicU32::new(0),
        };

        let result = runner.run_job("one-shot", &job).await;

        assert!(!result.success);
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error_details.as_deref(), Some("attempt 1 failed"));
    }
}
