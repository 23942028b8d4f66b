// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::Job;
use crate::runner::{JobResult, JobRunner};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Job schedule configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run at fixed intervals
    Interval(Duration),
    /// Run once a day at the given UTC clock hour
    DailyAt { hour: u32 },
}

impl Schedule {
    /// Time to wait from `now` until the next run. Interval jobs are driven
    /// by a fixed-period ticker instead, so this is the full period for them.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Interval(every) => *every,
            Schedule::DailyAt { hour } => {
                let at = NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or(NaiveTime::MIN);
                let mut next = now.date_naive().and_time(at).and_utc();
                if next <= now {
                    next = now
                        .date_naive()
                        .checked_add_days(Days::new(1))
                        .map(|day| day.and_time(at).and_utc())
                        .unwrap_or(now);
                }
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

/// Registered job with its schedule
struct RegisteredJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Job registry that owns the scheduled jobs and executes them through a
/// shared [`JobRunner`]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, RegisteredJob>>>,
    runner: Arc<JobRunner>,
    max_concurrent: usize,
    run_on_start: bool,
}

impl JobRegistry {
    pub fn new(runner: Arc<JobRunner>, max_concurrent: usize, run_on_start: bool) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            runner,
            max_concurrent: max_concurrent.max(1),
            run_on_start,
        }
    }

    /// Register a job with its schedule
    pub async fn register(
        &self,
        job_id: impl Into<String>,
        job: impl Job + 'static,
        schedule: Schedule,
    ) {
        let job_id = job_id.into();
        let registered = RegisteredJob {
            job: Arc::new(job) as Arc<dyn Job>,
            schedule,
        };

        let mut jobs = self.jobs.write().await;
        info!(target: "registry", %job_id, job_type = registered.job.job_type(), schedule = ?registered.schedule, "registering job");
        jobs.insert(job_id, registered);
    }

    pub async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Run one job now, outside its schedule
    pub async fn trigger(&self, job_id: &str) -> Result<JobResult> {
        let job = {
            let jobs = self.jobs.read().await;
            jobs.get(job_id)
                .map(|registered| registered.job.clone())
                .ok_or_else(|| anyhow!("unknown job: {job_id}"))?
        };
        info!(target: "registry", %job_id, "triggering job");
        Ok(self.runner.run_job(job_id, job.as_ref()).await)
    }

    /// Start one loop per job. Each loop waits for its schedule, takes a
    /// concurrency permit and runs the job to completion before scheduling
    /// the next run, so a job never overlaps itself.
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(target: "registry", max_concurrent = self.max_concurrent, "starting job registry");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let jobs = self.jobs.read().await;
        let mut handles = Vec::with_capacity(jobs.len());

        for (job_id, registered) in jobs.iter() {
            let job_id = job_id.clone();
            let job = registered.job.clone();
            let schedule = registered.schedule.clone();
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let mut run_now = self.run_on_start;

            handles.push(tokio::spawn(async move {
                // Interval starts stay on a fixed grid; a run that overruns
                // its slot delays the next tick instead of overlapping.
                let mut ticker = match &schedule {
                    Schedule::Interval(every) => {
                        let first = if run_now {
                            Instant::now()
                        } else {
                            Instant::now() + *every
                        };
                        let mut ticker = interval_at(first, *every);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        Some(ticker)
                    }
                    Schedule::DailyAt { .. } => None,
                };

                loop {
                    match ticker.as_mut() {
                        Some(ticker) => {
                            ticker.tick().await;
                        }
                        None if run_now => {}
                        None => {
                            let delay = schedule.delay_until_next(Utc::now());
                            debug!(target: "registry", %job_id, delay_secs = delay.as_secs(), "next run scheduled");
                            tokio::time::sleep(delay).await;
                        }
                    }
                    run_now = false;

                    let Ok(_permit) = semaphore.clone().acquire_owned().await else {
                        warn!(target: "registry", %job_id, "semaphore closed, stopping job loop");
                        break;
                    };
                    let result = runner.run_job(&job_id, job.as_ref()).await;
                    if !result.success {
                        warn!(
                            target: "registry",
                            %job_id,
                            error = result.error_details.as_deref().unwrap_or("unknown"),
                            "scheduled run failed, waiting for next run"
                        );
                    }
                }
            }));
        }

        info!(target: "registry", jobs = jobs.len(), "job registry started");
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobContext, JobOutput};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Job for CountingJob {
        fn job_type(&self) -> &'static str {
            "counting"
        }

        fn name(&self) -> String {
            "Counting".to_string()
        }

        async fn execute(&self, _ctx: JobContext) -> Result<JobOutput> {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(JobOutput::new(format!("run {runs}")).with_records(u64::from(runs)))
        }
    }

    fn registry(run_on_start: bool) -> Arc<JobRegistry> {
        let runner = Arc::new(JobRunner::new(3, Duration::from_millis(10)));
        Arc::new(JobRegistry::new(runner, 2, run_on_start))
    }

    #[test]
    fn daily_schedule_targets_next_clock_hour() {
        let schedule = Schedule::DailyAt { hour: 3 };

        let before = Utc.with_ymd_and_hms(2026, 5, 1, 1, 30, 0).unwrap();
        assert_eq!(schedule.delay_until_next(before), Duration::from_secs(90 * 60));

        let after = Utc.with_ymd_and_hms(2026, 5, 1, 4, 0, 0).unwrap();
        assert_eq!(schedule.delay_until_next(after), Duration::from_secs(23 * 60 * 60));

        let exactly = Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(schedule.delay_until_next(exactly), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn interval_schedule_ignores_clock() {
        let schedule = Schedule::Interval(Duration::from_secs(3600));
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 1, 30, 0).unwrap();
        assert_eq!(schedule.delay_until_next(now), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn trigger_runs_registered_job() {
        let registry = registry(false);
        let runs = Arc::new(AtomicU32::new(0));
        registry
            .register(
                "trending",
                CountingJob { runs: runs.clone() },
                Schedule::Interval(Duration::from_secs(3600)),
            )
            .await;

        let result = registry.trigger("trending").await.unwrap();

        assert!(result.success);
        assert_eq!(result.message, "run 1");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.runner().metrics().total_runs, 1);
        assert!(registry.trigger("nope").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_jobs_run_on_schedule() {
        let registry = registry(false);
        let runs = Arc::new(AtomicU32::new(0));
        registry
            .register(
                "trending",
                CountingJob { runs: runs.clone() },
                Schedule::Interval(Duration::from_secs(60)),
            )
            .await;

        let handles = registry.clone().start().await;
        tokio::time::sleep(Duration::from_secs(130)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_on_start_runs_immediately() {
        let registry = registry(true);
        let runs = Arc::new(AtomicU32::new(0));
        registry
            .register(
                "maintenance",
                CountingJob { runs: runs.clone() },
                Schedule::Interval(Duration::from_secs(60)),
            )
            .await;

        let handles = registry.clone().start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.job_ids().await, vec!["maintenance".to_string()]);
        for handle in handles {
            handle.abort();
        }
    }

    struct SlowJob {
        starts: Arc<std::sync::Mutex<Vec<Instant>>>,
    }

    #[async_trait::async_trait]
    impl Job for SlowJob {
        fn job_type(&self) -> &'static str {
            "slow"
        }

        fn name(&self) -> String {
            "Slow".to_string()
        }

        async fn execute(&self, _ctx: JobContext) -> Result<JobOutput> {
            self.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(JobOutput::new("done"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interval_starts_do_not_drift_with_runtime() {
        let registry = registry(false);
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        registry
            .register(
                "show-sync",
                SlowJob {
                    starts: starts.clone(),
                },
                Schedule::Interval(Duration::from_secs(60)),
            )
            .await;

        let origin = Instant::now();
        let handles = registry.clone().start().await;
        tokio::time::sleep(Duration::from_secs(190)).await;

        let offsets: Vec<u64> = starts
            .lock()
            .unwrap()
            .iter()
            .map(|start| (*start - origin).as_secs())
            .collect();
        assert_eq!(offsets, vec![60, 120, 180]);
        for handle in handles {
            handle.abort();
        }
    }
}
