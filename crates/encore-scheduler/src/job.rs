// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// Represents the execution context for one attempt of a job
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub execution_time: DateTime<Utc>,
    /// 1-based attempt number within the current run
    pub attempt: u32,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            job_id: job_id.into(),
            execution_time: Utc::now(),
            attempt,
        }
    }
}

/// What a successful job run reports back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub message: String,
    pub records_processed: Option<u64>,
}

impl JobOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            records_processed: None,
        }
    }

    pub fn with_records(mut self, records: u64) -> Self {
        self.records_processed = Some(records);
        self
    }
}

/// Core trait for all background jobs.
///
/// `execute` returning `Err` is a job-level failure and is retried by the
/// runner; per-item failures belong in the output message.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Unique identifier for this job type
    fn job_type(&self) -> &'static str;

    /// Human-readable job name
    fn name(&self) -> String;

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput>;

    /// Whether a failed run may be attempted again
    fn is_retriable(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("type", &self.job_type())
            .field("name", &self.name())
            .finish()
    }
}
