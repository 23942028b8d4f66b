// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobOutput};
use anyhow::{bail, Result};
use encore_application::{
    ArtistSyncService, MaintenanceService, PlayedSetlistImporter, ShowSyncService, SyncStats,
    TrendingService,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

pub const ARTIST_SYNC: &str = "artist-sync";
pub const SHOW_SYNC: &str = "show-sync";
pub const SETLIST_IMPORT: &str = "setlist-import";
pub const TRENDING: &str = "trending";
pub const MAINTENANCE: &str = "maintenance";

/// Turn batch counters into a job output.
///
/// Individual item failures are tolerated, but a batch where every item
/// failed is treated as a failed run so the runner retries it.
fn output_from_stats(job: &str, stats: SyncStats) -> Result<JobOutput> {
    if stats.failed > 0 && stats.failed == stats.processed {
        bail!("{job}: all {} items failed", stats.failed);
    }
    if stats.failed > 0 {
        warn!(target: "jobs", job, failed = stats.failed, processed = stats.processed, "job finished with item failures");
    }
    Ok(JobOutput::new(stats.to_string()).with_records(stats.processed))
}

/// Backfills stub artists and refreshes stale catalog metadata
pub struct ArtistSyncJob {
    service: Arc<ArtistSyncService>,
}

impl ArtistSyncJob {
    pub fn new(service: Arc<ArtistSyncService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Job for ArtistSyncJob {
    fn job_type(&self) -> &'static str {
        "artist_sync"
    }

    fn name(&self) -> String {
        "Artist Sync".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
        info!(target: "jobs", job_id = %ctx.job_id, attempt = ctx.attempt, "executing artist sync job");
        let stats = self.service.run(ctx.execution_time).await?;
        output_from_stats(ARTIST_SYNC, stats)
    }
}

/// Pulls upcoming events for known artists from the ticketing API
pub struct ShowSyncJob {
    service: Arc<ShowSyncService>,
}

impl ShowSyncJob {
    pub fn new(service: Arc<ShowSyncService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Job for ShowSyncJob {
    fn job_type(&self) -> &'static str {
        "show_sync"
    }

    fn name(&self) -> String {
        "Show Sync".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
        info!(target: "jobs", job_id = %ctx.job_id, attempt = ctx.attempt, "executing show sync job");
        let stats = self
            .service
            .sync_all(ctx.execution_time.date_naive())
            .await?;
        output_from_stats(SHOW_SYNC, stats)
    }
}

/// Imports performed setlists for shows that have happened
pub struct SetlistImportJob {
    importer: Arc<PlayedSetlistImporter>,
}

impl SetlistImportJob {
    pub fn new(importer: Arc<PlayedSetlistImporter>) -> Self {
        Self { importer }
    }
}

#[async_trait::async_trait]
impl Job for SetlistImportJob {
    fn job_type(&self) -> &'static str {
        "setlist_import"
    }

    fn name(&self) -> String {
        "Played Setlist Import".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
        info!(target: "jobs", job_id = %ctx.job_id, attempt = ctx.attempt, "executing setlist import job");
        let stats = self
            .importer
            .import_recent(ctx.execution_time.date_naive())
            .await?;
        output_from_stats(SETLIST_IMPORT, stats)
    }
}

pub struct TrendingJob {
    service: Arc<TrendingService>,
}

impl TrendingJob {
    pub fn new(service: Arc<TrendingService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Job for TrendingJob {
    fn job_type(&self) -> &'static str {
        "trending"
    }

    fn name(&self) -> String {
        "Trending Recompute".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
        let updated = self
            .service
            .recompute(ctx.execution_time.date_naive())
            .await?;
        Ok(JobOutput::new(format!("{updated} shows rescored")).with_records(updated))
    }
}

/// Daily upkeep: completes past shows, applies retention and lets SQLite
/// refresh its planner statistics
pub struct MaintenanceJob {
    service: Arc<MaintenanceService>,
    pool: Option<SqlitePool>,
}

impl MaintenanceJob {
    pub fn new(service: Arc<MaintenanceService>, pool: Option<SqlitePool>) -> Self {
        Self { service, pool }
    }
}

#[async_trait::async_trait]
impl Job for MaintenanceJob {
    fn job_type(&self) -> &'static str {
        "maintenance"
    }

    fn name(&self) -> String {
        "Maintenance".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobOutput> {
        info!(target: "jobs", job_id = %ctx.job_id, "executing maintenance job");
        let report = self.service.run(ctx.execution_time).await?;
        if let Some(pool) = &self.pool {
            encore_infrastructure::optimize(pool).await?;
        }
        Ok(JobOutput::new(format!(
            "{} shows completed, {} canceled shows and {} stub artists removed",
            report.shows_completed, report.canceled_deleted, report.stubs_deleted
        ))
        .with_records(report.total()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(succeeded: u64, failed: u64, skipped: u64) -> SyncStats {
        SyncStats {
            processed: succeeded + failed + skipped,
            succeeded,
            failed,
            skipped,
        }
    }

    #[test]
    fn partial_failures_still_succeed() {
        let output = output_from_stats(SHOW_SYNC, stats(7, 3, 0)).unwrap();
        assert_eq!(output.records_processed, Some(10));
        assert_eq!(output.message, "10 processed, 7 succeeded, 3 failed, 0 skipped");
    }

    #[test]
    fn empty_batch_succeeds() {
        let output = output_from_stats(SHOW_SYNC, SyncStats::default()).unwrap();
        assert_eq!(output.records_processed, Some(0));
    }

    #[test]
    fn total_failure_is_a_job_error() {
        let err = output_from_stats(ARTIST_SYNC, stats(0, 4, 0)).unwrap_err();
        assert_eq!(err.to_string(), "artist-sync: all 4 items failed");
    }
}
