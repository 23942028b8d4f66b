// SPDX-License-Identifier: GPL-3.0-or-later
pub mod job;
pub mod jobs;
pub mod registry;
pub mod runner;

use anyhow::Result;
use encore_application::SyncPipeline;
use encore_config::{AppConfig, SchedulerConfig};
use registry::JobRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::info;

use jobs::{
    ArtistSyncJob, MaintenanceJob, SetlistImportJob, ShowSyncJob, TrendingJob, ARTIST_SYNC,
    MAINTENANCE, SETLIST_IMPORT, SHOW_SYNC, TRENDING,
};

pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
}

impl Scheduler {
    pub fn new(config: &AppConfig) -> Self {
        let config = config.scheduler.clone();
        let runner = Arc::new(JobRunner::from_config(&config));
        let registry = Arc::new(JobRegistry::new(
            runner,
            config.max_concurrent_jobs,
            config.run_on_start,
        ));
        Self { config, registry }
    }

    /// Register all sync jobs with their schedules
    pub async fn register_jobs(&self, pipeline: &SyncPipeline, pool: Option<SqlitePool>) {
        info!(target: "scheduler", "registering background jobs");
        let every = |secs: u64| Schedule::Interval(Duration::from_secs(secs.max(1)));

        self.registry
            .register(
                TRENDING,
                TrendingJob::new(pipeline.trending.clone()),
                every(self.config.trending_interval_secs),
            )
            .await;

        self.registry
            .register(
                SHOW_SYNC,
                ShowSyncJob::new(pipeline.shows.clone()),
                every(self.config.show_sync_interval_secs),
            )
            .await;

        self.registry
            .register(
                ARTIST_SYNC,
                ArtistSyncJob::new(pipeline.artists.clone()),
                every(self.config.artist_sync_interval_secs),
            )
            .await;

        self.registry
            .register(
                SETLIST_IMPORT,
                SetlistImportJob::new(pipeline.played.clone()),
                every(self.config.setlist_import_interval_secs),
            )
            .await;

        // wall-clock hour, not an interval since start
        self.registry
            .register(
                MAINTENANCE,
                MaintenanceJob::new(pipeline.maintenance.clone(), pool),
                Schedule::DailyAt {
                    hour: self.config.maintenance_hour_utc,
                },
            )
            .await;

        info!(target: "scheduler", "all jobs registered");
    }

    pub async fn job_names(&self) -> Vec<String> {
        self.registry.job_ids().await
    }

    /// Run one job immediately through the job runner
    pub async fn trigger(&self, job_name: &str) -> Result<JobResult> {
        self.registry.trigger(job_name).await
    }

    pub fn metrics(&self) -> JobMetrics {
        self.registry.runner().metrics()
    }

    /// Start the scheduler and return a handle to the background task
    pub fn start(self) -> JoinHandle<Result<()>> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            for handle in registry.start().await {
                handle.await?;
            }
            Ok(())
        })
    }
}

// Re-export key types for convenience
pub use job::{Job, JobContext, JobOutput};
pub use registry::Schedule;
pub use runner::{JobMetrics, JobResult, JobRunner, JobStats};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use encore_application::{EventSource, MusicCatalog, SetlistHistory};
    use encore_infrastructure::test_support::setup_pool;
    use encore_infrastructure::Repositories;
    use encore_upstream::{
        CatalogAlbum, CatalogArtist, CatalogTrack, EventPage, EventQuery, Page, SetlistRecord,
        UpstreamError,
    };

    /// Upstreams with nothing to report.
    struct Quiet;

    #[async_trait]
    impl MusicCatalog for Quiet {
        async fn search_artists(&self, _: &str) -> encore_upstream::Result<Vec<CatalogArtist>> {
            Ok(Vec::new())
        }

        async fn get_artist(&self, id: &str) -> encore_upstream::Result<CatalogArtist> {
            Err(UpstreamError::NotFound(id.to_string()))
        }

        async fn top_tracks(&self, _: &str) -> encore_upstream::Result<Vec<CatalogTrack>> {
            Ok(Vec::new())
        }

        async fn artist_albums(
            &self,
            _: &str,
            _: u32,
            _: u32,
        ) -> encore_upstream::Result<Page<CatalogAlbum>> {
            Ok(Page {
                items: Vec::new(),
                next: None,
                total: Some(0),
            })
        }

        async fn album_tracks(
            &self,
            _: &str,
            _: u32,
            _: u32,
        ) -> encore_upstream::Result<Page<CatalogTrack>> {
            Ok(Page {
                items: Vec::new(),
                next: None,
                total: Some(0),
            })
        }
    }

    #[async_trait]
    impl EventSource for Quiet {
        async fn search_events(&self, _: &EventQuery) -> encore_upstream::Result<EventPage> {
            Ok(EventPage::default())
        }
    }

    #[async_trait]
    impl SetlistHistory for Quiet {
        async fn search_setlists(
            &self,
            _: &str,
            _: NaiveDate,
            _: Option<&str>,
        ) -> encore_upstream::Result<Vec<SetlistRecord>> {
            Ok(Vec::new())
        }
    }

    async fn scheduler() -> Scheduler {
        let config = AppConfig::default();
        let pool = setup_pool().await;
        let quiet = Arc::new(Quiet);
        let pipeline = SyncPipeline::new(
            &config,
            Repositories::sqlite(pool.clone()),
            quiet.clone(),
            quiet.clone(),
            quiet,
        );
        let scheduler = Scheduler::new(&config);
        scheduler.register_jobs(&pipeline, Some(pool)).await;
        scheduler
    }

    #[tokio::test]
    async fn registers_every_sync_job() {
        let scheduler = scheduler().await;
        assert_eq!(
            scheduler.job_names().await,
            vec!["artist-sync", "maintenance", "setlist-import", "show-sync", "trending"]
        );
    }

    #[tokio::test]
    async fn trigger_runs_jobs_and_updates_metrics() {
        let scheduler = scheduler().await;

        for name in ["trending", "show-sync", "artist-sync", "setlist-import", "maintenance"] {
            let result = scheduler.trigger(name).await.unwrap();
            assert!(result.success, "{name} failed: {:?}", result.error_details);
            assert_eq!(result.retry_count, 0);
            assert_eq!(result.records_processed, Some(0));
        }

        let metrics = scheduler.metrics();
        assert_eq!(metrics.total_runs, 5);
        assert_eq!(metrics.success_rate(), 1.0);
        assert!(metrics.jobs["maintenance"].last_run.is_some());
        assert!(scheduler.trigger("rss-sync").await.is_err());
    }
}
