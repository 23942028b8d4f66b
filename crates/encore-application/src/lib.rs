// SPDX-License-Identifier: GPL-3.0-or-later

//! Ingestion services: identity reconciliation, catalog import, setlist
//! seeding and the periodic sync passes built on them.

pub mod artist_sync;
pub mod catalog_import;
pub mod error;
pub mod maintenance;
pub mod matching;
pub mod played_setlists;
pub mod ports;
pub mod reconciler;
pub mod setlist_seeder;
pub mod show_sync;
pub mod trending;

#[cfg(test)]
mod test_support;

use std::fmt;
use std::sync::Arc;

use encore_config::AppConfig;
use encore_infrastructure::Repositories;
use tracing::info;

pub use artist_sync::{ArtistSyncService, ArtistSyncSettings};
pub use catalog_import::{CatalogImporter, ImportSettings, ImportSummary};
pub use error::{SyncError, SyncResult};
pub use maintenance::{MaintenanceReport, MaintenanceService};
pub use matching::{ArtistMatcher, MatchDecision};
pub use played_setlists::PlayedSetlistImporter;
pub use ports::{EventSource, MusicCatalog, SetlistHistory};
pub use reconciler::{ArtistCandidate, ArtistResolution, EntityReconciler, ShowResolution};
pub use setlist_seeder::{SeedOutcome, SetlistSeeder};
pub use show_sync::{ShowSyncService, ShowSyncSettings};
pub use trending::TrendingService;

/// Per-item counters of one batch pass. Item failures are counted here
/// instead of failing the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl SyncStats {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn record_skip(&mut self) {
        self.processed += 1;
        self.skipped += 1;
    }

    pub fn merge(&mut self, other: SyncStats) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} succeeded, {} failed, {} skipped",
            self.processed, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Every sync service, wired to one set of repositories and upstreams.
#[derive(Clone)]
pub struct SyncPipeline {
    pub repos: Repositories,
    pub importer: Arc<CatalogImporter>,
    pub seeder: Arc<SetlistSeeder>,
    pub reconciler: Arc<EntityReconciler>,
    pub shows: Arc<ShowSyncService>,
    pub artists: Arc<ArtistSyncService>,
    pub played: Arc<PlayedSetlistImporter>,
    pub trending: Arc<TrendingService>,
    pub maintenance: Arc<MaintenanceService>,
}

impl SyncPipeline {
    pub fn new(
        config: &AppConfig,
        repos: Repositories,
        catalog: Arc<dyn MusicCatalog>,
        events: Arc<dyn EventSource>,
        history: Arc<dyn SetlistHistory>,
    ) -> Self {
        let sync = &config.sync;
        let matcher = ArtistMatcher::new(sync.accept_confidence, sync.reject_confidence);

        let importer = Arc::new(CatalogImporter::new(
            catalog.clone(),
            repos.artists.clone(),
            repos.songs.clone(),
            ImportSettings::from(sync),
        ));
        let seeder = Arc::new(SetlistSeeder::new(
            repos.setlists.clone(),
            repos.songs.clone(),
            importer.clone(),
            sync.seed_pool_size,
            sync.seed_size,
        ));
        let reconciler = Arc::new(EntityReconciler::new(
            repos.clone(),
            catalog.clone(),
            matcher,
            importer.clone(),
            seeder.clone(),
        ));
        let shows = Arc::new(ShowSyncService::new(
            events,
            repos.artists.clone(),
            reconciler.clone(),
            ShowSyncSettings::from(config),
        ));
        let artists = Arc::new(ArtistSyncService::new(
            repos.clone(),
            catalog,
            matcher,
            importer.clone(),
            seeder.clone(),
            ArtistSyncSettings::from(sync),
        ));
        let played = Arc::new(PlayedSetlistImporter::new(
            repos.clone(),
            history,
            sync.sync_batch_limit,
        ));
        let trending = Arc::new(TrendingService::new(repos.shows.clone()));
        let maintenance = Arc::new(MaintenanceService::new(repos.clone(), sync.retention_days));

        info!(target: "application", "sync pipeline initialized");

        Self {
            repos,
            importer,
            seeder,
            reconciler,
            shows,
            artists,
            played,
            trending,
            maintenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_every_outcome() {
        let mut stats = SyncStats::default();
        stats.record_success();
        stats.record_failure();
        stats.record_skip();

        let mut total = SyncStats::default();
        total.merge(stats);
        total.merge(stats);

        assert_eq!(total.processed, 6);
        assert_eq!(total.succeeded, 2);
        assert_eq!(total.failed, 2);
        assert_eq!(total.skipped, 2);
        assert_eq!(stats.to_string(), "3 processed, 1 succeeded, 1 failed, 1 skipped");
    }
}
