// SPDX-License-Identifier: GPL-3.0-or-later

//! Periodic artist maintenance: upgrading stubs once the catalog knows them,
//! and refreshing catalog metadata of linked artists that went stale.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use encore_config::SyncConfig;
use encore_domain::{Artist, ArtistId};
use encore_infrastructure::Repositories;
use tracing::{debug, info, warn};

use crate::catalog_import::CatalogImporter;
use crate::error::{SyncError, SyncResult};
use crate::matching::ArtistMatcher;
use crate::ports::MusicCatalog;
use crate::reconciler::apply_catalog_match;
use crate::setlist_seeder::{SeedOutcome, SetlistSeeder};
use crate::SyncStats;

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistSyncSettings {
    pub resync_age: Duration,
    pub batch_limit: i64,
}

impl From<&SyncConfig> for ArtistSyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            resync_age: Duration::hours(config.artist_resync_age_hours.max(0)),
            batch_limit: config.sync_batch_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Linked { setlists_seeded: usize },
    /// Still no confident match; the stub stays flagged.
    NoMatch,
    /// The match is already linked to another artist row.
    Conflict { existing: ArtistId },
}

pub struct ArtistSyncService {
    repos: Repositories,
    catalog: Arc<dyn MusicCatalog>,
    matcher: ArtistMatcher,
    importer: Arc<CatalogImporter>,
    seeder: Arc<SetlistSeeder>,
    settings: ArtistSyncSettings,
}

impl ArtistSyncService {
    pub fn new(
        repos: Repositories,
        catalog: Arc<dyn MusicCatalog>,
        matcher: ArtistMatcher,
        importer: Arc<CatalogImporter>,
        seeder: Arc<SetlistSeeder>,
        settings: ArtistSyncSettings,
    ) -> Self {
        Self {
            repos,
            catalog,
            matcher,
            importer,
            seeder,
            settings,
        }
    }

    /// Backfill stubs, then resync stale artists.
    pub async fn run(&self, now: DateTime<Utc>) -> SyncResult<SyncStats> {
        let mut stats = self.backfill_stubs().await?;
        stats.merge(self.resync_stale(now).await?);
        Ok(stats)
    }

    /// Retry up to `batch_limit` stubs, least recently attempted first, so
    /// unmatchable stubs do not hold back newer ones.
    pub async fn backfill_stubs(&self) -> SyncResult<SyncStats> {
        let stubs = self
            .repos
            .artists
            .list_needing_backfill(self.settings.batch_limit)
            .await?;
        let mut stats = SyncStats::default();
        for stub in &stubs {
            match self.backfill_artist(stub).await {
                Ok(BackfillOutcome::Linked { .. }) => stats.record_success(),
                Ok(BackfillOutcome::NoMatch | BackfillOutcome::Conflict { .. }) => {
                    stats.record_skip()
                }
                Err(e) => {
                    warn!(target: "artist_sync", artist_id = %stub.id, name = %stub.name, error = %e, "stub backfill failed");
                    stats.record_failure();
                }
            }
            self.repos
                .artists
                .mark_backfill_attempted(stub.id, Utc::now())
                .await?;
        }
        info!(target: "artist_sync", stubs = stubs.len(), %stats, "stub backfill finished");
        Ok(stats)
    }

    pub async fn backfill_artist(&self, stub: &Artist) -> SyncResult<BackfillOutcome> {
        let candidates = self.catalog.search_artists(&stub.name).await?;
        let Some((best, decision)) = self
            .matcher
            .best_match(&stub.name, &candidates)
            .filter(|(_, decision)| decision.is_accepted())
        else {
            debug!(target: "artist_sync", artist_id = %stub.id, name = %stub.name, "still no confident match");
            return Ok(BackfillOutcome::NoMatch);
        };

        let mut artist = stub.clone();
        if let Some(existing) = self.repos.artists.get_by_catalog_id(&best.artist.id).await? {
            warn!(
                target: "artist_sync",
                artist_id = %stub.id,
                existing_id = %existing.id,
                catalog_id = %best.artist.id,
                "stub matches an artist that is already linked, flagging for review"
            );
            artist.needs_review = true;
            artist.needs_backfill = false;
            artist.match_confidence = Some(decision.confidence());
            self.repos.artists.update_catalog_fields(&artist).await?;
            return Ok(BackfillOutcome::Conflict {
                existing: existing.id,
            });
        }

        apply_catalog_match(&mut artist, &best.artist, &decision);
        self.repos.artists.update_catalog_fields(&artist).await?;
        info!(target: "artist_sync", artist_id = %artist.id, catalog_id = %best.artist.id, confidence = decision.confidence(), "linked stub artist to catalog");

        let setlists_seeded = self.import_and_seed(&artist).await?;
        Ok(BackfillOutcome::Linked { setlists_seeded })
    }

    pub async fn resync_stale(&self, now: DateTime<Utc>) -> SyncResult<SyncStats> {
        let stale = self
            .repos
            .artists
            .list_stale(now - self.settings.resync_age, self.settings.batch_limit)
            .await?;
        let mut stats = SyncStats::default();
        for artist in &stale {
            match self.resync_artist(artist).await {
                Ok(()) => stats.record_success(),
                Err(e) => {
                    warn!(target: "artist_sync", artist_id = %artist.id, error = %e, "artist resync failed");
                    stats.record_failure();
                }
            }
        }
        info!(target: "artist_sync", stale = stale.len(), %stats, "artist resync finished");
        Ok(stats)
    }

    /// Refresh catalog metadata and retry the catalog import.
    pub async fn resync_artist(&self, artist: &Artist) -> SyncResult<()> {
        let catalog_id = artist
            .catalog_id
            .as_deref()
            .ok_or_else(|| SyncError::Validation(format!("artist {} has no catalog id", artist.id)))?;
        let fresh = self.catalog.get_artist(catalog_id).await?;

        let mut updated = artist.clone();
        updated.name = fresh.name.clone();
        updated.image_url = fresh.primary_image_url().map(str::to_string);
        updated.popularity = fresh.popularity;
        updated.genres = fresh.genres;
        updated.last_synced_at = Some(Utc::now());
        self.repos.artists.update_catalog_fields(&updated).await?;
        debug!(target: "artist_sync", artist_id = %artist.id, "refreshed catalog metadata");

        self.import_and_seed(&updated).await?;
        Ok(())
    }

    /// Import the catalog, then seed every show of the artist still lacking
    /// a setlist. Returns how many setlists were created.
    async fn import_and_seed(&self, artist: &Artist) -> SyncResult<usize> {
        if let Err(e) = self.importer.import_artist_catalog(artist.id).await {
            warn!(target: "artist_sync", artist_id = %artist.id, error = %e, "catalog import failed");
        }

        let mut seeded = 0;
        for show in self.repos.shows.list_without_setlist(artist.id).await? {
            match self.seeder.seed_initial_setlist(show.id, artist.id).await {
                Ok(SeedOutcome::Seeded { .. }) => seeded += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "artist_sync", show_id = %show.id, error = %e, "failed to seed setlist");
                }
            }
        }
        Ok(seeded)
    }
}
