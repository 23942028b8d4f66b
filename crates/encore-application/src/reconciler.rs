// SPDX-License-Identifier: GPL-3.0-or-later

//! Find-or-create for the canonical artist, venue and show rows.
//!
//! Every operation checks by stable identity first and only writes when
//! nothing matches, so feeding the same upstream data twice converges on the
//! same rows.

use std::sync::Arc;

use chrono::Utc;
use encore_domain::{Artist, Show, ShowStatus, Venue};
use encore_infrastructure::Repositories;
use encore_upstream::{CatalogArtist, TicketingEvent, TicketingVenue};
use tracing::{debug, info, warn};

use crate::catalog_import::CatalogImporter;
use crate::error::{SyncError, SyncResult};
use crate::matching::{ArtistMatcher, MatchDecision};
use crate::ports::MusicCatalog;
use crate::setlist_seeder::{SeedOutcome, SetlistSeeder};

/// What an upstream knows about an artist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistCandidate {
    pub name: String,
    pub catalog_id: Option<String>,
    pub ticketing_id: Option<String>,
}

impl ArtistCandidate {
    pub fn from_ticketing(name: impl Into<String>, ticketing_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            catalog_id: None,
            ticketing_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtistResolution {
    Existing(Artist),
    /// New artist linked to a catalog match.
    Created {
        artist: Artist,
        confidence: f64,
        needs_review: bool,
    },
    /// No confident catalog match; flagged for backfill.
    Stub(Artist),
}

impl ArtistResolution {
    pub fn artist(&self) -> &Artist {
        match self {
            Self::Existing(artist) | Self::Stub(artist) => artist,
            Self::Created { artist, .. } => artist,
        }
    }

    pub fn into_artist(self) -> Artist {
        match self {
            Self::Existing(artist) | Self::Stub(artist) => artist,
            Self::Created { artist, .. } => artist,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowResolution {
    pub show: Show,
    pub created: bool,
    /// Seeding result for newly created shows.
    pub seed: Option<SeedOutcome>,
}

/// Copy catalog metadata onto `artist` and record the match quality.
pub(crate) fn apply_catalog_match(
    artist: &mut Artist,
    catalog: &CatalogArtist,
    decision: &MatchDecision,
) {
    artist.name = catalog.name.clone();
    artist.catalog_id = Some(catalog.id.clone());
    artist.image_url = catalog.primary_image_url().map(str::to_string);
    artist.popularity = catalog.popularity;
    artist.genres = catalog.genres.clone();
    artist.match_confidence = Some(decision.confidence());
    artist.needs_review = decision.needs_review();
    artist.needs_backfill = false;
    artist.last_synced_at = Some(Utc::now());
}

pub struct EntityReconciler {
    repos: Repositories,
    catalog: Arc<dyn MusicCatalog>,
    matcher: ArtistMatcher,
    importer: Arc<CatalogImporter>,
    seeder: Arc<SetlistSeeder>,
}

impl EntityReconciler {
    pub fn new(
        repos: Repositories,
        catalog: Arc<dyn MusicCatalog>,
        matcher: ArtistMatcher,
        importer: Arc<CatalogImporter>,
        seeder: Arc<SetlistSeeder>,
    ) -> Self {
        Self {
            repos,
            catalog,
            matcher,
            importer,
            seeder,
        }
    }

    pub async fn ensure_artist_exists(
        &self,
        candidate: &ArtistCandidate,
    ) -> SyncResult<ArtistResolution> {
        let name = candidate.name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("artist candidate without a name".into()));
        }

        if let Some(catalog_id) = candidate.catalog_id.as_deref() {
            if let Some(existing) = self.repos.artists.get_by_catalog_id(catalog_id).await? {
                return Ok(ArtistResolution::Existing(
                    self.attach_ticketing_id(existing, candidate).await?,
                ));
            }
        }

        if let Some(existing) = self.repos.artists.get_by_name(name).await? {
            return Ok(ArtistResolution::Existing(
                self.attach_ticketing_id(existing, candidate).await?,
            ));
        }

        let candidates = self.catalog.search_artists(name).await?;
        let best = self.matcher.best_match(name, &candidates);

        match best {
            Some((best, decision)) if decision.is_accepted() => {
                if let Some(existing) = self.repos.artists.get_by_catalog_id(&best.artist.id).await?
                {
                    debug!(target: "reconciler", name, catalog_id = %best.artist.id, "matched an artist already linked under another name");
                    return Ok(ArtistResolution::Existing(
                        self.attach_ticketing_id(existing, candidate).await?,
                    ));
                }

                let mut artist = Artist::new(name);
                artist.ticketing_id = candidate.ticketing_id.clone();
                apply_catalog_match(&mut artist, &best.artist, &decision);
                let artist = self.repos.artists.create(artist).await?;

                if decision.needs_review() {
                    warn!(
                        target: "reconciler",
                        name,
                        matched = %best.artist.name,
                        confidence = decision.confidence(),
                        "low-confidence catalog match, flagged for review"
                    );
                } else {
                    info!(target: "reconciler", artist_id = %artist.id, name = %artist.name, confidence = decision.confidence(), "created artist from catalog match");
                }

                if let Err(e) = self.importer.import_artist_catalog(artist.id).await {
                    warn!(target: "reconciler", artist_id = %artist.id, error = %e, "catalog import failed for new artist");
                }

                Ok(ArtistResolution::Created {
                    confidence: decision.confidence(),
                    needs_review: decision.needs_review(),
                    artist,
                })
            }
            best => {
                let confidence = best.map(|(_, decision)| decision.confidence());
                let stub = Artist::stub(name, candidate.ticketing_id.clone());
                let stub = self.repos.artists.create(stub).await?;
                info!(
                    target: "reconciler",
                    artist_id = %stub.id,
                    name,
                    candidates = candidates.len(),
                    best_confidence = ?confidence,
                    "no confident catalog match, created stub artist"
                );
                Ok(ArtistResolution::Stub(stub))
            }
        }
    }

    async fn attach_ticketing_id(
        &self,
        mut artist: Artist,
        candidate: &ArtistCandidate,
    ) -> SyncResult<Artist> {
        if artist.ticketing_id.is_some() {
            return Ok(artist);
        }
        if let Some(ticketing_id) = candidate.ticketing_id.as_deref() {
            if self
                .repos
                .artists
                .attach_ticketing_id(artist.id, ticketing_id)
                .await?
            {
                debug!(target: "reconciler", artist_id = %artist.id, ticketing_id, "attached ticketing id");
                artist.ticketing_id = Some(ticketing_id.to_string());
            }
        }
        Ok(artist)
    }

    pub async fn ensure_venue_exists(&self, payload: &TicketingVenue) -> SyncResult<Venue> {
        let mut venue = Venue::new(payload.id.clone(), payload.name.clone());
        venue.city = payload.city.clone();
        venue.state = payload.state.clone();
        venue.country = payload.country.clone();
        venue.latitude = payload.latitude;
        venue.longitude = payload.longitude;

        match self.repos.venues.get_by_ticketing_id(&payload.id).await? {
            Some(existing) => {
                if !self.repos.venues.fill_missing(&venue).await? {
                    return Ok(existing);
                }
                debug!(target: "reconciler", venue_id = %existing.id, "filled missing venue fields");
                self.repos
                    .venues
                    .get_by_id(existing.id)
                    .await?
                    .ok_or_else(|| SyncError::missing("venue", existing.id))
            }
            None => {
                let venue = self.repos.venues.create(venue).await?;
                debug!(target: "reconciler", venue_id = %venue.id, name = %venue.name, "created venue");
                Ok(venue)
            }
        }
    }

    /// Find or create the show for `event`, keeping its status in step with
    /// the upstream. New, non-canceled shows get an initial setlist.
    pub async fn ensure_show_exists(
        &self,
        event: &TicketingEvent,
        artist: &Artist,
        venue: &Venue,
    ) -> SyncResult<ShowResolution> {
        let status = ShowStatus::from_upstream_code(event.status_code.as_deref());

        if let Some(show) = self.find_show(event, artist, venue).await? {
            return Ok(ShowResolution {
                show: self.sync_status(show, status).await?,
                created: false,
                seed: None,
            });
        }

        let mut show = Show::new(event.id.clone(), artist.id, venue.id, event.name.clone(), event.date);
        show.starts_at = event.starts_at;
        show.status = status;

        if !self.repos.shows.insert(&show).await? {
            // a concurrent run inserted it first
            let show = self
                .find_show(event, artist, venue)
                .await?
                .ok_or_else(|| SyncError::missing("show", &event.id))?;
            return Ok(ShowResolution {
                show,
                created: false,
                seed: None,
            });
        }
        info!(target: "reconciler", show_id = %show.id, ticketing_id = %show.ticketing_id, artist = %artist.name, date = %show.date, "created show");

        let seed = if status == ShowStatus::Canceled {
            None
        } else {
            match self.seeder.seed_initial_setlist(show.id, artist.id).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(target: "reconciler", show_id = %show.id, error = %e, "failed to seed initial setlist");
                    None
                }
            }
        };

        Ok(ShowResolution {
            show,
            created: true,
            seed,
        })
    }

    async fn find_show(
        &self,
        event: &TicketingEvent,
        artist: &Artist,
        venue: &Venue,
    ) -> SyncResult<Option<Show>> {
        if let Some(show) = self.repos.shows.get_by_ticketing_id(&event.id).await? {
            return Ok(Some(show));
        }
        Ok(self
            .repos
            .shows
            .get_by_natural_key(artist.id, venue.id, event.date)
            .await?)
    }

    /// Completed is terminal; upstreams never report it.
    async fn sync_status(&self, mut show: Show, status: ShowStatus) -> SyncResult<Show> {
        if show.status == status || show.status == ShowStatus::Completed {
            return Ok(show);
        }
        info!(target: "reconciler", show_id = %show.id, from = %show.status, to = %status, "show status changed");
        self.repos.shows.update_status(show.id, status).await?;
        show.status = status;
        Ok(show)
    }
}
