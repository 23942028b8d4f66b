// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use chrono::{Days, NaiveDate, NaiveTime, Utc};
use encore_config::AppConfig;
use encore_domain::{normalize_name, Artist, Venue};
use encore_infrastructure::repositories::ArtistRepository;
use encore_upstream::{EventPayload, EventQuery, TicketingEvent};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::ports::EventSource;
use crate::reconciler::{ArtistCandidate, ArtistResolution, EntityReconciler, ShowResolution};
use crate::SyncStats;

#[derive(Debug, Clone, PartialEq)]
pub struct ShowSyncSettings {
    pub lookahead_days: u64,
    pub page_size: u32,
    /// Guard against an upstream that never reports its last page.
    pub max_pages: u32,
    /// Artists visited per `sync_all` run.
    pub batch_limit: i64,
}

impl Default for ShowSyncSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ShowSyncSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            lookahead_days: config.ticketing.lookahead_days.max(0) as u64,
            page_size: config.ticketing.page_size.clamp(1, 100),
            max_pages: 50,
            batch_limit: config.sync.sync_batch_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub artist: ArtistResolution,
    pub venue: Venue,
    pub show: ShowResolution,
}

/// Turns ticketing events into artist, venue and show rows.
pub struct ShowSyncService {
    events: Arc<dyn EventSource>,
    artists: Arc<dyn ArtistRepository>,
    reconciler: Arc<EntityReconciler>,
    settings: ShowSyncSettings,
}

impl ShowSyncService {
    pub fn new(
        events: Arc<dyn EventSource>,
        artists: Arc<dyn ArtistRepository>,
        reconciler: Arc<EntityReconciler>,
        settings: ShowSyncSettings,
    ) -> Self {
        Self {
            events,
            artists,
            reconciler,
            settings,
        }
    }

    /// Validate one raw event and reconcile its headliner (first
    /// attraction), venue and show.
    pub async fn process_event(&self, payload: EventPayload) -> SyncResult<EventOutcome> {
        let event = validate(payload)?;
        let headliner = &event.attractions[0];
        let candidate = ArtistCandidate::from_ticketing(headliner.name.clone(), headliner.id.clone());

        let artist = self.reconciler.ensure_artist_exists(&candidate).await?;
        let venue = self.reconciler.ensure_venue_exists(&event.venue).await?;
        let show = self
            .reconciler
            .ensure_show_exists(&event, artist.artist(), &venue)
            .await?;

        Ok(EventOutcome {
            artist,
            venue,
            show,
        })
    }

    /// Page through the artist's upcoming events and reconcile each one.
    ///
    /// A failed page request fails the whole call; a failing event is
    /// counted and skipped.
    pub async fn sync_artist_shows(&self, artist: &Artist, today: NaiveDate) -> SyncResult<SyncStats> {
        let start = today.and_time(NaiveTime::MIN).and_utc();
        let end = today
            .checked_add_days(Days::new(self.settings.lookahead_days))
            .unwrap_or(today)
            .and_time(NaiveTime::MIN)
            .and_utc();
        let query = match artist.ticketing_id.as_deref() {
            Some(attraction_id) => EventQuery::attraction(attraction_id, start, end),
            None => EventQuery::keyword(artist.name.clone(), start, end),
        }
        .size(self.settings.page_size);

        let mut stats = SyncStats::default();
        let mut page_number = 0;
        loop {
            let page = self
                .events
                .search_events(&query.clone().page(page_number))
                .await?;
            debug!(target: "show_sync", artist_id = %artist.id, page = page_number, events = page.events.len(), "fetched event page");
            let has_more = page.has_more();

            for payload in page.events {
                let event = match validate(payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(target: "show_sync", artist_id = %artist.id, error = %e, "skipping malformed event");
                        stats.record_failure();
                        continue;
                    }
                };
                if !features(&event, artist) {
                    debug!(target: "show_sync", event_id = %event.id, "event does not feature artist");
                    stats.record_skip();
                    continue;
                }
                match self.ingest(&event, artist).await {
                    Ok(_) => stats.record_success(),
                    Err(e) => {
                        warn!(target: "show_sync", event_id = %event.id, artist_id = %artist.id, error = %e, "failed to sync event");
                        stats.record_failure();
                    }
                }
            }

            page_number += 1;
            if !has_more {
                break;
            }
            if page_number >= self.settings.max_pages {
                warn!(target: "show_sync", artist_id = %artist.id, max_pages = self.settings.max_pages, "stopped paging at page limit");
                break;
            }
        }

        info!(target: "show_sync", artist_id = %artist.id, artist = %artist.name, %stats, "artist shows synced");
        Ok(stats)
    }

    /// Refresh shows for up to `batch_limit` artists, least recently
    /// synced first. Every attempted artist moves to the back of the
    /// rotation, whether or not its sync succeeded.
    pub async fn sync_all(&self, today: NaiveDate) -> SyncResult<SyncStats> {
        let artists = self
            .artists
            .list_for_show_sync(self.settings.batch_limit)
            .await?;
        let mut stats = SyncStats::default();
        for artist in &artists {
            match self.sync_artist_shows(artist, today).await {
                Ok(artist_stats) => stats.merge(artist_stats),
                Err(e) => {
                    warn!(target: "show_sync", artist_id = %artist.id, error = %e, "show sync failed for artist");
                    stats.record_failure();
                }
            }
            self.artists.mark_shows_synced(artist.id, Utc::now()).await?;
        }
        Ok(stats)
    }

    async fn ingest(&self, event: &TicketingEvent, artist: &Artist) -> SyncResult<ShowResolution> {
        let venue = self.reconciler.ensure_venue_exists(&event.venue).await?;
        self.reconciler.ensure_show_exists(event, artist, &venue).await
    }
}

fn validate(payload: EventPayload) -> SyncResult<TicketingEvent> {
    TicketingEvent::try_from(payload).map_err(|e| SyncError::Validation(e.to_string()))
}

fn features(event: &TicketingEvent, artist: &Artist) -> bool {
    let name = normalize_name(&artist.name);
    event.attractions.iter().any(|attraction| {
        match (attraction.id.as_deref(), artist.ticketing_id.as_deref()) {
            (Some(a), Some(b)) if a == b => true,
            _ => normalize_name(&attraction.name) == name,
        }
    })
}
