// SPDX-License-Identifier: GPL-3.0-or-later

//! In-process upstream fakes and a harness wiring them to an in-memory
//! database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use encore_config::AppConfig;
use encore_infrastructure::test_support::setup_pool;
use encore_infrastructure::Repositories;
use encore_upstream::models::{
    AlbumRef, AttractionPayload, EventDates, EventEmbedded, EventStart, EventStatus,
    NamedPayload, VenuePayload,
};
use encore_upstream::{
    CatalogAlbum, CatalogArtist, CatalogTrack, EventPage, EventPayload, EventQuery, Page, Result,
    SetlistRecord, UpstreamError,
};

use crate::catalog_import::{CatalogImporter, ImportSettings};
use crate::ports::{EventSource, MusicCatalog, SetlistHistory};
use crate::setlist_seeder::SetlistSeeder;
use crate::SyncPipeline;

pub fn track(id: &str, name: &str) -> CatalogTrack {
    CatalogTrack {
        id: id.to_string(),
        name: name.to_string(),
        album: None,
        popularity: None,
        duration_ms: Some(200_000),
    }
}

pub fn top_track(id: &str, name: &str, album: &str, popularity: i64) -> CatalogTrack {
    CatalogTrack {
        album: Some(AlbumRef {
            id: None,
            name: album.to_string(),
        }),
        popularity: Some(popularity),
        ..track(id, name)
    }
}

pub fn album(id: &str, name: &str) -> CatalogAlbum {
    CatalogAlbum {
        id: id.to_string(),
        name: name.to_string(),
        album_type: Some("album".to_string()),
        release_date: None,
    }
}

pub fn catalog_artist(id: &str, name: &str, popularity: i64) -> CatalogArtist {
    CatalogArtist {
        id: id.to_string(),
        name: name.to_string(),
        images: Vec::new(),
        popularity: Some(popularity),
        genres: vec!["pop".to_string()],
    }
}

/// Ticketing event payload with one venue and one attraction.
pub fn event(
    id: &str,
    attraction: (&str, &str),
    venue: (&str, &str),
    date: NaiveDate,
) -> EventPayload {
    EventPayload {
        id: Some(id.to_string()),
        name: Some(format!("{} Live", attraction.1)),
        dates: Some(EventDates {
            start: Some(EventStart {
                local_date: Some(date.format("%Y-%m-%d").to_string()),
                date_time: None,
            }),
            status: Some(EventStatus {
                code: Some("onsale".to_string()),
            }),
        }),
        embedded: Some(EventEmbedded {
            venues: vec![VenuePayload {
                id: Some(venue.0.to_string()),
                name: Some(venue.1.to_string()),
                city: Some(NamedPayload {
                    name: Some("Toronto".to_string()),
                }),
                ..VenuePayload::default()
            }],
            attractions: vec![AttractionPayload {
                id: Some(attraction.0.to_string()),
                name: Some(attraction.1.to_string()),
            }],
        }),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn page_of<T: Clone>(items: &[T], offset: u32, limit: u32) -> Page<T> {
    let start = (offset as usize).min(items.len());
    let end = (start + limit as usize).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next: None,
        total: Some(items.len() as u32),
    }
}

fn unavailable(upstream: &str) -> UpstreamError {
    UpstreamError::Unavailable {
        upstream: upstream.to_string(),
        message: "503 Service Unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    artists: Vec<CatalogArtist>,
    top_tracks: HashMap<String, Vec<CatalogTrack>>,
    albums: HashMap<String, Vec<CatalogAlbum>>,
    album_tracks: HashMap<String, Vec<CatalogTrack>>,
    failing_albums: HashSet<String>,
    search_down: bool,
    search_calls: AtomicUsize,
    album_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_artist(mut self, artist: CatalogArtist) -> Self {
        self.artists.push(artist);
        self
    }

    pub fn with_top_tracks(mut self, catalog_id: &str, tracks: Vec<CatalogTrack>) -> Self {
        self.top_tracks.insert(catalog_id.to_string(), tracks);
        self
    }

    pub fn with_albums(mut self, catalog_id: &str, albums: Vec<CatalogAlbum>) -> Self {
        self.albums.insert(catalog_id.to_string(), albums);
        self
    }

    pub fn with_album_tracks(mut self, album_id: &str, tracks: Vec<CatalogTrack>) -> Self {
        self.album_tracks.insert(album_id.to_string(), tracks);
        self
    }

    pub fn failing_album(mut self, album_id: &str) -> Self {
        self.failing_albums.insert(album_id.to_string());
        self
    }

    pub fn search_unavailable(mut self) -> Self {
        self.search_down = true;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of album listing requests served.
    pub fn album_calls(&self) -> usize {
        self.album_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MusicCatalog for FakeCatalog {
    async fn search_artists(&self, _name: &str) -> Result<Vec<CatalogArtist>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.search_down {
            return Err(unavailable("catalog"));
        }
        Ok(self.artists.clone())
    }

    async fn get_artist(&self, catalog_id: &str) -> Result<CatalogArtist> {
        self.artists
            .iter()
            .find(|a| a.id == catalog_id)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(format!("artists/{catalog_id}")))
    }

    async fn top_tracks(&self, catalog_id: &str) -> Result<Vec<CatalogTrack>> {
        Ok(self.top_tracks.get(catalog_id).cloned().unwrap_or_default())
    }

    async fn artist_albums(
        &self,
        catalog_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogAlbum>> {
        self.album_calls.fetch_add(1, Ordering::SeqCst);
        let albums = self.albums.get(catalog_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(page_of(albums, offset, limit))
    }

    async fn album_tracks(
        &self,
        album_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogTrack>> {
        if self.failing_albums.contains(album_id) {
            return Err(unavailable("catalog"));
        }
        let tracks = self.album_tracks.get(album_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(page_of(tracks, offset, limit))
    }
}

/// Serves a fixed event list, paginated by the query's page and size.
#[derive(Default)]
pub struct FakeEvents {
    events: Vec<EventPayload>,
    queries: Mutex<Vec<EventQuery>>,
}

impl FakeEvents {
    pub fn with_event(mut self, event: EventPayload) -> Self {
        self.events.push(event);
        self
    }

    pub fn queries(&self) -> Vec<EventQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn search_events(&self, query: &EventQuery) -> Result<EventPage> {
        self.queries.lock().expect("queries lock").push(query.clone());
        let size = query.size.max(1) as usize;
        let total_pages = self.events.len().div_ceil(size) as u32;
        let start = (query.page as usize * size).min(self.events.len());
        let end = (start + size).min(self.events.len());
        Ok(EventPage {
            events: self.events[start..end].to_vec(),
            number: query.page,
            total_pages,
        })
    }
}

/// Returns the stored setlists dated on the requested day, narrowed to the
/// venue when one is given.
#[derive(Default)]
pub struct FakeHistory {
    records: Vec<SetlistRecord>,
    calls: AtomicUsize,
}

impl FakeHistory {
    pub fn with_record(mut self, record: SetlistRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SetlistHistory for FakeHistory {
    async fn search_setlists(
        &self,
        _artist_name: &str,
        date: NaiveDate,
        venue_name: Option<&str>,
    ) -> Result<Vec<SetlistRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .iter()
            .filter(|r| r.event_date == date)
            .filter(|r| match (venue_name, r.venue_name.as_deref()) {
                (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.album_batch_delay_ms = 0;
    config
}

pub struct TestHarness {
    pub repos: Repositories,
    pub catalog: Arc<FakeCatalog>,
    pub events: Arc<FakeEvents>,
    pub history: Arc<FakeHistory>,
    pub pipeline: SyncPipeline,
    config: AppConfig,
}

impl TestHarness {
    pub async fn new(catalog: FakeCatalog) -> Self {
        Self::with_upstreams(catalog, FakeEvents::default(), FakeHistory::default()).await
    }

    pub async fn with_upstreams(
        catalog: FakeCatalog,
        events: FakeEvents,
        history: FakeHistory,
    ) -> Self {
        let repos = Repositories::sqlite(setup_pool().await);
        let catalog = Arc::new(catalog);
        let events = Arc::new(events);
        let history = Arc::new(history);
        let config = test_config();
        let pipeline = SyncPipeline::new(
            &config,
            repos.clone(),
            catalog.clone(),
            events.clone(),
            history.clone(),
        );
        Self {
            repos,
            catalog,
            events,
            history,
            pipeline,
            config,
        }
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings::from(&self.config.sync)
    }

    pub fn importer(&self) -> Arc<CatalogImporter> {
        self.pipeline.importer.clone()
    }

    pub fn importer_with(&self, settings: ImportSettings) -> CatalogImporter {
        CatalogImporter::new(
            self.catalog.clone(),
            self.repos.artists.clone(),
            self.repos.songs.clone(),
            settings,
        )
    }

    pub fn seeder(&self) -> Arc<SetlistSeeder> {
        self.pipeline.seeder.clone()
    }
}
