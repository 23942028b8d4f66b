// SPDX-License-Identifier: GPL-3.0-or-later

//! Upstream capabilities the sync services depend on. The HTTP clients
//! implement them; tests substitute in-process fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use encore_upstream::{
    CatalogAlbum, CatalogArtist, CatalogClient, CatalogTrack, EventPage, EventQuery, Page,
    Result, SetlistClient, SetlistRecord, TicketingClient,
};

#[async_trait]
pub trait MusicCatalog: Send + Sync {
    async fn search_artists(&self, name: &str) -> Result<Vec<CatalogArtist>>;
    async fn get_artist(&self, catalog_id: &str) -> Result<CatalogArtist>;
    async fn top_tracks(&self, catalog_id: &str) -> Result<Vec<CatalogTrack>>;
    async fn artist_albums(
        &self,
        catalog_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogAlbum>>;
    async fn album_tracks(&self, album_id: &str, offset: u32, limit: u32)
        -> Result<Page<CatalogTrack>>;
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn search_events(&self, query: &EventQuery) -> Result<EventPage>;
}

#[async_trait]
pub trait SetlistHistory: Send + Sync {
    async fn search_setlists(
        &self,
        artist_name: &str,
        date: NaiveDate,
        venue_name: Option<&str>,
    ) -> Result<Vec<SetlistRecord>>;
}

#[async_trait]
impl MusicCatalog for CatalogClient {
    async fn search_artists(&self, name: &str) -> Result<Vec<CatalogArtist>> {
        CatalogClient::search_artists(self, name).await
    }

    async fn get_artist(&self, catalog_id: &str) -> Result<CatalogArtist> {
        CatalogClient::get_artist(self, catalog_id).await
    }

    async fn top_tracks(&self, catalog_id: &str) -> Result<Vec<CatalogTrack>> {
        self.get_artist_top_tracks(catalog_id).await
    }

    async fn artist_albums(
        &self,
        catalog_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogAlbum>> {
        self.get_artist_albums(catalog_id, offset, limit).await
    }

    async fn album_tracks(
        &self,
        album_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogTrack>> {
        self.get_album_tracks(album_id, offset, limit).await
    }
}

#[async_trait]
impl EventSource for TicketingClient {
    async fn search_events(&self, query: &EventQuery) -> Result<EventPage> {
        TicketingClient::search_events(self, query).await
    }
}

#[async_trait]
impl SetlistHistory for SetlistClient {
    async fn search_setlists(
        &self,
        artist_name: &str,
        date: NaiveDate,
        venue_name: Option<&str>,
    ) -> Result<Vec<SetlistRecord>> {
        SetlistClient::search_setlists(self, artist_name, date, venue_name).await
    }
}
