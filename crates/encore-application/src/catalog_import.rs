// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use encore_config::SyncConfig;
use encore_domain::{Artist, ArtistId, Song};
use encore_infrastructure::repositories::{ArtistRepository, SongRepository};
use encore_upstream::{CatalogAlbum, CatalogTrack};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::ports::MusicCatalog;

/// Paging, batching and skip settings for [`CatalogImporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    /// Artists with more songs than this are not re-imported.
    pub skip_threshold: i64,
    pub album_page_size: u32,
    pub track_page_size: u32,
    pub album_batch_size: usize,
    pub album_batch_delay: Duration,
    pub upsert_batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for ImportSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            skip_threshold: config.catalog_skip_threshold,
            album_page_size: config.album_page_size.max(1),
            track_page_size: config.track_page_size.max(1),
            album_batch_size: config.album_batch_size.max(1),
            album_batch_delay: Duration::from_millis(config.album_batch_delay_ms),
            upsert_batch_size: config.upsert_batch_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows actually written; re-imports write none.
    pub songs_imported: u64,
    /// Tracks fetched before deduplication.
    pub total_tracks: usize,
    pub skipped: bool,
}

impl ImportSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Pulls an artist's full catalog (top tracks, then every album's tracks),
/// deduplicates it by normalized (title, album), and batch-upserts songs.
pub struct CatalogImporter {
    catalog: Arc<dyn MusicCatalog>,
    artists: Arc<dyn ArtistRepository>,
    songs: Arc<dyn SongRepository>,
    settings: ImportSettings,
}

impl CatalogImporter {
    pub fn new(
        catalog: Arc<dyn MusicCatalog>,
        artists: Arc<dyn ArtistRepository>,
        songs: Arc<dyn SongRepository>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            catalog,
            artists,
            songs,
            settings,
        }
    }

    pub async fn import_artist_catalog(&self, artist_id: ArtistId) -> SyncResult<ImportSummary> {
        let artist = self
            .artists
            .get_by_id(artist_id)
            .await?
            .ok_or_else(|| SyncError::missing("artist", artist_id))?;

        let Some(catalog_id) = artist.catalog_id.clone() else {
            debug!(target: "catalog", %artist_id, "artist has no catalog id, skipping import");
            return Ok(ImportSummary::skipped());
        };

        let existing = self.songs.count_by_artist(artist_id).await?;
        if existing > self.settings.skip_threshold {
            debug!(target: "catalog", %artist_id, existing, "catalog already imported, skipping");
            return Ok(ImportSummary::skipped());
        }

        let mut tracks = self.fetch_top_tracks(&artist, &catalog_id).await;
        let albums = self.fetch_albums(&catalog_id).await?;
        debug!(target: "catalog", %artist_id, albums = albums.len(), "fetched album list");

        for (batch_index, batch) in albums.chunks(self.settings.album_batch_size).enumerate() {
            if batch_index > 0 && !self.settings.album_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.album_batch_delay).await;
            }
            for album in batch {
                match self.fetch_album_tracks(&album.id).await {
                    Ok(album_tracks) => tracks.extend(
                        album_tracks
                            .into_iter()
                            .map(|track| song_from_track(artist_id, track, Some(&album.name))),
                    ),
                    Err(e) => {
                        warn!(target: "catalog", %artist_id, album_id = %album.id, error = %e, "failed to fetch album tracks");
                    }
                }
            }
        }

        let total_tracks = tracks.len();
        let unique = dedup_songs(tracks);

        let mut songs_imported = 0;
        for batch in unique.chunks(self.settings.upsert_batch_size) {
            songs_imported += self.songs.insert_batch(batch).await?;
        }

        info!(
            target: "catalog",
            %artist_id,
            artist = %artist.name,
            total_tracks,
            unique = unique.len(),
            songs_imported,
            "catalog import finished"
        );

        Ok(ImportSummary {
            songs_imported,
            total_tracks,
            skipped: false,
        })
    }

    /// Top tracks carry popularity, so they go first and win deduplication.
    /// A failure here only loses popularity data.
    async fn fetch_top_tracks(&self, artist: &Artist, catalog_id: &str) -> Vec<Song> {
        match self.catalog.top_tracks(catalog_id).await {
            Ok(tracks) => tracks
                .into_iter()
                .map(|track| {
                    let album = track.album.as_ref().map(|a| a.name.clone());
                    song_from_track(artist.id, track, album.as_deref())
                })
                .collect(),
            Err(e) => {
                warn!(target: "catalog", artist_id = %artist.id, error = %e, "failed to fetch top tracks");
                Vec::new()
            }
        }
    }

    async fn fetch_albums(&self, catalog_id: &str) -> SyncResult<Vec<CatalogAlbum>> {
        let limit = self.settings.album_page_size;
        let mut albums = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.catalog.artist_albums(catalog_id, offset, limit).await?;
            let count = page.items.len() as u32;
            albums.extend(page.items);
            if count < limit {
                break;
            }
            offset += count;
        }
        Ok(albums)
    }

    async fn fetch_album_tracks(&self, album_id: &str) -> SyncResult<Vec<CatalogTrack>> {
        let limit = self.settings.track_page_size;
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.catalog.album_tracks(album_id, offset, limit).await?;
            let count = page.items.len() as u32;
            tracks.extend(page.items);
            if count < limit {
                break;
            }
            offset += count;
        }
        Ok(tracks)
    }
}

fn song_from_track(artist_id: ArtistId, track: CatalogTrack, album: Option<&str>) -> Song {
    let mut song = Song::new(artist_id, track.name, album.map(str::to_string));
    song.catalog_track_id = Some(track.id);
    song.popularity = track.popularity;
    song.duration_ms = track.duration_ms;
    song
}

/// Keep the first song per normalized (title, album) key and per catalog
/// track ID, preserving order.
fn dedup_songs(songs: Vec<Song>) -> Vec<Song> {
    let mut seen_keys = HashSet::new();
    let mut seen_tracks = HashSet::new();
    songs
        .into_iter()
        .filter(|song| {
            if song.normalized_title.is_empty() {
                return false;
            }
            let key = (song.normalized_title.clone(), song.normalized_album.clone());
            let track_is_new = song
                .catalog_track_id
                .as_ref()
                .map_or(true, |id| seen_tracks.insert(id.clone()));
            track_is_new && seen_keys.insert(key)
        })
        .collect()
}
