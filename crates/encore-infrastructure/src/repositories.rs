// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use encore_domain::{
    Artist, ArtistId, PlayedSetlist, PlayedSetlistId, PlayedSetlistSong, Setlist, SetlistId,
    SetlistSong, Show, ShowId, ShowStatus, Song, Venue, VenueId,
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Artist repository. Catalog IDs are unique; ticketing IDs are not.
#[async_trait::async_trait]
pub trait ArtistRepository: Send + Sync {
    async fn get_by_id(&self, id: ArtistId) -> Result<Option<Artist>>;
    async fn get_by_catalog_id(&self, catalog_id: &str) -> Result<Option<Artist>>;
    /// Case-insensitive exact name lookup.
    async fn get_by_name(&self, name: &str) -> Result<Option<Artist>>;
    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Artist>>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Artist>>;
    /// Insert, or return the row already holding the same catalog ID.
    async fn create(&self, artist: Artist) -> Result<Artist>;
    /// Attach a ticketing ID only when none is recorded yet.
    async fn attach_ticketing_id(&self, id: ArtistId, ticketing_id: &str) -> Result<bool>;
    /// Overwrite catalog-derived fields (ID, image, popularity, genres,
    /// match flags, last sync time).
    async fn update_catalog_fields(&self, artist: &Artist) -> Result<()>;
    /// Stubs still flagged for backfill, least recently attempted first.
    async fn list_needing_backfill(&self, limit: i64) -> Result<Vec<Artist>>;
    async fn mark_backfill_attempted(&self, id: ArtistId, at: DateTime<Utc>) -> Result<()>;
    /// Artists whose shows were refreshed least recently (never first).
    async fn list_for_show_sync(&self, limit: i64) -> Result<Vec<Artist>>;
    async fn mark_shows_synced(&self, id: ArtistId, at: DateTime<Utc>) -> Result<()>;
    /// Catalog-linked artists not synced since `synced_before`.
    async fn list_stale(&self, synced_before: DateTime<Utc>, limit: i64) -> Result<Vec<Artist>>;
    /// Delete stub artists without shows created before `created_before`.
    async fn delete_orphan_stubs(&self, created_before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait VenueRepository: Send + Sync {
    async fn get_by_id(&self, id: VenueId) -> Result<Option<Venue>>;
    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Venue>>;
    /// Insert, or return the row already holding the same ticketing ID.
    async fn create(&self, venue: Venue) -> Result<Venue>;
    /// Fill null location fields from `venue`; set fields are kept.
    async fn fill_missing(&self, venue: &Venue) -> Result<bool>;
}

/// Inputs for the trending score of one show.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingInput {
    pub show_id: ShowId,
    pub date: NaiveDate,
    pub view_count: i64,
    pub total_votes: i64,
}

#[async_trait::async_trait]
pub trait ShowRepository: Send + Sync {
    async fn get_by_id(&self, id: ShowId) -> Result<Option<Show>>;
    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Show>>;
    async fn get_by_natural_key(
        &self,
        artist_id: ArtistId,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Option<Show>>;
    /// Insert unless either uniqueness key is taken. Returns whether a row
    /// was written.
    async fn insert(&self, show: &Show) -> Result<bool>;
    async fn update_status(&self, id: ShowId, status: ShowStatus) -> Result<()>;
    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Show>>;
    /// Non-canceled shows of the artist that have no setlist yet.
    async fn list_without_setlist(&self, artist_id: ArtistId) -> Result<Vec<Show>>;
    /// Non-canceled shows dated before `before` with no played setlist.
    async fn list_awaiting_played_setlist(
        &self,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Show>>;
    async fn list_trending_inputs(&self) -> Result<Vec<TrendingInput>>;
    async fn update_trending_scores(&self, scores: &[(ShowId, f64)]) -> Result<u64>;
    /// Mark scheduled shows dated before `today` as completed.
    async fn mark_past_completed(&self, today: NaiveDate) -> Result<u64>;
    async fn delete_canceled_before(&self, date: NaiveDate) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait SongRepository: Send + Sync {
    async fn count_by_artist(&self, artist_id: ArtistId) -> Result<i64>;
    /// Insert-or-ignore in one transaction. Returns the rows written.
    async fn insert_batch(&self, songs: &[Song]) -> Result<u64>;
    async fn top_by_popularity(&self, artist_id: ArtistId, limit: i64) -> Result<Vec<Song>>;
    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Song>>;
}

#[async_trait::async_trait]
pub trait SetlistRepository: Send + Sync {
    async fn get_by_show(&self, show_id: ShowId) -> Result<Option<Setlist>>;
    /// Create the setlist and its songs atomically. Returns `false` and
    /// writes nothing if the show already has a setlist.
    async fn create_with_songs(&self, setlist: &Setlist, songs: &[SetlistSong]) -> Result<bool>;
    async fn list_songs(&self, setlist_id: SetlistId) -> Result<Vec<SetlistSong>>;
}

#[async_trait::async_trait]
pub trait PlayedSetlistRepository: Send + Sync {
    async fn get_by_show(&self, show_id: ShowId) -> Result<Option<PlayedSetlist>>;
    /// Same contract as [`SetlistRepository::create_with_songs`].
    async fn create_with_songs(
        &self,
        played: &PlayedSetlist,
        songs: &[PlayedSetlistSong],
    ) -> Result<bool>;
    async fn list_songs(&self, played_id: PlayedSetlistId) -> Result<Vec<PlayedSetlistSong>>;
}
