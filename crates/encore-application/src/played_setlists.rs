// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use encore_domain::{
    normalize_name, Artist, PlayedSetlist, PlayedSetlistId, PlayedSetlistSong, PlayedSetlistSongId,
    Show, ShowId, SongId,
};
use encore_infrastructure::Repositories;
use encore_upstream::SetlistRecord;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::ports::SetlistHistory;
use crate::SyncStats;

/// Imports what was actually played at past shows and scores the seeded
/// prediction against it.
pub struct PlayedSetlistImporter {
    repos: Repositories,
    history: Arc<dyn SetlistHistory>,
    batch_limit: i64,
}

impl PlayedSetlistImporter {
    pub fn new(repos: Repositories, history: Arc<dyn SetlistHistory>, batch_limit: i64) -> Self {
        Self {
            repos,
            history,
            batch_limit,
        }
    }

    pub async fn import_recent(&self, today: NaiveDate) -> SyncResult<SyncStats> {
        let shows = self
            .repos
            .shows
            .list_awaiting_played_setlist(today, self.batch_limit)
            .await?;
        let mut stats = SyncStats::default();
        for show in &shows {
            match self.import_for_show(show).await {
                Ok(Some(_)) => stats.record_success(),
                Ok(None) => stats.record_skip(),
                Err(e) => {
                    warn!(target: "setlist_import", show_id = %show.id, error = %e, "played setlist import failed");
                    stats.record_failure();
                }
            }
        }
        info!(target: "setlist_import", shows = shows.len(), %stats, "played setlist import finished");
        Ok(stats)
    }

    /// `None` when the history has no setlist for the show's date yet.
    pub async fn import_for_show(&self, show: &Show) -> SyncResult<Option<PlayedSetlist>> {
        if let Some(existing) = self.repos.played_setlists.get_by_show(show.id).await? {
            return Ok(Some(existing));
        }

        let artist = self
            .repos
            .artists
            .get_by_id(show.artist_id)
            .await?
            .ok_or_else(|| SyncError::missing("artist", show.artist_id))?;
        let venue_name = self
            .repos
            .venues
            .get_by_id(show.venue_id)
            .await?
            .map(|venue| venue.name);

        let Some(record) = self.find_record(&artist, show.date, venue_name.as_deref()).await? else {
            debug!(target: "setlist_import", show_id = %show.id, artist = %artist.name, date = %show.date, "no played setlist found");
            return Ok(None);
        };

        let played_id = PlayedSetlistId::new();
        let songs = self.link_songs(&artist, played_id, &record.songs).await?;
        let accuracy = self.prediction_accuracy(show.id, &songs).await?;

        let played = PlayedSetlist {
            id: played_id,
            show_id: show.id,
            upstream_id: record.id.clone(),
            event_date: record.event_date,
            accuracy,
            imported_at: Utc::now(),
        };

        if !self.repos.played_setlists.create_with_songs(&played, &songs).await? {
            return Ok(self.repos.played_setlists.get_by_show(show.id).await?);
        }

        info!(
            target: "setlist_import",
            show_id = %show.id,
            setlist_id = %record.id,
            songs = songs.len(),
            accuracy = ?accuracy,
            "imported played setlist"
        );
        Ok(Some(played))
    }

    /// Search with the venue first, then by artist and date alone.
    async fn find_record(
        &self,
        artist: &Artist,
        date: NaiveDate,
        venue_name: Option<&str>,
    ) -> SyncResult<Option<SetlistRecord>> {
        let pick = |records: Vec<SetlistRecord>| {
            records
                .into_iter()
                .find(|r| r.event_date == date && !r.songs.is_empty())
        };

        let records = self
            .history
            .search_setlists(&artist.name, date, venue_name)
            .await?;
        if let Some(record) = pick(records) {
            return Ok(Some(record));
        }
        if venue_name.is_none() {
            return Ok(None);
        }

        let records = self.history.search_setlists(&artist.name, date, None).await?;
        Ok(pick(records))
    }

    async fn link_songs(
        &self,
        artist: &Artist,
        played_id: PlayedSetlistId,
        titles: &[String],
    ) -> SyncResult<Vec<PlayedSetlistSong>> {
        let mut by_title: HashMap<String, SongId> = HashMap::new();
        for song in self.repos.songs.list_by_artist(artist.id).await? {
            by_title.entry(song.normalized_title).or_insert(song.id);
        }

        Ok(titles
            .iter()
            .enumerate()
            .map(|(index, title)| PlayedSetlistSong {
                id: PlayedSetlistSongId::new(),
                played_setlist_id: played_id,
                song_id: by_title.get(&normalize_name(title)).copied(),
                title: title.clone(),
                position: index as i64 + 1,
            })
            .collect())
    }

    /// Share of the seeded setlist's songs that were played; `None` when
    /// the show had no prediction.
    async fn prediction_accuracy(
        &self,
        show_id: ShowId,
        played: &[PlayedSetlistSong],
    ) -> SyncResult<Option<f64>> {
        let Some(setlist) = self.repos.setlists.get_by_show(show_id).await? else {
            return Ok(None);
        };
        let predicted = self.repos.setlists.list_songs(setlist.id).await?;
        if predicted.is_empty() {
            return Ok(None);
        }

        let played: HashSet<SongId> = played.iter().filter_map(|s| s.song_id).collect();
        let hits = predicted.iter().filter(|p| played.contains(&p.song_id)).count();
        Ok(Some(hits as f64 / predicted.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, FakeCatalog, FakeEvents, FakeHistory, TestHarness};
    use encore_domain::{Setlist, SetlistSong, Song, Venue};

    fn record(id: &str, on: NaiveDate, venue: &str, songs: &[&str]) -> SetlistRecord {
        SetlistRecord {
            id: id.to_string(),
            event_date: on,
            venue_name: Some(venue.to_string()),
            city: None,
            songs: songs.iter().map(|s| s.to_string()).collect(),
        }
    }

    struct Fixture {
        harness: TestHarness,
        show: Show,
        songs: Vec<Song>,
    }

    async fn fixture(history: FakeHistory) -> Fixture {
        let harness =
            TestHarness::with_upstreams(FakeCatalog::default(), FakeEvents::default(), history).await;
        let artist = harness.repos.artists.create(Artist::new("Paramore")).await.unwrap();
        let venue = harness
            .repos
            .venues
            .create(Venue::new("v-1", "Madison Square Garden"))
            .await
            .unwrap();
        let show = Show::new("ev-1", artist.id, venue.id, "This Is Why Tour", date(2026, 3, 10));
        harness.repos.shows.insert(&show).await.unwrap();

        let songs: Vec<Song> = ["Misery Business", "Decode", "Still Into You", "Hard Times", "Ain't It Fun"]
            .iter()
            .map(|title| Song::new(artist.id, *title, None))
            .collect();
        harness.repos.songs.insert_batch(&songs).await.unwrap();

        let setlist = Setlist::new(show.id);
        let entries: Vec<_> = songs
            .iter()
            .enumerate()
            .map(|(i, song)| SetlistSong::new(setlist.id, song.id, i as i64 + 1))
            .collect();
        harness.repos.setlists.create_with_songs(&setlist, &entries).await.unwrap();

        Fixture {
            harness,
            show,
            songs,
        }
    }

    #[tokio::test]
    async fn imports_played_songs_and_scores_prediction() {
        let history = FakeHistory::default().with_record(record(
            "63de4613",
            date(2026, 3, 10),
            "Madison Square Garden",
            &["Hard Times", "misery business", "Brand New Song", "Decode"],
        ));
        let fx = fixture(history).await;

        let stats = fx
            .harness
            .pipeline
            .played
            .import_recent(date(2026, 3, 12))
            .await
            .unwrap();
        assert_eq!(stats.succeeded, 1);

        let played = fx
            .harness
            .repos
            .played_setlists
            .get_by_show(fx.show.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(played.upstream_id, "63de4613");
        assert!((played.accuracy.unwrap() - 0.6).abs() < 1e-9);

        let songs = fx.harness.repos.played_setlists.list_songs(played.id).await.unwrap();
        assert_eq!(songs.len(), 4);
        assert_eq!(songs[0].song_id, Some(fx.songs[3].id));
        assert_eq!(songs[1].song_id, Some(fx.songs[0].id));
        assert_eq!(songs[2].song_id, None);
        assert_eq!(songs[2].title, "Brand New Song");
        assert_eq!(songs.iter().map(|s| s.position).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let again = fx
            .harness
            .pipeline
            .played
            .import_recent(date(2026, 3, 12))
            .await
            .unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn falls_back_to_search_without_venue() {
        let history = FakeHistory::default().with_record(record(
            "abc",
            date(2026, 3, 10),
            "MSG",
            &["Decode"],
        ));
        let fx = fixture(history).await;

        let played = fx.harness.pipeline.played.import_for_show(&fx.show).await.unwrap();

        assert!(played.is_some());
        assert_eq!(fx.harness.history.calls(), 2);
    }

    #[tokio::test]
    async fn missing_or_empty_setlists_are_skipped() {
        let history = FakeHistory::default()
            .with_record(record("empty", date(2026, 3, 10), "Madison Square Garden", &[]))
            .with_record(record("other-day", date(2026, 3, 11), "Madison Square Garden", &["Decode"]));
        let fx = fixture(history).await;

        let stats = fx
            .harness
            .pipeline
            .played
            .import_recent(date(2026, 3, 12))
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert!(fx
            .harness
            .repos
            .played_setlists
            .get_by_show(fx.show.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn future_shows_are_not_looked_up() {
        let fx = fixture(FakeHistory::default()).await;

        let stats = fx
            .harness
            .pipeline
            .played
            .import_recent(date(2026, 3, 1))
            .await
            .unwrap();

        assert_eq!(stats, SyncStats::default());
        assert_eq!(fx.harness.history.calls(), 0);
    }
}
