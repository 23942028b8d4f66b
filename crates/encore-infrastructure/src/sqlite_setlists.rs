// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use encore_domain::{
    ArtistId, PlayedSetlist, PlayedSetlistId, PlayedSetlistSong, PlayedSetlistSongId, Setlist,
    SetlistId, SetlistSong, SetlistSongId, ShowId, Song, SongId,
};
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::repositories::{PlayedSetlistRepository, SetlistRepository, SongRepository};
use crate::sqlite_adapters::{format_date, format_dt, parse_date, parse_dt};

// ============================================================================
// Songs
// ============================================================================

/// SQLx-backed Song repository
pub struct SqliteSongRepository {
    pool: SqlitePool,
}

impl SqliteSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SongRepository for SqliteSongRepository {
    async fn count_by_artist(&self, artist_id: ArtistId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs WHERE artist_id = ?")
            .bind(artist_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_batch(&self, songs: &[Song]) -> Result<u64> {
        if songs.is_empty() {
            return Ok(0);
        }

        let q = r#"
            INSERT OR IGNORE INTO songs (
                id, artist_id, catalog_track_id, title, album, normalized_title,
                normalized_album, popularity, duration_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for song in songs {
            inserted += sqlx::query(q)
                .bind(song.id.to_string())
                .bind(song.artist_id.to_string())
                .bind(&song.catalog_track_id)
                .bind(&song.title)
                .bind(&song.album)
                .bind(&song.normalized_title)
                .bind(&song.normalized_album)
                .bind(song.popularity)
                .bind(song.duration_ms)
                .bind(format_dt(song.created_at))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(target: "repository", batch = songs.len(), inserted, "upserted song batch");
        Ok(inserted)
    }

    async fn top_by_popularity(&self, artist_id: ArtistId, limit: i64) -> Result<Vec<Song>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM songs
            WHERE artist_id = ?
            ORDER BY popularity IS NULL, popularity DESC, title
            LIMIT ?
            "#,
        )
        .bind(artist_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_song).collect()
    }

    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Song>> {
        let rows = sqlx::query("SELECT * FROM songs WHERE artist_id = ? ORDER BY title")
            .bind(artist_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_song).collect()
    }
}

fn row_to_song(row: &sqlx::sqlite::SqliteRow) -> Result<Song> {
    let id_str: String = row.try_get("id")?;
    let artist_id: String = row.try_get("artist_id")?;
    Ok(Song {
        id: SongId::from_uuid(Uuid::parse_str(&id_str)?),
        artist_id: ArtistId::from_uuid(Uuid::parse_str(&artist_id)?),
        catalog_track_id: row.try_get("catalog_track_id")?,
        title: row.try_get("title")?,
        album: row.try_get("album")?,
        normalized_title: row.try_get("normalized_title")?,
        normalized_album: row.try_get("normalized_album")?,
        popularity: row.try_get("popularity")?,
        duration_ms: row.try_get("duration_ms")?,
        created_at: parse_dt(row.try_get("created_at")?)?,
    })
}

// ============================================================================
// Predicted setlists
// ============================================================================

/// SQLx-backed Setlist repository
pub struct SqliteSetlistRepository {
    pool: SqlitePool,
}

impl SqliteSetlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SetlistRepository for SqliteSetlistRepository {
    async fn get_by_show(&self, show_id: ShowId) -> Result<Option<Setlist>> {
        let row = sqlx::query("SELECT * FROM setlists WHERE show_id = ? LIMIT 1")
            .bind(show_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let id: String = r.try_get("id")?;
            let show_id: String = r.try_get("show_id")?;
            Ok(Setlist {
                id: SetlistId::from_uuid(Uuid::parse_str(&id)?),
                show_id: ShowId::from_uuid(Uuid::parse_str(&show_id)?),
                created_at: parse_dt(r.try_get("created_at")?)?,
            })
        })
        .transpose()
    }

    async fn create_with_songs(&self, setlist: &Setlist, songs: &[SetlistSong]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            "INSERT OR IGNORE INTO setlists (id, show_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(setlist.id.to_string())
        .bind(setlist.show_id.to_string())
        .bind(format_dt(setlist.created_at))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if created == 0 {
            tx.rollback().await?;
            debug!(target: "repository", show_id = %setlist.show_id, "setlist already present");
            return Ok(false);
        }

        for song in songs {
            sqlx::query(
                r#"
                INSERT INTO setlist_songs (id, setlist_id, song_id, position, vote_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(song.id.to_string())
            .bind(song.setlist_id.to_string())
            .bind(song.song_id.to_string())
            .bind(song.position)
            .bind(song.vote_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(target: "repository", show_id = %setlist.show_id, songs = songs.len(), "created setlist");
        Ok(true)
    }

    async fn list_songs(&self, setlist_id: SetlistId) -> Result<Vec<SetlistSong>> {
        let rows =
            sqlx::query("SELECT * FROM setlist_songs WHERE setlist_id = ? ORDER BY position")
                .bind(setlist_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|r| {
                let id: String = r.try_get("id")?;
                let setlist_id: String = r.try_get("setlist_id")?;
                let song_id: String = r.try_get("song_id")?;
                Ok(SetlistSong {
                    id: SetlistSongId::from_uuid(Uuid::parse_str(&id)?),
                    setlist_id: SetlistId::from_uuid(Uuid::parse_str(&setlist_id)?),
                    song_id: SongId::from_uuid(Uuid::parse_str(&song_id)?),
                    position: r.try_get("position")?,
                    vote_count: r.try_get("vote_count")?,
                })
            })
            .collect()
    }
}

// ============================================================================
// Played setlists
// ============================================================================

/// SQLx-backed PlayedSetlist repository
pub struct SqlitePlayedSetlistRepository {
    pool: SqlitePool,
}

impl SqlitePlayedSetlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PlayedSetlistRepository for SqlitePlayedSetlistRepository {
    async fn get_by_show(&self, show_id: ShowId) -> Result<Option<PlayedSetlist>> {
        let row = sqlx::query("SELECT * FROM played_setlists WHERE show_id = ? LIMIT 1")
            .bind(show_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let id: String = r.try_get("id")?;
            let show_id: String = r.try_get("show_id")?;
            let event_date: String = r.try_get("event_date")?;
            Ok(PlayedSetlist {
                id: PlayedSetlistId::from_uuid(Uuid::parse_str(&id)?),
                show_id: ShowId::from_uuid(Uuid::parse_str(&show_id)?),
                upstream_id: r.try_get("upstream_id")?,
                event_date: parse_date(&event_date)?,
                accuracy: r.try_get("accuracy")?,
                imported_at: parse_dt(r.try_get("imported_at")?)?,
            })
        })
        .transpose()
    }

    async fn create_with_songs(
        &self,
        played: &PlayedSetlist,
        songs: &[PlayedSetlistSong],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            r#"
            INSERT OR IGNORE INTO played_setlists (id, show_id, upstream_id, event_date, accuracy, imported_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(played.id.to_string())
        .bind(played.show_id.to_string())
        .bind(&played.upstream_id)
        .bind(format_date(played.event_date))
        .bind(played.accuracy)
        .bind(format_dt(played.imported_at))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if created == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for song in songs {
            sqlx::query(
                r#"
                INSERT INTO played_setlist_songs (id, played_setlist_id, song_id, title, position)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(song.id.to_string())
            .bind(song.played_setlist_id.to_string())
            .bind(song.song_id.map(|id| id.to_string()))
            .bind(&song.title)
            .bind(song.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(target: "repository", show_id = %played.show_id, songs = songs.len(), "stored played setlist");
        Ok(true)
    }

    async fn list_songs(&self, played_id: PlayedSetlistId) -> Result<Vec<PlayedSetlistSong>> {
        let rows = sqlx::query(
            "SELECT * FROM played_setlist_songs WHERE played_setlist_id = ? ORDER BY position",
        )
        .bind(played_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let id: String = r.try_get("id")?;
                let played_id: String = r.try_get("played_setlist_id")?;
                let song_id: Option<String> = r.try_get("song_id")?;
                Ok(PlayedSetlistSong {
                    id: PlayedSetlistSongId::from_uuid(Uuid::parse_str(&id)?),
                    played_setlist_id: PlayedSetlistId::from_uuid(Uuid::parse_str(&played_id)?),
                    song_id: song_id
                        .map(|s| Uuid::parse_str(&s).map(SongId::from_uuid))
                        .transpose()?,
                    title: r.try_get("title")?,
                    position: r.try_get("position")?,
                })
            })
            .collect()
    }
}
