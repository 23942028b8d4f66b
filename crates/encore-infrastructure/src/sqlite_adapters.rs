// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use encore_domain::{Artist, ArtistId, Show, ShowId, ShowStatus, Venue, VenueId};
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::repositories::{ArtistRepository, ShowRepository, TrendingInput, VenueRepository};

// ============================================================================
// Artists
// ============================================================================

/// SQLx-backed Artist repository
pub struct SqliteArtistRepository {
    pool: SqlitePool,
}

impl SqliteArtistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Artist>> {
        let query = format!("SELECT * FROM artists WHERE {clause} LIMIT 1");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_artist(&r)).transpose()
    }
}

#[async_trait::async_trait]
impl ArtistRepository for SqliteArtistRepository {
    async fn get_by_id(&self, id: ArtistId) -> Result<Option<Artist>> {
        debug!(target: "repository", artist_id = %id, "fetching artist by id");
        self.fetch_one_where("id = ?", &id.to_string()).await
    }

    async fn get_by_catalog_id(&self, catalog_id: &str) -> Result<Option<Artist>> {
        debug!(target: "repository", catalog_id, "fetching artist by catalog id");
        self.fetch_one_where("catalog_id = ?", catalog_id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Artist>> {
        debug!(target: "repository", name, "fetching artist by name");
        self.fetch_one_where("name = ? COLLATE NOCASE", name.trim())
            .await
    }

    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Artist>> {
        debug!(target: "repository", ticketing_id, "fetching artist by ticketing id");
        self.fetch_one_where("ticketing_id = ?", ticketing_id).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Artist>> {
        debug!(target: "repository", limit, offset, "listing artists");
        let rows = sqlx::query("SELECT * FROM artists ORDER BY name LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_artist).collect()
    }

    async fn create(&self, entity: Artist) -> Result<Artist> {
        debug!(target: "repository", artist_id = %entity.id, name = %entity.name, "creating artist");
        let q = r#"
            INSERT OR IGNORE INTO artists (
                id, name, catalog_id, ticketing_id, image_url, popularity, genres,
                match_confidence, needs_review, needs_backfill, last_synced_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let inserted = sqlx::query(q)
            .bind(entity.id.to_string())
            .bind(&entity.name)
            .bind(&entity.catalog_id)
            .bind(&entity.ticketing_id)
            .bind(&entity.image_url)
            .bind(entity.popularity)
            .bind(serde_json::to_string(&entity.genres)?)
            .bind(entity.match_confidence)
            .bind(entity.needs_review)
            .bind(entity.needs_backfill)
            .bind(entity.last_synced_at.map(format_dt))
            .bind(format_dt(entity.created_at))
            .bind(format_dt(entity.updated_at))
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted > 0 {
            return Ok(entity);
        }

        let existing = match &entity.catalog_id {
            Some(catalog_id) => self.get_by_catalog_id(catalog_id).await?,
            None => self.get_by_id(entity.id).await?,
        };
        existing.ok_or_else(|| anyhow!("artist {} was ignored but not found", entity.id))
    }

    async fn attach_ticketing_id(&self, id: ArtistId, ticketing_id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE artists SET ticketing_id = ?, updated_at = ? WHERE id = ? AND ticketing_id IS NULL",
        )
        .bind(ticketing_id)
        .bind(format_dt(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated > 0 {
            debug!(target: "repository", artist_id = %id, ticketing_id, "attached ticketing id");
        }
        Ok(updated > 0)
    }

    async fn update_catalog_fields(&self, artist: &Artist) -> Result<()> {
        debug!(target: "repository", artist_id = %artist.id, "updating catalog fields");
        let q = r#"
            UPDATE artists SET
                name = ?,
                catalog_id = ?,
                image_url = ?,
                popularity = ?,
                genres = ?,
                match_confidence = ?,
                needs_review = ?,
                needs_backfill = ?,
                last_synced_at = ?,
                updated_at = ?
            WHERE id = ?
        "#;
        sqlx::query(q)
            .bind(&artist.name)
            .bind(&artist.catalog_id)
            .bind(&artist.image_url)
            .bind(artist.popularity)
            .bind(serde_json::to_string(&artist.genres)?)
            .bind(artist.match_confidence)
            .bind(artist.needs_review)
            .bind(artist.needs_backfill)
            .bind(artist.last_synced_at.map(format_dt))
            .bind(format_dt(artist.updated_at))
            .bind(artist.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_needing_backfill(&self, limit: i64) -> Result<Vec<Artist>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM artists
            WHERE needs_backfill = 1
            ORDER BY backfill_attempted_at IS NOT NULL, backfill_attempted_at, created_at
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_artist).collect()
    }

    async fn mark_backfill_attempted(&self, id: ArtistId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE artists SET backfill_attempted_at = ? WHERE id = ?")
            .bind(format_dt(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_show_sync(&self, limit: i64) -> Result<Vec<Artist>> {
        debug!(target: "repository", limit, "listing artists for show sync");
        let rows = sqlx::query(
            r#"
            SELECT * FROM artists
            ORDER BY shows_synced_at IS NOT NULL, shows_synced_at, name
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_artist).collect()
    }

    async fn mark_shows_synced(&self, id: ArtistId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE artists SET shows_synced_at = ? WHERE id = ?")
            .bind(format_dt(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_stale(&self, synced_before: DateTime<Utc>, limit: i64) -> Result<Vec<Artist>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM artists
            WHERE catalog_id IS NOT NULL
              AND (last_synced_at IS NULL OR last_synced_at < ?)
            ORDER BY last_synced_at IS NOT NULL, last_synced_at
            LIMIT ?
            "#,
        )
        .bind(format_dt(synced_before))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_artist).collect()
    }

    async fn delete_orphan_stubs(&self, created_before: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM artists
            WHERE catalog_id IS NULL
              AND created_at < ?
              AND NOT EXISTS (SELECT 1 FROM shows WHERE shows.artist_id = artists.id)
            "#,
        )
        .bind(format_dt(created_before))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }
}

fn row_to_artist(row: &sqlx::sqlite::SqliteRow) -> Result<Artist> {
    let id_str: String = row.try_get("id")?;
    let genres: String = row.try_get("genres")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    Ok(Artist {
        id: ArtistId::from_uuid(Uuid::parse_str(&id_str)?),
        name: row.try_get("name")?,
        catalog_id: row.try_get("catalog_id")?,
        ticketing_id: row.try_get("ticketing_id")?,
        image_url: row.try_get("image_url")?,
        popularity: row.try_get("popularity")?,
        genres: serde_json::from_str(&genres)?,
        match_confidence: row.try_get("match_confidence")?,
        needs_review: row.try_get("needs_review")?,
        needs_backfill: row.try_get("needs_backfill")?,
        last_synced_at: last_synced_at.map(parse_dt).transpose()?,
        created_at: parse_dt(row.try_get("created_at")?)?,
        updated_at: parse_dt(row.try_get("updated_at")?)?,
    })
}

// ============================================================================
// Venues
// ============================================================================

/// SQLx-backed Venue repository
pub struct SqliteVenueRepository {
    pool: SqlitePool,
}

impl SqliteVenueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VenueRepository for SqliteVenueRepository {
    async fn get_by_id(&self, id: VenueId) -> Result<Option<Venue>> {
        let row = sqlx::query("SELECT * FROM venues WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_venue(&r)).transpose()
    }

    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Venue>> {
        debug!(target: "repository", ticketing_id, "fetching venue by ticketing id");
        let row = sqlx::query("SELECT * FROM venues WHERE ticketing_id = ? LIMIT 1")
            .bind(ticketing_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_venue(&r)).transpose()
    }

    async fn create(&self, entity: Venue) -> Result<Venue> {
        debug!(target: "repository", venue_id = %entity.id, name = %entity.name, "creating venue");
        let q = r#"
            INSERT OR IGNORE INTO venues (
                id, ticketing_id, name, city, state, country, latitude, longitude,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let inserted = sqlx::query(q)
            .bind(entity.id.to_string())
            .bind(&entity.ticketing_id)
            .bind(&entity.name)
            .bind(&entity.city)
            .bind(&entity.state)
            .bind(&entity.country)
            .bind(entity.latitude)
            .bind(entity.longitude)
            .bind(format_dt(entity.created_at))
            .bind(format_dt(entity.updated_at))
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted > 0 {
            return Ok(entity);
        }
        self.get_by_ticketing_id(&entity.ticketing_id)
            .await?
            .ok_or_else(|| anyhow!("venue {} was ignored but not found", entity.ticketing_id))
    }

    async fn fill_missing(&self, venue: &Venue) -> Result<bool> {
        let q = r#"
            UPDATE venues SET
                city = COALESCE(city, ?),
                state = COALESCE(state, ?),
                country = COALESCE(country, ?),
                latitude = COALESCE(latitude, ?),
                longitude = COALESCE(longitude, ?),
                updated_at = ?
            WHERE ticketing_id = ?
              AND ((city IS NULL AND ? IS NOT NULL)
                OR (state IS NULL AND ? IS NOT NULL)
                OR (country IS NULL AND ? IS NOT NULL)
                OR (latitude IS NULL AND ? IS NOT NULL)
                OR (longitude IS NULL AND ? IS NOT NULL))
        "#;
        let updated = sqlx::query(q)
            .bind(&venue.city)
            .bind(&venue.state)
            .bind(&venue.country)
            .bind(venue.latitude)
            .bind(venue.longitude)
            .bind(format_dt(Utc::now()))
            .bind(&venue.ticketing_id)
            .bind(&venue.city)
            .bind(&venue.state)
            .bind(&venue.country)
            .bind(venue.latitude)
            .bind(venue.longitude)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }
}

fn row_to_venue(row: &sqlx::sqlite::SqliteRow) -> Result<Venue> {
    let id_str: String = row.try_get("id")?;
    Ok(Venue {
        id: VenueId::from_uuid(Uuid::parse_str(&id_str)?),
        ticketing_id: row.try_get("ticketing_id")?,
        name: row.try_get("name")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        created_at: parse_dt(row.try_get("created_at")?)?,
        updated_at: parse_dt(row.try_get("updated_at")?)?,
    })
}

// ============================================================================
// Shows
// ============================================================================

/// SQLx-backed Show repository
pub struct SqliteShowRepository {
    pool: SqlitePool,
}

impl SqliteShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ShowRepository for SqliteShowRepository {
    async fn get_by_id(&self, id: ShowId) -> Result<Option<Show>> {
        let row = sqlx::query("SELECT * FROM shows WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_show(&r)).transpose()
    }

    async fn get_by_ticketing_id(&self, ticketing_id: &str) -> Result<Option<Show>> {
        debug!(target: "repository", ticketing_id, "fetching show by ticketing id");
        let row = sqlx::query("SELECT * FROM shows WHERE ticketing_id = ? LIMIT 1")
            .bind(ticketing_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_show(&r)).transpose()
    }

    async fn get_by_natural_key(
        &self,
        artist_id: ArtistId,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Option<Show>> {
        let row = sqlx::query(
            "SELECT * FROM shows WHERE artist_id = ? AND venue_id = ? AND date = ? LIMIT 1",
        )
        .bind(artist_id.to_string())
        .bind(venue_id.to_string())
        .bind(format_date(date))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_show(&r)).transpose()
    }

    async fn insert(&self, show: &Show) -> Result<bool> {
        debug!(target: "repository", show_id = %show.id, ticketing_id = %show.ticketing_id, "inserting show");
        let q = r#"
            INSERT OR IGNORE INTO shows (
                id, ticketing_id, artist_id, venue_id, name, date, starts_at, status,
                view_count, trending_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let inserted = sqlx::query(q)
            .bind(show.id.to_string())
            .bind(&show.ticketing_id)
            .bind(show.artist_id.to_string())
            .bind(show.venue_id.to_string())
            .bind(&show.name)
            .bind(format_date(show.date))
            .bind(show.starts_at.map(format_dt))
            .bind(show.status.to_string())
            .bind(show.view_count)
            .bind(show.trending_score)
            .bind(format_dt(show.created_at))
            .bind(format_dt(show.updated_at))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(inserted > 0)
    }

    async fn update_status(&self, id: ShowId, status: ShowStatus) -> Result<()> {
        debug!(target: "repository", show_id = %id, %status, "updating show status");
        sqlx::query("UPDATE shows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_dt(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Show>> {
        let rows = sqlx::query("SELECT * FROM shows WHERE artist_id = ? ORDER BY date")
            .bind(artist_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_show).collect()
    }

    async fn list_without_setlist(&self, artist_id: ArtistId) -> Result<Vec<Show>> {
        let rows = sqlx::query(
            r#"
            SELECT s.* FROM shows s
            LEFT JOIN setlists sl ON sl.show_id = s.id
            WHERE s.artist_id = ? AND sl.id IS NULL AND s.status != 'canceled'
            ORDER BY s.date
            "#,
        )
        .bind(artist_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_show).collect()
    }

    async fn list_awaiting_played_setlist(
        &self,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Show>> {
        let rows = sqlx::query(
            r#"
            SELECT s.* FROM shows s
            LEFT JOIN played_setlists p ON p.show_id = s.id
            WHERE s.date < ? AND p.id IS NULL AND s.status != 'canceled'
            ORDER BY s.date DESC
            LIMIT ?
            "#,
        )
        .bind(format_date(before))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_show).collect()
    }

    async fn list_trending_inputs(&self) -> Result<Vec<TrendingInput>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.date, s.view_count, COALESCE(SUM(ss.vote_count), 0) AS total_votes
            FROM shows s
            LEFT JOIN setlists sl ON sl.show_id = s.id
            LEFT JOIN setlist_songs ss ON ss.setlist_id = sl.id
            WHERE s.status != 'canceled'
            GROUP BY s.id, s.date, s.view_count
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.try_get("id")?;
                let date: String = row.try_get("date")?;
                Ok(TrendingInput {
                    show_id: ShowId::from_uuid(Uuid::parse_str(&id_str)?),
                    date: parse_date(&date)?,
                    view_count: row.try_get("view_count")?,
                    total_votes: row.try_get("total_votes")?,
                })
            })
            .collect()
    }

    async fn update_trending_scores(&self, scores: &[(ShowId, f64)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for (id, score) in scores {
            updated += sqlx::query("UPDATE shows SET trending_score = ? WHERE id = ?")
                .bind(score)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn mark_past_completed(&self, today: NaiveDate) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE shows SET status = 'completed', updated_at = ? WHERE status = 'scheduled' AND date < ?",
        )
        .bind(format_dt(Utc::now()))
        .bind(format_date(today))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    async fn delete_canceled_before(&self, date: NaiveDate) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM shows WHERE status = 'canceled' AND date < ?")
            .bind(format_date(date))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

fn row_to_show(row: &sqlx::sqlite::SqliteRow) -> Result<Show> {
    let id_str: String = row.try_get("id")?;
    let artist_id: String = row.try_get("artist_id")?;
    let venue_id: String = row.try_get("venue_id")?;
    let date: String = row.try_get("date")?;
    let starts_at: Option<String> = row.try_get("starts_at")?;
    let status: String = row.try_get("status")?;

    Ok(Show {
        id: ShowId::from_uuid(Uuid::parse_str(&id_str)?),
        ticketing_id: row.try_get("ticketing_id")?,
        artist_id: ArtistId::from_uuid(Uuid::parse_str(&artist_id)?),
        venue_id: VenueId::from_uuid(Uuid::parse_str(&venue_id)?),
        name: row.try_get("name")?,
        date: parse_date(&date)?,
        starts_at: starts_at.map(parse_dt).transpose()?,
        status: status.parse::<ShowStatus>().map_err(|e| anyhow!(e))?,
        view_count: row.try_get("view_count")?,
        trending_score: row.try_get("trending_score")?,
        created_at: parse_dt(row.try_get("created_at")?)?,
        updated_at: parse_dt(row.try_get("updated_at")?)?,
    })
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Fixed-width UTC timestamps so stored values compare correctly as text.
pub(crate) fn format_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_dt(s: String) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Fallback to SQLite default CURRENT_TIMESTAMP format: "YYYY-MM-DD HH:MM:SS"
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}
