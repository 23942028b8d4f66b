// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(ArtistId);
uuid_id!(VenueId);
uuid_id!(ShowId);
uuid_id!(SongId);
uuid_id!(SetlistId);
uuid_id!(SetlistSongId);
uuid_id!(PlayedSetlistId);
uuid_id!(PlayedSetlistSongId);

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    Scheduled,
    Postponed,
    Canceled,
    Completed,
}

impl ShowStatus {
    /// Map a ticketing status code ("onsale", "cancelled", ...) onto a show status.
    ///
    /// Unknown and missing codes are treated as scheduled; `completed` is never
    /// produced here because upstreams do not report it.
    pub fn from_upstream_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("cancelled") | Some("canceled") => Self::Canceled,
            Some("postponed") => Self::Postponed,
            _ => Self::Scheduled,
        }
    }
}

impl std::fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Postponed => write!(f, "postponed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for ShowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "postponed" => Ok(Self::Postponed),
            "canceled" => Ok(Self::Canceled),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown show status: {}", other)),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Canonical artist, unified across the catalog and ticketing identity spaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    /// Music catalog ID. Unique when present.
    pub catalog_id: Option<String>,
    /// Ticketing attraction ID. Attached opportunistically, not unique.
    pub ticketing_id: Option<String>,
    pub image_url: Option<String>,
    pub popularity: Option<i64>,
    pub genres: Vec<String>,
    pub match_confidence: Option<f64>,
    pub needs_review: bool,
    /// Set on stub artists created without a confident catalog match.
    pub needs_backfill: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ArtistId::new(),
            name: name.into(),
            catalog_id: None,
            ticketing_id: None,
            image_url: None,
            popularity: None,
            genres: Vec::new(),
            match_confidence: None,
            needs_review: false,
            needs_backfill: false,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Minimal artist carrying only a name and whatever ticketing ID is known.
    pub fn stub(name: impl Into<String>, ticketing_id: Option<String>) -> Self {
        Self {
            ticketing_id,
            needs_backfill: true,
            ..Self::new(name)
        }
    }

    pub fn is_stub(&self) -> bool {
        self.catalog_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    pub id: VenueId,
    pub ticketing_id: String,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(ticketing_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: VenueId::new(),
            ticketing_id: ticketing_id.into(),
            name: name.into(),
            city: None,
            state: None,
            country: None,
            latitude: None,
            longitude: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Show {
    pub id: ShowId,
    pub ticketing_id: String,
    pub artist_id: ArtistId,
    pub venue_id: VenueId,
    pub name: String,
    pub date: NaiveDate,
    pub starts_at: Option<DateTime<Utc>>,
    pub status: ShowStatus,
    pub view_count: i64,
    pub trending_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Show {
    pub fn new(
        ticketing_id: impl Into<String>,
        artist_id: ArtistId,
        venue_id: VenueId,
        name: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ShowId::new(),
            ticketing_id: ticketing_id.into(),
            artist_id,
            venue_id,
            name: name.into(),
            date,
            starts_at: None,
            status: ShowStatus::Scheduled,
            view_count: 0,
            trending_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub id: SongId,
    pub artist_id: ArtistId,
    pub catalog_track_id: Option<String>,
    pub title: String,
    pub album: Option<String>,
    pub normalized_title: String,
    pub normalized_album: String,
    pub popularity: Option<i64>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Song {
    pub fn new(artist_id: ArtistId, title: impl Into<String>, album: Option<String>) -> Self {
        let title = title.into();
        let (normalized_title, normalized_album) = song_dedup_key(&title, album.as_deref());
        Self {
            id: SongId::new(),
            artist_id,
            catalog_track_id: None,
            title,
            album,
            normalized_title,
            normalized_album,
            popularity: None,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setlist {
    pub id: SetlistId,
    pub show_id: ShowId,
    pub created_at: DateTime<Utc>,
}

impl Setlist {
    pub fn new(show_id: ShowId) -> Self {
        Self {
            id: SetlistId::new(),
            show_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetlistSong {
    pub id: SetlistSongId,
    pub setlist_id: SetlistId,
    pub song_id: SongId,
    pub position: i64,
    pub vote_count: i64,
}

impl SetlistSong {
    pub fn new(setlist_id: SetlistId, song_id: SongId, position: i64) -> Self {
        Self {
            id: SetlistSongId::new(),
            setlist_id,
            song_id,
            position,
            vote_count: 0,
        }
    }
}

/// The setlist actually performed at a show, imported after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayedSetlist {
    pub id: PlayedSetlistId,
    pub show_id: ShowId,
    pub upstream_id: String,
    pub event_date: NaiveDate,
    /// Share of predicted songs that were actually played.
    pub accuracy: Option<f64>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayedSetlistSong {
    pub id: PlayedSetlistSongId,
    pub played_setlist_id: PlayedSetlistId,
    pub song_id: Option<SongId>,
    pub title: String,
    pub position: i64,
}

// ============================================================================
// Name normalization
// ============================================================================

/// Lowercase, fold accents, strip punctuation, and collapse whitespace.
///
/// `"Beyoncé"` and `"beyonce"` normalize identically; `"AC/DC"` becomes `"acdc"`.
pub fn normalize_name(value: &str) -> String {
    value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Key used to collapse the same recording appearing on several releases.
pub fn song_dedup_key(title: &str, album: Option<&str>) -> (String, String) {
    (
        normalize_name(title),
        album.map(normalize_name).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_accents_and_punctuation() {
        assert_eq!(normalize_name("Beyoncé"), "beyonce");
        assert_eq!(normalize_name("  AC/DC "), "acdc");
        assert_eq!(normalize_name("Guns N' Roses"), "guns n roses");
        assert_eq!(normalize_name("Sigur   Rós"), "sigur ros");
    }

    #[test]
    fn song_dedup_key_ignores_case_and_missing_album() {
        let a = song_dedup_key("Blinding Lights", Some("After Hours"));
        let b = song_dedup_key("blinding lights!", Some("AFTER HOURS"));
        assert_eq!(a, b);
        assert_eq!(song_dedup_key("Intro", None).1, "");
    }

    #[test]
    fn upstream_status_codes_map_to_show_status() {
        assert_eq!(ShowStatus::from_upstream_code(Some("onsale")), ShowStatus::Scheduled);
        assert_eq!(ShowStatus::from_upstream_code(Some("cancelled")), ShowStatus::Canceled);
        assert_eq!(ShowStatus::from_upstream_code(Some("Canceled")), ShowStatus::Canceled);
        assert_eq!(ShowStatus::from_upstream_code(Some("postponed")), ShowStatus::Postponed);
        assert_eq!(ShowStatus::from_upstream_code(Some("rescheduled")), ShowStatus::Scheduled);
        assert_eq!(ShowStatus::from_upstream_code(None), ShowStatus::Scheduled);
    }

    #[test]
    fn show_status_round_trips_through_text() {
        for status in [
            ShowStatus::Scheduled,
            ShowStatus::Postponed,
            ShowStatus::Canceled,
            ShowStatus::Completed,
        ] {
            assert_eq!(status.to_string().parse::<ShowStatus>(), Ok(status));
        }
        assert!("finished".parse::<ShowStatus>().is_err());
    }

    #[test]
    fn stub_artist_is_flagged_for_backfill() {
        let artist = Artist::stub("Ed Sheeran", Some("K8vZ917Gku7".to_string()));
        assert!(artist.needs_backfill);
        assert!(artist.is_stub());
        assert_eq!(artist.ticketing_id.as_deref(), Some("K8vZ917Gku7"));
    }

    #[test]
    fn new_setlist_song_starts_without_votes() {
        let song = SetlistSong::new(SetlistId::new(), SongId::new(), 1);
        assert_eq!(song.vote_count, 0);
        assert_eq!(song.position, 1);
    }
}
