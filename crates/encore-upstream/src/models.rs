// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

// ============================================================================
// Music catalog
// ============================================================================

/// Artist as returned by the music catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    /// Upstream popularity, 0-100.
    #[serde(default)]
    pub popularity: Option<i64>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CatalogArtist {
    /// Largest image, which the catalog lists first.
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images.first().map(|image| image.url.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogImage {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlbumRef {
    pub id: Option<String>,
    pub name: String,
}

/// Track from either the top-tracks or the album-tracks endpoint. Album
/// listings omit `album` and `popularity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub popularity: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

/// Offset-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArtistSearchResponse {
    pub artists: Page<CatalogArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TopTracksResponse {
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_lifetime")]
    pub expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    3600
}

// ============================================================================
// Ticketing
// ============================================================================

/// Search parameters for the ticketing event search.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub keyword: Option<String>,
    pub attraction_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page: u32,
    pub size: u32,
}

impl EventQuery {
    pub fn keyword(keyword: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            attraction_id: None,
            start,
            end,
            page: 0,
            size: 100,
        }
    }

    pub fn attraction(
        attraction_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            keyword: None,
            attraction_id: Some(attraction_id.into()),
            start,
            end,
            page: 0,
            size: 100,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

/// Raw event search response. Events are left unvalidated so one malformed
/// entry does not discard its siblings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventSearchResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EventList>,
    #[serde(default)]
    pub page: Option<PageInfo>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<EventPayload>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageInfo {
    #[serde(default)]
    pub size: u32,
    #[serde(rename = "totalElements", default)]
    pub total_elements: u32,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    #[serde(default)]
    pub number: u32,
}

/// One page of event search results.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<EventPayload>,
    pub number: u32,
    pub total_pages: u32,
}

impl EventPage {
    pub fn has_more(&self) -> bool {
        self.number + 1 < self.total_pages
    }
}

impl From<EventSearchResponse> for EventPage {
    fn from(response: EventSearchResponse) -> Self {
        let page = response.page.unwrap_or_default();
        Self {
            events: response.embedded.map(|e| e.events).unwrap_or_default(),
            number: page.number,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub dates: Option<EventDates>,
    #[serde(rename = "_embedded")]
    pub embedded: Option<EventEmbedded>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventDates {
    pub start: Option<EventStart>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStart {
    #[serde(rename = "localDate")]
    pub local_date: Option<String>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStatus {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventEmbedded {
    #[serde(default)]
    pub venues: Vec<VenuePayload>,
    #[serde(default)]
    pub attractions: Vec<AttractionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VenuePayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub city: Option<NamedPayload>,
    pub state: Option<StatePayload>,
    pub country: Option<CountryPayload>,
    pub location: Option<LocationPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamedPayload {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatePayload {
    pub name: Option<String>,
    #[serde(rename = "stateCode")]
    pub state_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CountryPayload {
    pub name: Option<String>,
    #[serde(rename = "countryCode")]
    pub country_code: Option<String>,
}

/// The ticketing API sends coordinates as strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocationPayload {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttractionPayload {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Event that passed validation: it has an ID, a date, a venue and at least
/// one performer.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketingEvent {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    pub starts_at: Option<DateTime<Utc>>,
    pub status_code: Option<String>,
    pub venue: TicketingVenue,
    pub attractions: Vec<TicketingAttraction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketingVenue {
    pub id: String,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketingAttraction {
    pub id: Option<String>,
    pub name: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<EventPayload> for TicketingEvent {
    type Error = UpstreamError;

    fn try_from(payload: EventPayload) -> Result<Self, Self::Error> {
        let id = non_empty(payload.id)
            .ok_or_else(|| UpstreamError::Validation("event without id".to_string()))?;
        let name = non_empty(payload.name).unwrap_or_else(|| id.clone());

        let dates = payload.dates.unwrap_or_default();
        let start = dates.start.unwrap_or_default();
        let starts_at = start
            .date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let date = match start.local_date.as_deref() {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                UpstreamError::Validation(format!("event {id}: bad date {raw:?}: {e}"))
            })?,
            None => starts_at.map(|dt| dt.date_naive()).ok_or_else(|| {
                UpstreamError::Validation(format!("event {id}: missing start date"))
            })?,
        };

        let embedded = payload.embedded.unwrap_or_default();
        let venue = embedded
            .venues
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Validation(format!("event {id}: missing venue")))
            .and_then(|venue| TicketingVenue::try_from(venue).map_err(|e| {
                UpstreamError::Validation(format!("event {id}: {e}"))
            }))?;

        let attractions: Vec<TicketingAttraction> = embedded
            .attractions
            .into_iter()
            .filter_map(|a| {
                non_empty(a.name).map(|name| TicketingAttraction {
                    id: non_empty(a.id),
                    name,
                })
            })
            .collect();
        if attractions.is_empty() {
            return Err(UpstreamError::Validation(format!(
                "event {id}: no named attractions"
            )));
        }

        Ok(Self {
            id,
            name,
            date,
            starts_at,
            status_code: dates.status.and_then(|s| non_empty(s.code)),
            venue,
            attractions,
        })
    }
}

impl TryFrom<VenuePayload> for TicketingVenue {
    type Error = UpstreamError;

    fn try_from(payload: VenuePayload) -> Result<Self, Self::Error> {
        let id = non_empty(payload.id)
            .ok_or_else(|| UpstreamError::Validation("venue without id".to_string()))?;
        let name = non_empty(payload.name)
            .ok_or_else(|| UpstreamError::Validation(format!("venue {id} without name")))?;
        let location = payload.location.unwrap_or_default();

        Ok(Self {
            id,
            name,
            city: payload.city.and_then(|c| non_empty(c.name)),
            state: payload
                .state
                .and_then(|s| non_empty(s.state_code).or_else(|| non_empty(s.name))),
            country: payload
                .country
                .and_then(|c| non_empty(c.country_code).or_else(|| non_empty(c.name))),
            latitude: location.latitude.and_then(|v| v.trim().parse().ok()),
            longitude: location.longitude.and_then(|v| v.trim().parse().ok()),
        })
    }
}

// ============================================================================
// Setlist history
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SetlistSearchResponse {
    #[serde(default)]
    pub setlist: Vec<SetlistPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SetlistPayload {
    pub id: Option<String>,
    #[serde(rename = "eventDate")]
    pub event_date: Option<String>,
    pub venue: Option<SetlistVenuePayload>,
    #[serde(default)]
    pub sets: Option<SetsPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SetlistVenuePayload {
    pub name: Option<String>,
    pub city: Option<NamedPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SetsPayload {
    #[serde(default)]
    pub set: Vec<SetPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SetPayload {
    #[serde(default)]
    pub song: Vec<NamedPayload>,
    #[serde(default)]
    pub encore: Option<u32>,
}

/// A performed setlist with its songs flattened across sets and encores.
#[derive(Debug, Clone, PartialEq)]
pub struct SetlistRecord {
    pub id: String,
    pub event_date: NaiveDate,
    pub venue_name: Option<String>,
    pub city: Option<String>,
    pub songs: Vec<String>,
}

impl TryFrom<SetlistPayload> for SetlistRecord {
    type Error = UpstreamError;

    fn try_from(payload: SetlistPayload) -> Result<Self, Self::Error> {
        let id = non_empty(payload.id)
            .ok_or_else(|| UpstreamError::Validation("setlist without id".to_string()))?;
        let raw_date = payload
            .event_date
            .ok_or_else(|| UpstreamError::Validation(format!("setlist {id}: missing date")))?;
        let event_date = NaiveDate::parse_from_str(raw_date.trim(), "%d-%m-%Y").map_err(|e| {
            UpstreamError::Validation(format!("setlist {id}: bad date {raw_date:?}: {e}"))
        })?;

        let venue = payload.venue.unwrap_or_default();
        let songs = payload
            .sets
            .unwrap_or_default()
            .set
            .into_iter()
            .flat_map(|set| set.song)
            .filter_map(|song| non_empty(song.name))
            .collect();

        Ok(Self {
            id,
            event_date,
            venue_name: non_empty(venue.name),
            city: venue.city.and_then(|c| non_empty(c.name)),
            songs,
        })
    }
}
