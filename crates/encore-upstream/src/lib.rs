// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP clients for the music catalog, the ticketing discovery API and the
//! setlist history API.
//!
//! Every client sends its requests through a per-upstream [`RateLimiter`],
//! which enforces second/minute/day quotas and retries 429 answers with
//! exponential backoff. Payloads are validated into typed records at this
//! boundary.

pub mod catalog;
pub(crate) mod client;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod setlists;
pub mod ticketing;

pub use catalog::CatalogClient;
pub use error::{Result, UpstreamError};
pub use models::{
    CatalogAlbum, CatalogArtist, CatalogTrack, EventPage, EventPayload, EventQuery, Page,
    SetlistRecord, TicketingAttraction, TicketingEvent, TicketingVenue,
};
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
pub use setlists::SetlistClient;
pub use ticketing::TicketingClient;
