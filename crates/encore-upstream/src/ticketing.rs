// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use chrono::SecondsFormat;
use encore_config::TicketingConfig;
use tracing::trace;
use url::Url;

use crate::client::{build_http_client, UpstreamHttp, DEFAULT_TIMEOUT};
use crate::error::{Result, UpstreamError};
use crate::models::{EventPage, EventQuery, EventSearchResponse};
use crate::rate_limiter::{RateLimitPolicy, RateLimiter};

const TICKETING_API_BASE: &str = "https://app.ticketmaster.com";
/// The discovery API refuses larger pages.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Ticketing discovery API client for upcoming events.
#[derive(Debug, Clone)]
pub struct TicketingClient {
    http: UpstreamHttp,
    base_url: String,
    api_key: String,
}

impl TicketingClient {
    pub fn builder() -> TicketingClientBuilder {
        TicketingClientBuilder::default()
    }

    pub fn from_config(config: &TicketingConfig, limiter: RateLimiter) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| UpstreamError::Unauthorized("ticketing api_key not set".to_string()))?;

        let mut builder = Self::builder().api_key(api_key).rate_limiter(limiter);
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url.clone());
        }
        builder.build()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.http.limiter()
    }

    /// One page of music events in the query's date range.
    pub async fn search_events(&self, query: &EventQuery) -> Result<EventPage> {
        let mut url = Url::parse(&format!(
            "{}/discovery/v2/events.json",
            self.base_url.trim_end_matches('/')
        ))
        .map_err(|e| UpstreamError::Validation(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("apikey", &self.api_key)
                .append_pair("classificationName", "music")
                .append_pair(
                    "startDateTime",
                    &query.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                )
                .append_pair(
                    "endDateTime",
                    &query.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                )
                .append_pair("size", &query.size.min(MAX_PAGE_SIZE).to_string())
                .append_pair("page", &query.page.to_string())
                .append_pair("sort", "date,asc");
            if let Some(keyword) = &query.keyword {
                pairs.append_pair("keyword", keyword);
            }
            if let Some(attraction_id) = &query.attraction_id {
                pairs.append_pair("attractionId", attraction_id);
            }
        }

        trace!(target: "upstream", page = query.page, "searching ticketing events");
        let response: EventSearchResponse = self
            .http
            .send_json(|client| client.get(url.clone()))
            .await?;
        Ok(response.into())
    }
}

/// Builder for [`TicketingClient`].
#[derive(Debug)]
pub struct TicketingClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl Default for TicketingClientBuilder {
    fn default() -> Self {
        Self {
            base_url: TICKETING_API_BASE.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            rate_limiter: None,
        }
    }
}

impl TicketingClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<TicketingClient> {
        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new("ticketing", RateLimitPolicy::per_second(5)));

        Ok(TicketingClient {
            http: UpstreamHttp::new(build_http_client(self.timeout)?, limiter),
            base_url: self.base_url,
            api_key: self.api_key,
        })
    }
}
