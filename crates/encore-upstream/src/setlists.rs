// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use chrono::NaiveDate;
use encore_config::SetlistsConfig;
use tracing::{debug, warn};
use url::Url;

use crate::client::{build_http_client, UpstreamHttp, DEFAULT_TIMEOUT};
use crate::error::{Result, UpstreamError};
use crate::models::{SetlistRecord, SetlistSearchResponse};
use crate::rate_limiter::{RateLimitPolicy, RateLimiter};

const SETLISTS_API_BASE: &str = "https://api.setlist.fm";

/// Setlist history API client for performed setlists.
#[derive(Debug, Clone)]
pub struct SetlistClient {
    http: UpstreamHttp,
    base_url: String,
    api_key: String,
}

impl SetlistClient {
    pub fn builder() -> SetlistClientBuilder {
        SetlistClientBuilder::default()
    }

    pub fn from_config(config: &SetlistsConfig, limiter: RateLimiter) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| UpstreamError::Unauthorized("setlists api_key not set".to_string()))?;

        let mut builder = Self::builder().api_key(api_key).rate_limiter(limiter);
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url.clone());
        }
        builder.build()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.http.limiter()
    }

    /// Setlists performed by `artist_name` on `date`, optionally narrowed to
    /// a venue. An unknown combination yields an empty list; malformed
    /// entries are skipped.
    pub async fn search_setlists(
        &self,
        artist_name: &str,
        date: NaiveDate,
        venue_name: Option<&str>,
    ) -> Result<Vec<SetlistRecord>> {
        let mut url = Url::parse(&format!(
            "{}/rest/1.0/search/setlists",
            self.base_url.trim_end_matches('/')
        ))
        .map_err(|e| UpstreamError::Validation(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("artistName", artist_name)
                .append_pair("date", &date.format("%d-%m-%Y").to_string());
            if let Some(venue) = venue_name {
                pairs.append_pair("venueName", venue);
            }
        }

        let response: SetlistSearchResponse = match self
            .http
            .send_json(|client| {
                client
                    .get(url.clone())
                    .header("x-api-key", &self.api_key)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await
        {
            Ok(response) => response,
            Err(UpstreamError::NotFound(_)) => {
                debug!(target: "upstream", artist = artist_name, %date, "no setlists found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(response
            .setlist
            .into_iter()
            .filter_map(|payload| match SetlistRecord::try_from(payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(target: "upstream", error = %e, "skipping malformed setlist");
                    None
                }
            })
            .collect())
    }
}

/// Builder for [`SetlistClient`].
#[derive(Debug)]
pub struct SetlistClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl Default for SetlistClientBuilder {
    fn default() -> Self {
        Self {
            base_url: SETLISTS_API_BASE.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            rate_limiter: None,
        }
    }
}

impl SetlistClientBuilder {
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

    pub fn build(self) -> Result<SetlistClient> {
        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new("setlists", RateLimitPolicy::per_second(2)));

        Ok(SetlistClient {
            http: UpstreamHttp::new(build_http_client(self.timeout)?, limiter),
            base_url: self.base_url,
            api_key: self.api_key,
        })
    }
}
