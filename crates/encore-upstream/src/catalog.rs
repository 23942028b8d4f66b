// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use encore_config::CatalogConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::client::{build_http_client, read_json, UpstreamHttp, DEFAULT_TIMEOUT};
use crate::error::{Result, UpstreamError};
use crate::models::{
    AccessTokenResponse, ArtistSearchResponse, CatalogAlbum, CatalogArtist, CatalogTrack, Page,
    TopTracksResponse,
};
use crate::rate_limiter::{RateLimitPolicy, RateLimiter};

const CATALOG_API_BASE: &str = "https://api.spotify.com";
const CATALOG_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Music catalog client (artists, albums, tracks) using the client
/// credentials grant. The access token is cached and refreshed a minute
/// before it expires.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: UpstreamHttp,
    base_url: String,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl CatalogClient {
    pub fn builder() -> CatalogClientBuilder {
        CatalogClientBuilder::default()
    }

    /// Build a client from configuration, sharing `limiter` with any other
    /// caller of the catalog.
    pub fn from_config(config: &CatalogConfig, limiter: RateLimiter) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| UpstreamError::Unauthorized("catalog client_id not set".to_string()))?;
        let client_secret = config.client_secret.clone().ok_or_else(|| {
            UpstreamError::Unauthorized("catalog client_secret not set".to_string())
        })?;

        let mut builder = Self::builder()
            .credentials(client_id, client_secret)
            .rate_limiter(limiter);
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url.clone());
        }
        if let Some(url) = &config.accounts_url {
            builder = builder.accounts_url(url.clone());
        }
        builder.build()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.http.limiter()
    }

    /// Artists matching `name`, best match first.
    pub async fn search_artists(&self, name: &str) -> Result<Vec<CatalogArtist>> {
        let mut url = self.url("/v1/search")?;
        url.query_pairs_mut()
            .append_pair("q", name)
            .append_pair("type", "artist")
            .append_pair("limit", &SEARCH_LIMIT.to_string());

        let response: ArtistSearchResponse = self.get(url).await?;
        Ok(response.artists.items)
    }

    pub async fn get_artist(&self, artist_id: &str) -> Result<CatalogArtist> {
        let url = self.url(&format!("/v1/artists/{artist_id}"))?;
        self.get(url).await
    }

    pub async fn get_artist_top_tracks(&self, artist_id: &str) -> Result<Vec<CatalogTrack>> {
        let mut url = self.url(&format!("/v1/artists/{artist_id}/top-tracks"))?;
        url.query_pairs_mut().append_pair("market", "US");

        let response: TopTracksResponse = self.get(url).await?;
        Ok(response.tracks)
    }

    pub async fn get_artist_albums(
        &self,
        artist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogAlbum>> {
        let mut url = self.url(&format!("/v1/artists/{artist_id}/albums"))?;
        url.query_pairs_mut()
            .append_pair("include_groups", "album,single")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.get(url).await
    }

    pub async fn get_album_tracks(
        &self,
        album_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<CatalogTrack>> {
        let mut url = self.url(&format!("/v1/albums/{album_id}/tracks"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.get(url).await
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .map_err(|e| UpstreamError::Validation(e.to_string()))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let token = self.access_token().await?;
        let result = self
            .http
            .send_json(|client| client.get(url.clone()).bearer_auth(&token))
            .await;

        if matches!(result, Err(UpstreamError::Unauthorized(_))) {
            debug!(target: "upstream", "catalog rejected token, clearing cache");
            self.token.lock().await.take();
        }
        result
    }

    /// Cached bearer token, refreshed when it is within a minute of expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/api/token", self.accounts_url.trim_end_matches('/'));
        let response = self
            .http
            .client()
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: AccessTokenResponse = read_json("catalog", response).await.map_err(|e| {
            match e {
                UpstreamError::Unauthorized(msg) | UpstreamError::ApiError { message: msg, .. } => {
                    UpstreamError::Unauthorized(format!("token request rejected: {msg}"))
                }
                other => other,
            }
        })?;

        info!(target: "upstream", expires_in = token.expires_in, "obtained catalog access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }
}

/// Builder for [`CatalogClient`].
#[derive(Debug)]
pub struct CatalogClientBuilder {
    base_url: String,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl Default for CatalogClientBuilder {
    fn default() -> Self {
        Self {
            base_url: CATALOG_API_BASE.to_string(),
            accounts_url: CATALOG_ACCOUNTS_BASE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout: DEFAULT_TIMEOUT,
            rate_limiter: None,
        }
    }
}

impl CatalogClientBuilder {
    /// Set a custom API base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set a custom token endpoint base URL.
    pub fn accounts_url(mut self, url: impl Into<String>) -> Self {
        self.accounts_url = url.into();
        self
    }

    pub fn credentials(mut self, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = secret.into();
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

    pub fn build(self) -> Result<CatalogClient> {
        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new("catalog", RateLimitPolicy::per_second(10)));

        Ok(CatalogClient {
            http: UpstreamHttp::new(build_http_client(self.timeout)?, limiter),
            base_url: self.base_url,
            accounts_url: self.accounts_url,
            client_id: self.client_id,
            client_secret: self.client_secret,
            token: Arc::new(Mutex::new(None)),
        })
    }
}
