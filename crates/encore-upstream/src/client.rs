// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{Result, UpstreamError};
use crate::rate_limiter::RateLimiter;

pub(crate) const USER_AGENT: &str = concat!(
    "Encore/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/encore-live/encore )"
);

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Reqwest client paired with the limiter of the upstream it talks to.
#[derive(Debug, Clone)]
pub(crate) struct UpstreamHttp {
    client: Client,
    limiter: RateLimiter,
}

impl UpstreamHttp {
    pub(crate) fn new(client: Client, limiter: RateLimiter) -> Self {
        Self { client, limiter }
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send the request built by `request` under the upstream's quota and
    /// decode a JSON body. The builder runs again for every 429 retry.
    pub(crate) async fn send_json<T, F>(&self, request: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let upstream = self.limiter.upstream();
        self.limiter
            .execute(|| {
                let builder = request(&self.client);
                async move {
                    let response = builder.send().await?;
                    read_json(upstream, response).await
                }
            })
            .await
    }
}

/// Map the response status onto [`UpstreamError`] and parse the body.
pub(crate) async fn read_json<T: DeserializeOwned>(upstream: &str, response: Response) -> Result<T> {
    let status = response.status();
    let url = response.url().to_string();
    debug!(target: "upstream", %upstream, %status, "response received");

    if status.is_success() {
        let body = response.text().await?;
        trace!(target: "upstream", %upstream, "response body: {}", body);
        return serde_json::from_str(&body).map_err(|e| {
            UpstreamError::Validation(format!("{upstream}: failed to parse response: {e}"))
        });
    }

    match status {
        StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(url)),
        StatusCode::TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited {
            upstream: upstream.to_string(),
            retry_after: retry_after(&response),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(UpstreamError::Unauthorized(format!("{upstream}: {status}")))
        }
        s if s.is_server_error() => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            Err(UpstreamError::Unavailable {
                upstream: upstream.to_string(),
                message,
            })
        }
        _ => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(UpstreamError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
