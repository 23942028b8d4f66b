// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UpstreamError>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Raw "too many requests" answer; retried inside the rate limiter.
    #[error("{upstream} answered 429 Too Many Requests")]
    RateLimited {
        upstream: String,
        retry_after: Option<Duration>,
    },

    #[error("{upstream} rate limit still exceeded after {attempts} attempts")]
    RateLimitExceeded { upstream: String, attempts: u32 },

    #[error("request to {upstream} waited more than {waited:?} in queue")]
    QueueTimeout { upstream: String, waited: Duration },

    #[error("{upstream} request queue is full ({capacity} pending)")]
    QueueFull { upstream: String, capacity: usize },

    #[error("{upstream} unavailable: {message}")]
    Unavailable { upstream: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid upstream payload: {0}")]
    Validation(String),
}

impl UpstreamError {
    /// Errors worth another attempt at the job level (network trouble, 5xx,
    /// exhausted quota).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(err) => err.is_timeout() || err.is_connect(),
            Self::Unavailable { .. } | Self::RateLimitExceeded { .. } => true,
            _ => false,
        }
    }
}
