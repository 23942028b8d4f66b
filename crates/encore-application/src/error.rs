// SPDX-License-Identifier: GPL-3.0-or-later

use encore_upstream::UpstreamError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failure of one sync step for one item.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Repository(#[from] anyhow::Error),

    #[error("invalid data: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    MissingEntity { kind: &'static str, id: String },
}

impl SyncError {
    pub fn missing(kind: &'static str, id: impl ToString) -> Self {
        Self::MissingEntity {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether a later run may succeed without any data changing.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(err) => err.is_transient(),
            Self::Repository(_) => true,
            Self::Validation(_) | Self::MissingEntity { .. } => false,
        }
    }
}
