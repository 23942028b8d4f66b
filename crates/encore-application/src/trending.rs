// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use chrono::NaiveDate;
use encore_infrastructure::repositories::ShowRepository;
use tracing::info;

use crate::error::SyncResult;

const VOTE_WEIGHT: f64 = 2.0;
const DECAY_DAYS: f64 = 7.0;

/// `(views + 2 * votes) / (1 + |days until show| / 7)`. Past shows decay the
/// same way as distant ones.
pub fn trending_score(view_count: i64, total_votes: i64, days_until_show: i64) -> f64 {
    let engagement = view_count.max(0) as f64 + VOTE_WEIGHT * total_votes.max(0) as f64;
    engagement / (1.0 + days_until_show.unsigned_abs() as f64 / DECAY_DAYS)
}

pub struct TrendingService {
    shows: Arc<dyn ShowRepository>,
}

impl TrendingService {
    pub fn new(shows: Arc<dyn ShowRepository>) -> Self {
        Self { shows }
    }

    /// Recompute every non-canceled show's score. Returns the rows updated.
    pub async fn recompute(&self, today: NaiveDate) -> SyncResult<u64> {
        let inputs = self.shows.list_trending_inputs().await?;
        let scores: Vec<_> = inputs
            .iter()
            .map(|input| {
                let days = (input.date - today).num_days();
                (input.show_id, trending_score(input.view_count, input.total_votes, days))
            })
            .collect();
        let updated = self.shows.update_trending_scores(&scores).await?;
        info!(target: "trending", shows = updated, "trending scores recomputed");
        Ok(updated)
    }
}
