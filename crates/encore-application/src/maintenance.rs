// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Duration, Utc};
use encore_infrastructure::Repositories;
use tracing::info;

use crate::error::SyncResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub shows_completed: u64,
    pub canceled_deleted: u64,
    pub stubs_deleted: u64,
}

impl MaintenanceReport {
    pub fn total(&self) -> u64 {
        self.shows_completed + self.canceled_deleted + self.stubs_deleted
    }
}

/// Daily data upkeep: close out past shows and apply retention.
pub struct MaintenanceService {
    repos: Repositories,
    retention: Duration,
}

impl MaintenanceService {
    pub fn new(repos: Repositories, retention_days: i64) -> Self {
        Self {
            repos,
            retention: Duration::days(retention_days.max(0)),
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> SyncResult<MaintenanceReport> {
        let today = now.date_naive();
        let cutoff = now - self.retention;

        let report = MaintenanceReport {
            shows_completed: self.repos.shows.mark_past_completed(today).await?,
            canceled_deleted: self
                .repos
                .shows
                .delete_canceled_before(cutoff.date_naive())
                .await?,
            stubs_deleted: self.repos.artists.delete_orphan_stubs(cutoff).await?,
        };

        info!(
            target: "maintenance",
            completed = report.shows_completed,
            canceled_deleted = report.canceled_deleted,
            stubs_deleted = report.stubs_deleted,
            "maintenance finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, FakeCatalog, TestHarness};
    use encore_domain::{Artist, Show, ShowStatus, Venue};

    #[tokio::test]
    async fn closes_past_shows_and_applies_retention() {
        let harness = TestHarness::new(FakeCatalog::default()).await;
        let now = date(2026, 10, 1).and_hms_opt(12, 0, 0).unwrap().and_utc();
        let long_ago = now - Duration::days(400);

        let artist = harness.repos.artists.create(Artist::new("Haim")).await.unwrap();
        let venue = harness.repos.venues.create(Venue::new("v", "Greek Theatre")).await.unwrap();

        let past = Show::new("past", artist.id, venue.id, "Past", date(2026, 9, 1));
        let upcoming = Show::new("next", artist.id, venue.id, "Next", date(2026, 11, 1));
        let mut canceled = Show::new("old", artist.id, venue.id, "Old", date(2025, 1, 1));
        canceled.status = ShowStatus::Canceled;
        for show in [&past, &upcoming, &canceled] {
            harness.repos.shows.insert(show).await.unwrap();
        }

        let mut orphan = Artist::stub("Nobody", None);
        orphan.created_at = long_ago;
        let orphan = harness.repos.artists.create(orphan).await.unwrap();
        let mut recent_stub = Artist::stub("Somebody", None);
        recent_stub.created_at = now - Duration::days(2);
        let recent_stub = harness.repos.artists.create(recent_stub).await.unwrap();

        let report = harness.pipeline.maintenance.run(now).await.unwrap();

        assert_eq!(
            report,
            MaintenanceReport {
                shows_completed: 1,
                canceled_deleted: 1,
                stubs_deleted: 1,
            }
        );
        let past = harness.repos.shows.get_by_id(past.id).await.unwrap().unwrap();
        assert_eq!(past.status, ShowStatus::Completed);
        let upcoming = harness.repos.shows.get_by_id(upcoming.id).await.unwrap().unwrap();
        assert_eq!(upcoming.status, ShowStatus::Scheduled);
        assert!(harness.repos.shows.get_by_id(canceled.id).await.unwrap().is_none());
        assert!(harness.repos.artists.get_by_id(orphan.id).await.unwrap().is_none());
        assert!(harness.repos.artists.get_by_id(recent_stub.id).await.unwrap().is_some());
        assert_eq!(report.total(), 3);
    }
}
