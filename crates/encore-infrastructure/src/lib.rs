// SPDX-License-Identifier: GPL-3.0-or-later
pub mod repositories;
pub mod sqlite_adapters;
pub mod sqlite_setlists;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use encore_config::AppConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use repositories::{
    ArtistRepository, PlayedSetlistRepository, SetlistRepository, ShowRepository, SongRepository,
    VenueRepository,
};
use sqlite_adapters::{SqliteArtistRepository, SqliteShowRepository, SqliteVenueRepository};
use sqlite_setlists::{
    SqlitePlayedSetlistRepository, SqliteSetlistRepository, SqliteSongRepository,
};

/// Every repository the sync pipeline writes through, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub artists: Arc<dyn ArtistRepository>,
    pub venues: Arc<dyn VenueRepository>,
    pub shows: Arc<dyn ShowRepository>,
    pub songs: Arc<dyn SongRepository>,
    pub setlists: Arc<dyn SetlistRepository>,
    pub played_setlists: Arc<dyn PlayedSetlistRepository>,
}

impl Repositories {
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            artists: Arc::new(SqliteArtistRepository::new(pool.clone())),
            venues: Arc::new(SqliteVenueRepository::new(pool.clone())),
            shows: Arc::new(SqliteShowRepository::new(pool.clone())),
            songs: Arc::new(SqliteSongRepository::new(pool.clone())),
            setlists: Arc::new(SqliteSetlistRepository::new(pool.clone())),
            played_setlists: Arc::new(SqlitePlayedSetlistRepository::new(pool)),
        }
    }
}

/// Turn a relative `sqlite://` URL into an absolute one with create mode,
/// creating the parent directory.
fn normalize_sqlite_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            info!(target: "infrastructure", path = %parent.display(), "created database directory");
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // SQLite accepts forward slashes on every platform
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite://{}?mode=rwc", path_str))
}

pub async fn init_database(config: &AppConfig) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let db_url = normalize_sqlite_url(&config.database.url)?;
    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.pool_max_size)
        .connect(&db_url)
        .await?;

    run_migrations(&pool).await?;

    info!(target: "infrastructure", "database initialized successfully");
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!(target: "infrastructure", "running migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Let SQLite refresh its query planner statistics.
pub async fn optimize(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA optimize").execute(pool).await?;
    Ok(())
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Single-connection in-memory database with migrations applied.
    pub async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("migrate");
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_url_is_left_untouched() {
        assert_eq!(
            normalize_sqlite_url("sqlite://:memory:").unwrap(),
            "sqlite://:memory:"
        );
        assert_eq!(normalize_sqlite_url("sqlite::memory:").unwrap(), "sqlite::memory:");
    }

    #[test]
    fn file_url_gets_create_mode_and_parent_dir() {
        let dir = std::env::temp_dir().join("encore-url-test");
        let url = format!("sqlite://{}/encore.db", dir.to_string_lossy());
        let normalized = normalize_sqlite_url(&url).unwrap();

        assert!(normalized.ends_with("/encore.db?mode=rwc"));
        assert!(!normalized.contains('\\'));
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn optimize_runs_on_migrated_database() {
        let pool = test_support::setup_pool().await;
        optimize(&pool).await.unwrap();
    }
}
