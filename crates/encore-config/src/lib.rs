// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://encore.db".to_string(),
            pool_max_size: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    /// Upper bound on executions of a job function per run.
    pub job_max_attempts: u32,
    pub job_base_delay_ms: u64,
    /// Clock hour (UTC) of the daily maintenance run.
    pub maintenance_hour_utc: u32,
    pub trending_interval_secs: u64,
    pub show_sync_interval_secs: u64,
    pub artist_sync_interval_secs: u64,
    pub setlist_import_interval_secs: u64,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            job_max_attempts: 3,
            job_base_delay_ms: 1_000,
            maintenance_hour_utc: 3,
            trending_interval_secs: 60 * 60,
            show_sync_interval_secs: 6 * 60 * 60,
            artist_sync_interval_secs: 24 * 60 * 60,
            setlist_import_interval_secs: 12 * 60 * 60,
            run_on_start: false,
        }
    }
}

/// Quota and retry settings for a single upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_day: u32,
    pub max_queue: usize,
    pub queue_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 5,
            per_minute: 100,
            per_day: 5_000,
            max_queue: 1_000,
            queue_timeout_secs: 300,
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: Option<String>,
    pub accounts_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            base_url: None,
            accounts_url: None,
            rate_limit: RateLimitConfig {
                per_second: 10,
                per_minute: 180,
                per_day: 50_000,
                ..RateLimitConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub page_size: u32,
    pub lookahead_days: i64,
    pub rate_limit: RateLimitConfig,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            page_size: 100,
            lookahead_days: 365,
            rate_limit: RateLimitConfig {
                per_second: 5,
                per_minute: 200,
                per_day: 5_000,
                ..RateLimitConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetlistsConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for SetlistsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            rate_limit: RateLimitConfig {
                per_second: 2,
                per_minute: 60,
                per_day: 1_440,
                ..RateLimitConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Artists with more songs than this skip the full catalog import.
    pub catalog_skip_threshold: i64,
    pub album_page_size: u32,
    pub track_page_size: u32,
    pub album_batch_size: usize,
    pub album_batch_delay_ms: u64,
    pub upsert_batch_size: usize,
    pub seed_pool_size: i64,
    pub seed_size: usize,
    pub accept_confidence: f64,
    pub reject_confidence: f64,
    pub artist_resync_age_hours: i64,
    pub retention_days: i64,
    pub sync_batch_limit: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            catalog_skip_threshold: 20,
            album_page_size: 50,
            track_page_size: 50,
            album_batch_size: 10,
            album_batch_delay_ms: 500,
            upsert_batch_size: 50,
            seed_pool_size: 20,
            seed_size: 5,
            accept_confidence: 0.85,
            reject_confidence: 0.7,
            artist_resync_age_hours: 24,
            retention_days: 180,
            sync_batch_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub scheduler: SchedulerConfig,
    pub catalog: CatalogConfig,
    pub ticketing: TicketingConfig,
    pub setlists: SetlistsConfig,
    pub sync: SyncConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: ENCORE_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("ENCORE_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.job_max_attempts, 3);
        assert_eq!(config.sync.catalog_skip_threshold, 20);
        assert_eq!(config.sync.seed_size, 5);
        assert_eq!(config.sync.upsert_batch_size, 50);
        assert_eq!(config.ticketing.rate_limit.max_queue, 1_000);
        assert_eq!(config.ticketing.rate_limit.queue_timeout_secs, 300);
        assert!(config.ticketing.page_size <= 100);
    }

    #[test]
    fn toml_file_and_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "encore.toml",
                r#"
                    [sync]
                    seed_size = 7

                    [ticketing.rate_limit]
                    per_second = 2
                "#,
            )?;
            jail.set_env("ENCORE_SCHEDULER__MAINTENANCE_HOUR_UTC", "5");

            let config = load(Some(Path::new("encore.toml"))).expect("config loads");
            assert_eq!(config.sync.seed_size, 7);
            assert_eq!(config.ticketing.rate_limit.per_second, 2);
            assert_eq!(config.ticketing.rate_limit.per_day, 5_000);
            assert_eq!(config.scheduler.maintenance_hour_utc, 5);
            Ok(())
        });
    }
}
