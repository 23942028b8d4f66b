// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use encore_application::SyncPipeline;
use encore_config::{load as load_config, AppConfig, RateLimitConfig};
use encore_infrastructure::{init_database, Repositories};
use encore_scheduler::{JobResult, Scheduler};
use encore_upstream::{
    CatalogClient, RateLimitPolicy, RateLimiter, SetlistClient, TicketingClient,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "encore")]
#[command(about = "Concert setlist sync service")]
struct Cli {
    /// TOML file layered over the defaults; ENCORE_* variables override both
    #[arg(long, global = true, env = "ENCORE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Serve,
    /// Run one job now and print its result
    Run {
        /// artist-sync, show-sync, setlist-import, trending or maintenance
        job: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let pool = init_database(&config).await?;
    let pipeline = build_pipeline(&config, Repositories::sqlite(pool.clone()))?;

    let scheduler = Scheduler::new(&config);
    scheduler.register_jobs(&pipeline, Some(pool)).await;

    match cli.command {
        Command::Serve => {
            let handle = scheduler.start();
            info!(target: "cli", "scheduler running");
            shutdown_signal().await?;
            handle.abort();
        }
        Command::Run { job } => {
            let result = scheduler.trigger(&job).await?;
            println!("{}", format_result(&result));
            if !result.success {
                bail!("job {job} failed");
            }
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer().with_target(true).with_thread_names(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn limiter(upstream: &str, config: &RateLimitConfig) -> RateLimiter {
    RateLimiter::new(upstream, RateLimitPolicy::from(config))
}

fn build_pipeline(config: &AppConfig, repos: Repositories) -> Result<SyncPipeline> {
    let catalog = CatalogClient::from_config(
        &config.catalog,
        limiter("catalog", &config.catalog.rate_limit),
    )?;
    let ticketing = TicketingClient::from_config(
        &config.ticketing,
        limiter("ticketing", &config.ticketing.rate_limit),
    )?;
    let setlists = SetlistClient::from_config(
        &config.setlists,
        limiter("setlists", &config.setlists.rate_limit),
    )?;

    Ok(SyncPipeline::new(
        config,
        repos,
        Arc::new(catalog),
        Arc::new(ticketing),
        Arc::new(setlists),
    ))
}

fn format_result(result: &JobResult) -> String {
    let mut line = format!(
        "{}: {} ({} ms, {} retries)",
        result.job_name,
        if result.success { "ok" } else { "failed" },
        result.processing_time_ms,
        result.retry_count
    );
    if let Some(records) = result.records_processed {
        line.push_str(&format!(", {records} records"));
    }
    line.push_str(&format!("\n  {}", result.message));
    if let Some(details) = &result.error_details {
        line.push_str(&format!("\n  error: {details}"));
    }
    line
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = interrupt.recv() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    warn!(target: "cli", "shutdown signal received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_config() {
        let cli = Cli::parse_from(["encore", "run", "show-sync", "--config", "encore.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("encore.toml")));
        assert!(matches!(cli.command, Command::Run { job } if job == "show-sync"));
    }

    #[test]
    fn parses_serve() {
        let cli = Cli::parse_from(["encore", "serve"]);
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn formats_failed_result() {
        let result = JobResult {
            job_name: "trending".to_string(),
            success: false,
            message: "trending failed after 3 attempts".to_string(),
            processing_time_ms: 1500,
            records_processed: None,
            error_details: Some("database locked".to_string()),
            retry_count: 2,
        };
        assert_eq!(
            format_result(&result),
            "trending: failed (1500 ms, 2 retries)\n  trending failed after 3 attempts\n  error: database locked"
        );
    }
}
