//! socialcast-send - Background daemon for scheduled publishing
//!
//! Runs two independent periodic jobs: publishing approved posts whose
//! scheduled time has passed, and sweeping expired media from scratch
//! storage.

use std::time::Duration;

use clap::Parser;
use libsocialcast::logging::LoggingConfig;
use libsocialcast::service::SocialcastService;
use libsocialcast::{BatchSummary, Config, Result, SocialcastError};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "socialcast-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
socialcast-send - Background daemon for scheduled publishing

DESCRIPTION:
    socialcast-send is a long-running daemon with two periodic jobs:

    publish  Every approved post whose scheduled time has passed is claimed
             and fanned out to its platforms. A post that errors is marked
             failed and the batch carries on.
    sweep    Media files older than the retention window are removed from
             scratch storage and closed rate-limit windows are pruned.

USAGE:
    # Run in foreground (logs to stderr)
    socialcast-send

    # Publish every 30 seconds, sweep every 10 minutes
    socialcast-send --publish-interval 30 --sweep-interval 600

    # Run both jobs once and print a JSON summary
    socialcast-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the running job)

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Database location: ~/.local/share/socialcast/socialcast.db

    [scheduler]
    publish_interval_secs = 60
    sweep_interval_secs = 3600
    claim_timeout_secs = 3600

    Override with environment variables:
        SOCIALCAST_CONFIG      - Path to config file
        SOCIALCAST_DB_PATH     - Path to database file
        SOCIALCAST_LOG_FORMAT  - text, json or pretty
        SOCIALCAST_LOG_LEVEL   - Default log level

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
    3 - Invalid arguments
")]
struct Cli {
    /// Seconds between publication runs (overrides config)
    #[arg(long, value_name = "SECONDS")]
    publish_interval: Option<u64>,

    /// Seconds between scratch storage sweeps (overrides config)
    #[arg(long, value_name = "SECONDS")]
    sweep_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run each job once, print a summary and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("socialcast-send stopped: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let publish_secs = cli
        .publish_interval
        .unwrap_or(config.scheduler.publish_interval_secs);
    let sweep_secs = cli
        .sweep_interval
        .unwrap_or(config.scheduler.sweep_interval_secs);
    if publish_secs == 0 || sweep_secs == 0 {
        return Err(SocialcastError::InvalidInput(
            "Intervals must be at least one second".to_string(),
        ));
    }

    let service = SocialcastService::from_config(config).await?;

    if cli.once {
        let summary = service
            .scheduler()
            .run_publication_tick(chrono::Utc::now().timestamp())
            .await?;
        let removed = run_sweep(&service).await;
        println!("{}", once_report(&summary, removed));
        return Ok(());
    }

    let queue: Vec<String> = service
        .database()
        .count_by_status(None)
        .await?
        .iter()
        .map(|(status, count)| format!("{}={}", status, count))
        .collect();
    info!(
        publish_secs,
        sweep_secs,
        queue = %queue.join(" "),
        "socialcast-send daemon starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx)?;

    run_daemon_loop(
        &service,
        Duration::from_secs(publish_secs),
        Duration::from_secs(sweep_secs),
        shutdown_rx,
    )
    .await;

    info!("socialcast-send daemon stopped");
    Ok(())
}

/// Sweep scratch media and prune closed rate-limit windows
async fn run_sweep(service: &SocialcastService) -> usize {
    let removed = service.scheduler().run_artifact_sweep().await;
    if let Err(e) = service
        .api_keys()
        .prune_rate_windows(chrono::Utc::now().timestamp())
        .await
    {
        error!("Pruning rate-limit windows failed: {}", e);
    }
    removed
}

fn once_report(summary: &BatchSummary, removed: usize) -> serde_json::Value {
    serde_json::json!({
        "processed": summary.processed,
        "published": summary.published,
        "failed": summary.failed,
        "skipped": summary.skipped,
        "swept": removed,
    })
}

/// Flip `shutdown` on the first SIGINT or SIGTERM
#[cfg(unix)]
fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> Result<()> {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| SocialcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received shutdown signal, stopping gracefully...");
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}

/// Drive both jobs until shutdown
///
/// A job that is already running when the signal arrives runs to
/// completion; the loop exits before starting another.
async fn run_daemon_loop(
    service: &SocialcastService,
    publish_every: Duration,
    sweep_every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut publish = interval(publish_every);
    publish.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep = interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Shutdown requested, stopping daemon loop");
                break;
            }
            _ = publish.tick() => {
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = service.scheduler().run_publication_tick(now).await {
                    error!("Publication run failed: {}", e);
                }
            }
            _ = sweep.tick() => {
                let removed = run_sweep(service).await;
                if removed > 0 {
                    info!(removed, "Swept expired media");
                }
            }
        }
    }
}
