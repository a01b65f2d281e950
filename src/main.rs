//! zone-dispatch - occupancy debounce and remote action dispatch
//!
//! Reads per-frame tracked points, decides which monitored zone is occupied,
//! debounces that over a sliding window and fires a login-then-act request
//! per zone with a cooldown in between.
//!
//! Module structure:
//! - `domain/` - Geometry types and zone polygons
//! - `io/` - External interfaces (remote action client, zones file, frames, status HTTP)
//! - `services/` - Business logic (geometry store, voter, cooldowns, dispatch worker)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zone_dispatch::infra::{Config, Metrics};
use zone_dispatch::io::{open_frames, start_status_server, ActionClient, ZoneFile};
use zone_dispatch::services::{CooldownRegistry, Dispatcher, OccupancyVoter, ZoneMonitor};

/// Zone occupancy debouncer and remote action dispatcher
#[derive(Parser, Debug)]
#[command(name = "zone-dispatch", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL frame records to process, `-` for stdin
    #[arg(short, long, default_value = "-")]
    frames: String,

    /// Force simulation mode (no network I/O)
    #[arg(long)]
    simulate: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-frame visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        "zone-dispatch starting"
    );

    let config_path = args.config.clone().unwrap_or_else(Config::default_config_path);
    let mut config = Config::load_from_path(&config_path);
    if args.simulate {
        config = config.with_simulation(true);
    }

    info!(
        config_file = %config.config_file(),
        zones_file = %config.zones_file(),
        window_size = %config.window_size(),
        min_frames_in_zone = %config.min_frames_in_zone(),
        cooldown_secs = %config.cooldown().as_secs_f64(),
        retry_count = %config.retry_count(),
        simulation = %config.simulation(),
        status_port = %config.status_port(),
        "config_loaded"
    );

    // Invalid zone geometry is the one fatal input error
    let geometry = ZoneFile::load(config.zones_file())?
        .into_store()
        .with_context(|| format!("Invalid zones in {}", config.zones_file()))?;

    let metrics = Arc::new(Metrics::new());
    let cooldowns = Arc::new(CooldownRegistry::new());

    let client = ActionClient::new(&config).context("Failed to build HTTP client")?;
    let dispatcher =
        Dispatcher::spawn(Box::new(client), cooldowns.clone(), metrics.clone(), &config);

    let voter = OccupancyVoter::new(config.window_size(), config.min_frames_in_zone());
    let mut monitor = ZoneMonitor::new(
        geometry,
        voter,
        dispatcher.queue(),
        cooldowns.clone(),
        metrics.clone(),
        config.cooldown(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start status HTTP server (if port > 0)
    let status_port = config.status_port();
    if status_port > 0 {
        let status_metrics = metrics.clone();
        let status_cooldowns = cooldowns.clone();
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_status_server(status_port, status_metrics, status_cooldowns, status_shutdown)
                    .await
            {
                error!(error = %e, "status_server_error");
            }
        });
    }

    // Start metrics reporter
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => reporter_metrics.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    let mut frames = open_frames(&args.frames).await?;
    info!(source = %args.frames, zones = %monitor.geometry().len(), "frame_loop_started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            frame = frames.next_frame() => match frame {
                Ok(Some(record)) => {
                    if let Some(resolution) = record.resolution() {
                        if let Err(e) = monitor.set_resolution(resolution) {
                            warn!(resolution = %resolution, error = %e, "frame_resolution_rejected");
                        }
                    }
                    monitor.process_points(&record.points());
                }
                Ok(None) => {
                    info!("frame_input_ended");
                    break;
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), "frame_input_error");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("shutdown_signal_received");
                break;
            }
        }
    }

    let outcome = dispatcher.shutdown().await;
    let _ = shutdown_tx.send(true);
    metrics.report().log();

    info!(outcome = ?outcome, "zone-dispatch shutdown complete");
    Ok(())
}
