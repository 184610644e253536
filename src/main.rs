// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! VitalSync - Background Health Monitoring and Sync Orchestrator
//!
//! Runs the orchestrator headless. In demo mode the host engines are
//! simulated: a wearable, a GPS looping between home and the gym, a health
//! store with a day of history, and a host that grants periodic windows.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vitalsync::adapters::{AdapterKind, SimulatedHistory, SimulatedSource};
use vitalsync::core::TaskKind;
use vitalsync::geofence::RegionTable;
use vitalsync::streaming::WebSocketSurface;
use vitalsync::{Config, Orchestrator, VERSION};

/// VitalSync - Background Health Monitoring and Sync Orchestrator
#[derive(Parser, Debug)]
#[command(name = "vitalsync")]
#[command(author = "VitalSync Project")]
#[command(version = VERSION)]
#[command(about = "Geofenced sessions, budgeted background tasks and reliable health data uploads")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated adapters
    #[arg(long)]
    demo: bool,

    /// Upload endpoint base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// WebSocket status port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Push notification token to register with the backend
    #[arg(long)]
    push_token: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true);
    // RUST_LOG wins over the flags when set
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(builder.with_env_filter(EnvFilter::from_default_env()).finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(log_level).finish())?;
    }

    info!("VitalSync v{} - background health monitoring and sync", VERSION);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    if args.demo {
        config.demo_mode = true;
    }
    if let Some(data_dir) = args.data_dir.clone() {
        config.set_data_dir(data_dir);
    }
    if let Some(endpoint) = args.endpoint.clone() {
        config.sync.endpoint = endpoint;
    }
    if let Some(port) = args.ws_port {
        config.live_status.websocket_port = port;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config, args.push_token))
}

async fn run_headless(config: Config, push_token: Option<String>) -> Result<()> {
    if config.database.enabled {
        if let Some(parent) = config.database.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let surface = Arc::new(WebSocketSurface::new(
        config.live_status.websocket_port,
        config.live_status.websocket_max_clients,
    ));
    if config.live_status.enabled {
        let addr = surface.start(shutdown_tx.subscribe()).await?;
        info!("Live status on ws://{}", addr);
    }

    let mut builder = Orchestrator::builder(config.clone()).display(surface);

    if config.demo_mode {
        let device = config.device_id.as_str();
        let rate = config.adapters.simulated_rate_hz;
        let regions = RegionTable::new(config.geofence.to_regions());

        let history = Arc::new(SimulatedHistory::new("health-store", AdapterKind::HealthStore));
        history.fill_demo(device);
        info!("Seeded {} historical samples", history.len());

        builder = builder
            .source(Box::new(SimulatedSource::motion("watch", device, rate)))
            .source(Box::new(SimulatedSource::location("gps", device, regions, rate)))
            .source(Box::new(SimulatedSource::host(
                "host",
                Duration::from_secs(config.scheduler.window_every_secs),
                Duration::from_secs(config.scheduler.window_budget_secs),
            )))
            .anchored_source(TaskKind::HealthSync, history);
    } else {
        warn!("No host adapters attached; only queued batches will be uploaded");
    }

    let orchestrator = Arc::new(builder.build().await?);

    if let Some(token) = push_token {
        match orchestrator.register_push_token(&token).await {
            Ok(true) => info!("Push token registered"),
            Ok(false) => info!("Push token already registered"),
            Err(e) => warn!("Push token registration failed: {}", e),
        }
    }

    let status_task = {
        let orchestrator = orchestrator.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let s = orchestrator.status();
                        info!(
                            "Status: {} adapters, sessions {:?}, {} pending / {} failed batches, degraded={}",
                            s.adapters_active,
                            s.open_sessions,
                            s.pending_batches,
                            s.failed_batches,
                            s.sync_degraded
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    };

    let runner = tokio::spawn(orchestrator.clone().run(shutdown_tx.clone()));

    info!("VitalSync running headless");
    info!("   Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());

    runner.await??;
    let _ = status_task.await;

    info!("VitalSync shutdown complete");
    Ok(())
}
