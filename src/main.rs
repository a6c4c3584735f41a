// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! edgelink - Edge Telemetry Bridge
//!
//! Samples the BME688/BMI270 pair and streams telemetry to a collector.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use edgelink::core::Delay;
use edgelink::{
    Config, Engine, SensorManager, SharedRuntimeConfig, TelemetrySession, TokioConnector, TokioDelay,
    VERSION,
};

/// edgelink - Edge Telemetry Bridge
#[derive(Parser, Debug)]
#[command(name = "edgelink")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Stream BME688/BMI270 telemetry over switchable TCP/UDP")]
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

    /// Demo mode with simulated sensors
    #[arg(long)]
    demo: bool,

    /// Collector host
    #[arg(long)]
    server: Option<String>,

    /// Collector port, used for both control and streaming
    #[arg(long)]
    port: Option<u16>,
}

fn parse_level(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The config file may name a log level, so read it before logging is up
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        parse_level(&config.log_level)
    };
    let verbose = log_level >= Level::DEBUG;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("edgelink v{} - Edge Telemetry Bridge", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(server) = args.server {
        config.network.server_host = server;
    }
    if let Some(port) = args.port {
        config.network.control_port = port;
        config.network.stream_port = port;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);
    info!(
        "Collector: {} (control tcp/{}, stream udp/{})",
        config.network.server_host, config.network.control_port, config.network.stream_port
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let delay: Arc<dyn Delay> = Arc::new(TokioDelay);

    let sensors = if config.demo_mode {
        SensorManager::simulated(&config, delay.clone())?
    } else {
        hardware_sensors(&config, delay.clone())?
    };

    let session = TelemetrySession::new(
        Box::new(TokioConnector::new(config.network.clone())),
        delay.clone(),
        &config.network,
    );
    let runtime = SharedRuntimeConfig::new(config.runtime);
    let mut engine = Engine::new(sensors, session, runtime, delay, config.timing.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, cleaning up...");
            let _ = shutdown_tx.send(());
        }
    });

    info!("Press Ctrl+C to shutdown");
    engine.run(shutdown_rx).await?;

    info!("edgelink shutdown complete");
    Ok(())
}

#[cfg(feature = "hardware")]
fn hardware_sensors(config: &Config, delay: Arc<dyn Delay>) -> Result<SensorManager> {
    SensorManager::hardware(config, delay)
}

#[cfg(not(feature = "hardware"))]
fn hardware_sensors(_config: &Config, _delay: Arc<dyn Delay>) -> Result<SensorManager> {
    anyhow::bail!("I2C support not enabled. Build with --features hardware or use --demo")
}
