//! Signal K to MQTT bridge - main entry point
//!
//! Reads newline-delimited Signal K deltas from stdin (or a file) and
//! republishes them to the configured broker until SIGINT or SIGTERM, or until
//! the input ends and its last batch has been handled.

use clap::{Parser, Subcommand};
use signalk_iot_bridge::config::BridgeConfig;
use signalk_iot_bridge::observability::{init_default_logging, HealthServer, StatusBoard};
use signalk_iot_bridge::source::DeltaStreamSource;
use signalk_iot_bridge::transport::mqtt::MqttConnector;
use signalk_iot_bridge::BridgeController;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["bridge.toml", "config/bridge.toml", "/etc/signalk-iot-bridge.toml"];

/// Republish Signal K vessel telemetry to an MQTT broker over mutual TLS
#[derive(Parser)]
#[command(name = "signalk-iot-bridge")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Run {
        /// Read deltas from this file instead of stdin; the bridge stops at end of file
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Validate the configuration
    Config {
        /// Print the configuration with credentials redacted
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging(cli.verbose);

    info!("Starting signalk-iot-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { input } => run_bridge(config, input).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: Option<&std::path::Path>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("no configuration file found; pass one with -c/--config or create bridge.toml".into())
}

async fn open_input(
    input: Option<PathBuf>,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, Box<dyn std::error::Error>> {
    match input {
        Some(path) => {
            info!("Reading deltas from {}", path.display());
            let file = tokio::fs::File::open(&path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading deltas from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

async fn run_bridge(
    config: BridgeConfig,
    input: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let board = Arc::new(StatusBoard::new());

    let (health_shutdown_tx, health_shutdown_rx) = oneshot::channel::<()>();
    let health_task = config.health.as_ref().map(|health| {
        let server = HealthServer::new(board.subscribe(), health.port);
        tokio::spawn(server.serve(async move {
            let _ = health_shutdown_rx.await;
        }))
    });

    let mut source =
        DeltaStreamSource::new(open_input(input).await?).with_self_context(config.bridge.self_context.clone());
    let mut bridge = BridgeController::new(MqttConnector::default(), board.clone());
    bridge.start(&config, &mut source).await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Bridge running");
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = bridge.subscriptions_finished() => info!("Delta input ended, shutting down"),
    }

    bridge.stop().await;

    let _ = health_shutdown_tx.send(());
    if let Some(task) = health_task {
        if let Err(e) = task.await {
            error!("Health server task failed: {}", e);
        }
    }

    let final_status = board.snapshot();
    info!(status = %final_status.status, "Final provider status");
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config.redacted())?);
    }

    info!(endpoint = %config.endpoint()?, "Configuration valid");
    Ok(())
}
