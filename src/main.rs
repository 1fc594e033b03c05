//! Zagonel shower bridge - command line entry point

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{debug, error, info, Level};
use zagonel_bridge::bridge::DeviceSession;
use zagonel_bridge::config::BridgeConfig;
use zagonel_bridge::entities::EntitySet;
use zagonel_bridge::observability::{init_default_logging, init_logging, LogFormat};
use zagonel_bridge::transport::mqtt::ConnectionState;
use zagonel_bridge::transport::MqttTransport;

/// Bridge between a Zagonel smart shower and its MQTT broker
#[derive(Parser)]
#[command(name = "zagonel-bridge")]
#[command(about = "Expose a Zagonel smart shower as a typed device state model")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device identifier, overrides the configuration file
    #[arg(long, env = "ZAGONEL_DEVICE_ID")]
    device_id: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a session open and log snapshot updates until interrupted
    Run,
    /// Load the device state once and print it as JSON
    Status,
    /// Send one command to the device
    Send {
        /// Command name, e.g. `Buzzer_Volume` or `getStatus`
        command: String,
        /// Command value as JSON; anything that is not JSON is sent as a string
        value: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, log_format(), false),
        _ => init_logging(Level::TRACE, log_format(), true),
    }

    info!("Starting zagonel-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config, cli.device_id.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Status => print_status(config).await,
        Commands::Send { command, value } => send_command(config, &command, value).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn log_format() -> LogFormat {
    LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()))
}

fn load_configuration(
    config_path: &Option<PathBuf>,
    device_id: Option<&str>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let path = match config_path {
        Some(path) => Some(path.clone()),
        None => ["zagonel.toml", "config/zagonel.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists()),
    };

    match (path, device_id) {
        (Some(path), device_id) => {
            info!("Loading configuration from: {}", path.display());
            let mut config = BridgeConfig::load_from_file(&path)?;
            if let Some(device_id) = device_id {
                config.device.id = device_id.trim().to_string();
                config.validate()?;
            }
            Ok(config)
        }
        (None, Some(device_id)) => Ok(BridgeConfig::for_device(device_id)?),
        (None, None) => Err(
            "No configuration found. Pass --device-id, set ZAGONEL_DEVICE_ID, or provide -c/--config"
                .into(),
        ),
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to device: {}", config.device.id);
    let session = DeviceSession::connect_mqtt(config).await?;
    let mut updates = session.subscribe();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Bridge is running, waiting for device updates...");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = monitor_connection_health(&session) => {
                error!("MQTT connection permanently lost, shutting down bridge...");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    info!(
                        running = snapshot.is_running(),
                        last_update_success = session.coordinator().last_update_success(),
                        "Device state updated"
                    );
                    debug!("Snapshot: {}", serde_json::to_string(&snapshot)?);
                }
            }
        }
    }

    session.release().await;
    Ok(())
}

async fn print_status(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = Arc::new(DeviceSession::connect_mqtt(config).await?);
    let entities = EntitySet::for_device(session.clone());

    let report = json!({
        "device_id": session.config().device.id,
        "running": session.is_running(),
        "snapshot": session.snapshot(),
        "entities": entities.states(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    session.release().await;
    Ok(())
}

fn parse_value(raw: Option<String>) -> Option<Value> {
    raw.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
}

async fn send_command(
    config: BridgeConfig,
    command: &str,
    value: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = DeviceSession::connect_mqtt(config).await?;

    let result = session.send(command, parse_value(value)).await;
    session.release().await;

    let reply = result?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "Type": reply.kind.as_str(),
            "fields": reply.fields,
        }))?
    );
    Ok(())
}

fn handle_config_command(
    config: BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolves once the transport has given up reconnecting
async fn monitor_connection_health(session: &DeviceSession<MqttTransport>) {
    loop {
        if let Some(ConnectionState::PermanentlyDisconnected(reason)) =
            session.gateway().connection_state().await
        {
            error!("Connection abandoned: {}", reason);
            break;
        }
        sleep(Duration::from_millis(500)).await;
    }
}
