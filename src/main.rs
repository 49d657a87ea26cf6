//! mqtt-fluent-bridge - Forward Tasmota MQTT telemetry to Fluent Bit
//!
//! Usage:
//!   mqtt-fluent-bridge [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help
//!
//! Without `--config`, settings come from defaults and `MQTT_FLUENT__*`
//! environment variables.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mqtt_fluent_bridge::bridge::Bridge;
use mqtt_fluent_bridge::config::Config;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages (every forwarded record)
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Forward Tasmota MQTT telemetry to a Fluent forward input
#[derive(Parser, Debug)]
#[command(name = "mqtt-fluent-bridge")]
#[command(version)]
#[command(about = "Forward Tasmota MQTT telemetry to Fluent Bit")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

/// CLI flag, then `RUST_LOG`, then the configured level
fn log_filter(cli: Option<LogLevel>, configured: &str) -> EnvFilter {
    if let Some(level) = cli {
        return EnvFilter::new(level.to_tracing_level().as_str());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
}

/// Resolves on SIGTERM or SIGINT
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                }
                return;
            }
            _ => warn!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(args.log_level, &config.log.level))
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match &args.config {
        Some(path) if path.exists() => info!("Loaded configuration from {:?}", path),
        Some(path) => warn!(
            "Config file {:?} not found, running on defaults and environment",
            path
        ),
        None => {}
    }

    info!("Starting mqtt-fluent-bridge");
    info!("  Broker: {} ({})", config.mqtt.address, config.mqtt.protocol_version());
    info!("  Client ID: {}", config.mqtt.client_id);
    info!("  Topic: {} (qos={})", config.mqtt.topic, config.mqtt.qos);
    info!("  Fluent: {}", config.fluent.address);
    if !config.fluent.tag_prefix.is_empty() {
        info!("  Tag prefix: {}", config.fluent.tag_prefix);
    }

    let bridge = Bridge::new(config);
    if let Err(e) = bridge.run(shutdown_signal()).await {
        error!("Bridge failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
