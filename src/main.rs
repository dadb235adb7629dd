//! ssrelay - Encrypting multi-port TCP relay server

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssrelay::{
    config::{ConfigManager, ConfigWatcher},
    ReloadCoordinator, ServerContext, SignalListener,
};

const DEFAULT_CONFIG_PATH: &str = "config.json";

/// CLI arguments for ssrelay
#[derive(Parser, Debug)]
#[command(name = "ssrelay")]
#[command(about = "ssrelay - Encrypting multi-port TCP relay server")]
#[command(version)]
#[command(long_about = "
ssrelay - Encrypting multi-port TCP relay server

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables (only read when no configuration file exists)
4. Built-in defaults

Environment variables:
  SSRELAY_SERVER       - Listen address (e.g., 0.0.0.0)
  SSRELAY_SERVER_PORT  - Default port
  SSRELAY_PASSWORD     - Default password
  SSRELAY_METHOD       - Encryption method (e.g., aes-256-gcm)
  SSRELAY_TIMEOUT      - Timeout (e.g., 5m, 300s)

Send SIGHUP to reload port passwords from the configuration file.
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to configuration file (.json or .toml)"
    )]
    pub config: PathBuf,

    /// Listen address (overrides config file)
    #[arg(short, long, help = "Listen address")]
    pub server: Option<String>,

    /// Port (overrides config file)
    #[arg(short, long, help = "Server port")]
    pub port: Option<u16>,

    /// Password (overrides config file)
    #[arg(short = 'k', long, help = "Password")]
    pub password: Option<String>,

    /// Encryption method (overrides config file)
    #[arg(short, long, help = "Encryption method, default: aes-256-cfb")]
    pub method: Option<String>,

    /// Timeout in seconds
    #[arg(short, long, help = "Timeout in seconds")]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Reload when the configuration file changes
    #[arg(long, help = "Reload automatically when the configuration file changes")]
    pub watch: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    info!("Starting ssrelay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else if args.config.as_os_str() == DEFAULT_CONFIG_PATH {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    } else {
        bail!("Config file not found: {}", args.config.display());
    };

    config.merge_with_cli_args(
        args.server.as_deref(),
        args.port,
        args.password.as_deref(),
        args.method.as_deref(),
        args.timeout,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        let ports = config.port_passwords()?;
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Listen address: {}", config.server);
        info!("  Method: {}", config.method);
        info!("  Timeout: {:?}", config.timeout);
        info!(
            "  Ports: {}",
            ports
                .keys()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Ok(());
    }

    info!("Method: {}", config.method);
    info!("Timeout: {:?}", config.timeout);

    let context = ServerContext::new(config);
    context.start().await.context("Failed to start listeners")?;

    let (reload_tx, reload_rx) = mpsc::channel(8);
    let coordinator = ReloadCoordinator::new(context.clone(), args.config.clone());
    let coordinator_handle = tokio::spawn(coordinator.run(reload_rx));

    let _watcher = if args.watch {
        match ConfigWatcher::new(args.config.clone(), reload_tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Config file watching disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    info!(
        "ssrelay started on {} port(s)",
        context.passwords().len()
    );

    let signals = SignalListener::new(reload_tx);
    if let Err(e) = signals.wait_for_shutdown().await {
        error!("Error setting up signal handlers: {}", e);
    }

    info!("Shutting down, closing listeners");

    // Dropping every reload sender ends the coordinator after any reload in flight
    drop(signals);
    drop(_watcher);
    if let Err(e) = coordinator_handle.await {
        error!("Reload coordinator failed: {}", e);
    }

    context.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
