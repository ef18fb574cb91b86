//! Chromalife server binary.
//!
//! Wires configuration, logging and the game server together and runs
//! until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `chromalife-config.yaml` (or the path in
//!    `CHROMALIFE_CONFIG`), falling back to defaults if the file is absent
//! 2. Initialize structured logging (tracing)
//! 3. Build the grid and shared state
//! 4. Spawn the scheduler (startup reset, then tick / full sync / reset)
//! 5. Serve `WebSocket` and HTTP traffic until shutdown

mod error;

use std::path::{Path, PathBuf};

use chromalife_core::config::{ChromalifeConfig, LogFormat, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "chromalife-config.yaml";

/// Environment variable naming an alternative configuration file.
const CONFIG_PATH_ENV: &str = "CHROMALIFE_CONFIG";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the grid cannot be
/// built, or the server fails to bind or serve.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, found) = load_config(&config_path)?;

    init_logging(&config.logging);

    info!("chromalife-engine starting");
    if found {
        info!(path = %config_path.display(), "configuration loaded");
    } else {
        info!(path = %config_path.display(), "config file not found, using defaults");
    }
    info!(
        host = %config.server.host,
        port = config.server.port,
        tick_interval_ms = config.timing.tick_interval_ms,
        full_sync_interval_ms = config.timing.full_sync_interval_ms,
        round_duration_seconds = config.timing.round_duration_seconds,
        input_interval_ms = config.timing.input_interval_ms,
        "configuration in effect"
    );

    chromalife_server::startup::run(&config, shutdown_signal())
        .await
        .map_err(EngineError::from)?;

    info!("chromalife-engine shut down");
    Ok(())
}

/// Load configuration from `path`, or defaults if it does not exist.
///
/// Returns whether the file was found alongside the config. Environment
/// overrides and validation apply in both cases.
fn load_config(path: &Path) -> Result<(ChromalifeConfig, bool), EngineError> {
    if path.exists() {
        return Ok((ChromalifeConfig::from_file(path)?, true));
    }

    let mut config = ChromalifeConfig::default();
    config.server.apply_env_overrides();
    config.validate()?;
    Ok((config, false))
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence
/// over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolves on `Ctrl-C`.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            // Without a signal handler there is no clean way to stop;
            // keep serving until the process is killed.
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
