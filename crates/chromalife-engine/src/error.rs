//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can end the process, so
//! `main` can propagate with `?`.

use chromalife_core::config::ConfigError;
use chromalife_server::startup::StartupError;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The grid, scheduler or HTTP server could not be started, or the
    /// server failed while running.
    #[error("startup error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: StartupError,
    },
}
