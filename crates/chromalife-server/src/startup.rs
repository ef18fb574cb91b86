//! Server startup for the engine binary.
//!
//! [`run`] turns a validated configuration into running components: it
//! builds the shared [`AppState`], spawns the [`Scheduler`] on a
//! background task and serves HTTP on the current task until `shutdown`
//! resolves. The scheduler is aborted once the server stops.

use std::future::Future;
use std::sync::Arc;

use chromalife_core::config::ChromalifeConfig;
use chromalife_core::grid::GridError;
use tracing::info;

use crate::scheduler::{Cadence, Scheduler};
use crate::server::{ServerConfig, ServerError, start_server};
use crate::state::AppState;

/// Errors that can occur while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The grid could not be allocated.
    #[error("grid setup failed: {source}")]
    Grid {
        /// The underlying grid error.
        #[from]
        source: GridError,
    },

    /// The server failed to bind or exited with an error.
    #[error("server start error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: ServerError,
    },
}

/// Run the scheduler and the server until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`StartupError`] if the grid cannot be built or the server
/// cannot bind or fails while serving.
pub async fn run<F>(config: &ChromalifeConfig, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(AppState::new(config)?);
    info!(
        width = config.grid.width,
        height = config.grid.height,
        num_colors = config.game.num_colors,
        packing = ?state.codec.packing(),
        compression = ?state.codec.compression(),
        "grid initialized"
    );

    let scheduler = Scheduler::new(Arc::clone(&state), Cadence::from_config(&config.timing)).spawn();

    let result = start_server(&ServerConfig::from(&config.server), state, shutdown).await;
    scheduler.abort();
    result.map_err(StartupError::from)
}
