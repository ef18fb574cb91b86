//! Shared application state for the Chromalife server.
//!
//! [`AppState`] is built once from the loaded configuration, wrapped in
//! an [`Arc`](std::sync::Arc) and handed to both the scheduler and the
//! Axum router. The grid sits behind a single exclusive lock; every
//! engine step, activation, reset and encode happens inside one
//! critical section on it. The registry carries its own lock.

use std::time::{Duration, Instant};

use chromalife_core::codec::WireCodec;
use chromalife_core::config::ChromalifeConfig;
use chromalife_core::gate::InputGate;
use chromalife_core::grid::{Grid, GridError};
use chromalife_core::round::RoundClock;
use tokio::sync::Mutex;

use crate::registry::Registry;

/// Per-connection transport limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// How long one socket write may take before the connection is
    /// abandoned.
    pub send_timeout: Duration,
    /// Frames queued per connection before it is treated as stalled.
    pub outbound_buffer: usize,
}

/// State shared by the scheduler and every connection task.
pub struct AppState {
    /// The simulation grid.
    pub grid: Mutex<Grid>,
    /// Active connections.
    pub registry: Registry,
    /// Start of the current round.
    pub round: Mutex<RoundClock>,
    /// Frame encoder.
    pub codec: WireCodec,
    /// Rate limit and activation policy for client input.
    pub gate: InputGate,
    /// Per-connection transport limits.
    pub transport: TransportSettings,
    width: u16,
    height: u16,
}

impl AppState {
    /// Build the state described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if the configured grid dimensions are
    /// rejected.
    pub fn new(config: &ChromalifeConfig) -> Result<Self, GridError> {
        let grid = Grid::new(config.grid.width, config.grid.height)?;
        Ok(Self {
            width: grid.width(),
            height: grid.height(),
            grid: Mutex::new(grid),
            registry: Registry::new(config.game.num_colors),
            round: Mutex::new(RoundClock::new(config.timing.round_duration(), now())),
            codec: config.wire.codec(),
            gate: InputGate::new(config.timing.input_interval()),
            transport: TransportSettings {
                send_timeout: config.server.send_timeout(),
                outbound_buffer: config.server.outbound_buffer,
            },
        })
    }

    /// Grid dimensions as `(width, height)`. Fixed for the process
    /// lifetime, so reading them does not take the grid lock.
    pub const fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}

/// Current time from the runtime clock.
///
/// Reads through Tokio so paused-time tests see a consistent clock.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
