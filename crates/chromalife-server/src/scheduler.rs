//! Round scheduler: tick, full sync and round reset on one loop.
//!
//! A single task owns the three cadences and selects among their timers.
//! Each action runs its grid critical section to completion before the
//! loop looks at the next due timer, so a full sync can never interleave
//! with a tick and every changed flag is consumed by exactly one frame.
//!
//! When several timers are due at once the reset goes first, then the
//! full sync, then the tick. Missed periods are skipped rather than
//! replayed in a burst.

use std::sync::Arc;
use std::time::Duration;

use chromalife_core::config::TimingConfig;
use chromalife_core::engine;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::registry::BroadcastReport;
use crate::state::{AppState, now};

/// The three scheduler periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Time between simulation steps.
    pub tick: Duration,
    /// Time between full-sync broadcasts.
    pub full_sync: Duration,
    /// Round length.
    pub round: Duration,
}

impl Cadence {
    /// Read the periods from the timing section.
    pub const fn from_config(timing: &TimingConfig) -> Self {
        Self {
            tick: timing.tick_interval(),
            full_sync: timing.full_sync_interval(),
            round: timing.round_duration(),
        }
    }
}

/// Drives the simulation and broadcasts its frames.
pub struct Scheduler {
    state: Arc<AppState>,
    cadence: Cadence,
}

impl Scheduler {
    /// Create a scheduler over `state`.
    pub const fn new(state: Arc<AppState>, cadence: Cadence) -> Self {
        Self { state, cadence }
    }

    /// Run [`Scheduler::run`] on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Reset once, then run the three cadences until the task is dropped.
    pub async fn run(self) {
        self.reset_round().await;

        let mut reset = periodic(self.cadence.round);
        let mut full_sync = periodic(self.cadence.full_sync);
        let mut tick = periodic(self.cadence.tick);

        info!(
            tick_ms = self.cadence.tick.as_millis(),
            full_sync_ms = self.cadence.full_sync.as_millis(),
            round_secs = self.cadence.round.as_secs(),
            "scheduler running"
        );

        loop {
            tokio::select! {
                biased;
                _ = reset.tick() => self.reset_round().await,
                _ = full_sync.tick() => {
                    self.full_sync().await;
                }
                _ = tick.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Step the simulation and broadcast the resulting delta.
    ///
    /// Returns `None` when nothing changed or the frame could not be
    /// encoded.
    pub async fn tick(&self) -> Option<BroadcastReport> {
        let encoded = {
            let mut grid = self.state.grid.lock().await;
            engine::step(&mut grid);
            self.state.codec.encode_delta(&mut grid)
        };

        match encoded {
            Ok(Some(frame)) => Some(self.state.registry.broadcast_frame(frame).await),
            Ok(None) => {
                trace!("no cells changed, delta skipped");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to encode delta frame, skipping broadcast");
                None
            }
        }
    }

    /// Broadcast a full-sync frame followed by the countdown notice.
    ///
    /// Encoding clears every changed flag in the same critical section.
    /// If encoding fails the flags are left set and neither message is
    /// sent.
    pub async fn full_sync(&self) -> Option<BroadcastReport> {
        let encoded = {
            let mut grid = self.state.grid.lock().await;
            self.state.codec.encode_full(&mut grid)
        };

        let frame = match encoded {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode full-sync frame, skipping broadcast");
                return None;
            }
        };

        let report = self.state.registry.broadcast_frame(frame).await;
        let notice = self.state.round.lock().await.countdown_notice(now());
        self.state.registry.broadcast_text(&notice).await;

        debug!(
            delivered = report.delivered,
            pruned = report.pruned,
            notice = %notice,
            "full sync broadcast"
        );
        Some(report)
    }

    /// Kill every cell and restart the round clock.
    pub async fn reset_round(&self) {
        {
            let mut grid = self.state.grid.lock().await;
            grid.reset();
        }
        self.state.round.lock().await.reset(now());
        info!("round reset");
    }
}

/// An interval whose first tick is one full period away.
fn periodic(period: Duration) -> Interval {
    let start = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
