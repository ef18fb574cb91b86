//! Input gate: rate-limited, color-attributed cell activation.
//!
//! Each client may land at most one submission per configured interval.
//! Anything arriving sooner is dropped on the floor. There is no queue
//! and nothing is merged or reported back; the next submission after the
//! interval simply wins. This is a coarse at-most-one-per-interval policy,
//! not a token bucket.
//!
//! The gate trusts its caller to have filtered coordinates to the grid.
//! [`Grid::activate`] still ignores anything out of range rather than
//! panicking.

use std::time::{Duration, Instant};

use crate::grid::{ColorId, Grid};

/// A grid coordinate that has already been checked against the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPoint {
    /// Row index.
    pub row: u16,
    /// Column index.
    pub col: u16,
}

/// Per-client rate-limit state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiter {
    last_accepted: Option<Instant>,
}

impl RateLimiter {
    /// When the last submission was accepted, if ever.
    pub const fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}

/// Applies the rate limit and writes activations into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGate {
    interval: Duration,
}

impl InputGate {
    /// Create a gate allowing one submission per `interval`.
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The minimum spacing between accepted submissions.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether a submission arriving at `now` is accepted.
    ///
    /// Acceptance records `now` on the limiter. A rejected submission
    /// leaves the limiter untouched, so the window is measured from the
    /// last accepted submission.
    pub fn admit(&self, limiter: &mut RateLimiter, now: Instant) -> bool {
        let ready = limiter
            .last_accepted
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            limiter.last_accepted = Some(now);
        }
        ready
    }

    /// Bring every point to life under `color`. Returns how many cells
    /// were written.
    pub fn activate(&self, grid: &mut Grid, color: ColorId, points: &[GridPoint]) -> usize {
        points
            .iter()
            .filter(|p| grid.activate(p.row, p.col, color))
            .count()
    }
}
