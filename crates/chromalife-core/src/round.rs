//! Round clock and countdown notice.
//!
//! A round lasts a fixed duration from the last reset. The remaining time
//! is derived from the reset instant on demand and never stored.

use std::time::{Duration, Instant};

/// Tracks when the current round started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    duration: Duration,
    last_reset: Instant,
}

impl RoundClock {
    /// Start a round of `duration` at `now`.
    pub const fn new(duration: Duration, now: Instant) -> Self {
        Self {
            duration,
            last_reset: now,
        }
    }

    /// Configured round length.
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// When the current round started.
    pub const fn last_reset(&self) -> Instant {
        self.last_reset
    }

    /// Start a new round at `now`.
    pub const fn reset(&mut self, now: Instant) {
        self.last_reset = now;
    }

    /// Time left in the round, saturating at zero.
    pub fn remaining(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_reset);
        self.duration.saturating_sub(elapsed)
    }

    /// Time left in the round as fractional seconds.
    pub fn remaining_seconds(&self, now: Instant) -> f64 {
        self.remaining(now).as_secs_f64()
    }

    /// The text notice sent to clients after each full sync.
    pub fn countdown_notice(&self, now: Instant) -> String {
        format!("time {:.1}", self.remaining_seconds(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_down_from_duration() {
        let start = Instant::now();
        let clock = RoundClock::new(Duration::from_secs(120), start);
        assert_eq!(clock.remaining(start), Duration::from_secs(120));
        assert_eq!(
            clock.remaining(start + Duration::from_millis(10_250)),
            Duration::from_millis(109_750)
        );
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let start = Instant::now();
        let clock = RoundClock::new(Duration::from_secs(5), start);
        assert_eq!(clock.remaining(start + Duration::from_secs(9)), Duration::ZERO);
    }

    #[test]
    fn reset_restarts_the_countdown() {
        let start = Instant::now();
        let mut clock = RoundClock::new(Duration::from_secs(60), start);
        let later = start + Duration::from_secs(45);
        clock.reset(later);
        assert_eq!(clock.last_reset(), later);
        assert_eq!(clock.remaining(later), Duration::from_secs(60));
    }

    #[test]
    fn notice_has_one_decimal() {
        let start = Instant::now();
        let clock = RoundClock::new(Duration::from_secs(120), start);
        assert_eq!(clock.countdown_notice(start), "time 120.0");
        assert_eq!(
            clock.countdown_notice(start + Duration::from_millis(10_040)),
            "time 110.0"
        );
        assert_eq!(
            clock.countdown_notice(start + Duration::from_millis(30_500)),
            "time 89.5"
        );
    }
}
