//! Sliding-window failure throttle.
//!
//! Keeps the timestamps of the most recent failures in a bounded FIFO. When
//! the whole buffer falls inside the window, history is cleared and the caller
//! is told to cool down before the next tick.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::ThrottleConfig;

#[derive(Debug, Clone)]
pub struct Throttler {
    failures: VecDeque<Instant>,
    capacity: usize,
    window: Duration,
    cooldown: Duration,
}

impl Default for Throttler {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig::default())
    }
}

impl Throttler {
    pub fn new(capacity: usize, window: Duration, cooldown: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            failures: VecDeque::with_capacity(capacity),
            capacity,
            window,
            cooldown,
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.capacity, config.window(), config.cooldown())
    }

    /// Record a failure now. Returns the cooldown to sleep when tripped.
    pub fn poke(&mut self) -> Option<Duration> {
        self.poke_at(Instant::now())
    }

    /// Record a failure observed at `now`.
    pub fn poke_at(&mut self, now: Instant) -> Option<Duration> {
        if self.failures.len() == self.capacity {
            self.failures.pop_front();
        }
        self.failures.push_back(now);

        let recent = self
            .failures
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= self.window)
            .count();

        if recent >= self.capacity {
            self.failures.clear();
            Some(self.cooldown)
        } else {
            None
        }
    }

    pub fn recorded(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttler() -> Throttler {
        Throttler::new(10, Duration::from_secs(60), Duration::from_secs(60))
    }

    #[test]
    fn test_trips_on_tenth_failure_within_window() {
        let mut throttler = throttler();
        let start = Instant::now();

        for i in 0..9 {
            assert_eq!(throttler.poke_at(start + Duration::from_secs(i)), None);
        }
        assert_eq!(
            throttler.poke_at(start + Duration::from_secs(9)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(throttler.recorded(), 0);
    }

    #[test]
    fn test_failures_spread_beyond_window_do_not_trip() {
        let mut throttler = throttler();
        let start = Instant::now();

        // Oldest failure is 70 seconds before the newest.
        let offsets = [0, 20, 30, 40, 50, 55, 60, 65, 70];
        for offset in offsets {
            assert_eq!(throttler.poke_at(start + Duration::from_secs(offset)), None);
        }
        assert_eq!(throttler.recorded(), 9);

        // A tenth failure still leaves the oldest entry outside the window.
        assert_eq!(throttler.poke_at(start + Duration::from_secs(71)), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut throttler = throttler();
        let start = Instant::now();

        for i in 0..25 {
            throttler.poke_at(start + Duration::from_secs(i * 61));
            assert!(throttler.recorded() <= 10);
        }
    }

    #[test]
    fn test_trips_again_after_tripping() {
        let mut throttler = Throttler::new(3, Duration::from_secs(60), Duration::from_millis(5));
        let start = Instant::now();

        assert!(throttler.poke_at(start).is_none());
        assert!(throttler.poke_at(start).is_none());
        assert_eq!(throttler.poke_at(start), Some(Duration::from_millis(5)));
        assert!(throttler.poke_at(start).is_none());
        assert!(throttler.poke_at(start).is_none());
        assert!(throttler.poke_at(start).is_some());
    }
}
