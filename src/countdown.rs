//! Rest countdown arithmetic.

use tokio::time::Instant;

/// Remaining time of a rest interval, as a pure function of "now".
///
/// Holds nothing but the start instant, so asking again is always safe.
#[derive(Debug, Clone, Copy)]
pub struct CountdownClock {
    total_seconds: u64,
    started_at: Instant,
}

impl CountdownClock {
    pub fn new(total_seconds: u64, started_at: Instant) -> Self {
        Self {
            total_seconds,
            started_at,
        }
    }

    /// Whole seconds left; negative once the interval is over.
    pub fn remaining(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs();
        saturating_i64(self.total_seconds).saturating_sub(saturating_i64(elapsed))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now) <= 0
    }

    /// Seconds to show on screen: `remaining` clamped at zero.
    pub fn display_seconds(&self, now: Instant) -> u64 {
        u64::try_from(self.remaining(now)).unwrap_or(0)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(start: Instant, secs: u64) -> Instant {
        start + Duration::from_secs(secs)
    }

    #[test]
    fn test_remaining_over_five_minutes() {
        let t = Instant::now();
        let clock = CountdownClock::new(300, t);

        assert_eq!(clock.remaining(t), 300);
        assert_eq!(clock.remaining(at(t, 1)), 299);
        assert_eq!(clock.remaining(at(t, 300)), 0);
        assert_eq!(clock.remaining(at(t, 301)), -1);
    }

    #[test]
    fn test_is_expired_iff_nothing_remains() {
        let t = Instant::now();
        let clock = CountdownClock::new(300, t);

        for secs in 0..=310 {
            let now = at(t, secs);
            assert_eq!(clock.is_expired(now), clock.remaining(now) <= 0, "t+{secs}");
        }
        assert!(!clock.is_expired(at(t, 299)));
        assert!(clock.is_expired(at(t, 300)));
    }

    #[test]
    fn test_partial_seconds_round_down_elapsed() {
        let t = Instant::now();
        let clock = CountdownClock::new(10, t);

        assert_eq!(clock.remaining(t + Duration::from_millis(999)), 10);
        assert_eq!(clock.remaining(t + Duration::from_millis(1001)), 9);
    }

    #[test]
    fn test_display_seconds_never_negative() {
        let t = Instant::now();
        let clock = CountdownClock::new(5, t);

        assert_eq!(clock.display_seconds(at(t, 2)), 3);
        assert_eq!(clock.display_seconds(at(t, 5)), 0);
        assert_eq!(clock.display_seconds(at(t, 600)), 0);
    }

    #[test]
    fn test_now_before_start_counts_as_no_time_elapsed() {
        let t = Instant::now();
        let clock = CountdownClock::new(30, at(t, 10));
        assert_eq!(clock.remaining(t), 30);
    }

    #[test]
    fn test_repeated_queries_are_idempotent() {
        let t = Instant::now();
        let clock = CountdownClock::new(60, t);
        let now = at(t, 42);
        let first = clock.remaining(now);
        for _ in 0..10 {
            assert_eq!(clock.remaining(now), first);
        }
        assert_eq!(clock.started_at(), t);
    }
}
