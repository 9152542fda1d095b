//! Active work time accounting.
//!
//! Coarse periodic sampling: a check period with any input in it counts as a
//! full period of work, a period without input counts as nothing.

use tracing::debug;

use crate::idle::IdleSample;

/// Accumulated active-work seconds since the last completed rest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkAccumulator {
    seconds: u64,
}

impl WorkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one elapsed check period and return the new total.
    ///
    /// Idle periods are skipped, never subtracted.
    pub fn tick(&mut self, period_seconds: u64, sample: IdleSample) -> u64 {
        if sample.active_within(period_seconds) {
            self.seconds = self.seconds.saturating_add(period_seconds);
            debug!(
                "Active during last {}s (idle {}s), worked {}s",
                period_seconds, sample.seconds_since_last_input, self.seconds
            );
        } else {
            debug!(
                "Idle for whole period ({}s >= {}s), worked {}s",
                sample.seconds_since_last_input, period_seconds, self.seconds
            );
        }
        self.seconds
    }

    /// Forget all accumulated work.
    pub fn reset(&mut self) {
        self.seconds = 0;
    }

    #[cfg(test)]
    pub fn seconds(&self) -> u64 {
        self.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_adds_period_only_when_active() {
        for period in 1..=12 {
            for idle in 0..=30 {
                for start_periods in 0..4 {
                    let mut work = WorkAccumulator::new();
                    for _ in 0..start_periods {
                        work.tick(period, IdleSample::new(0));
                    }
                    let before = work.seconds();

                    let after = work.tick(period, IdleSample::new(idle));

                    if idle < period {
                        assert_eq!(after, before + period, "period={period} idle={idle}");
                    } else {
                        assert_eq!(after, before, "period={period} idle={idle}");
                    }
                    assert_eq!(after, work.seconds());
                }
            }
        }
    }

    #[test]
    fn test_reset_always_zeroes() {
        let mut work = WorkAccumulator::new();
        work.reset();
        assert_eq!(work.seconds(), 0);

        for _ in 0..7 {
            work.tick(150, IdleSample::new(10));
        }
        assert_eq!(work.seconds(), 1050);
        work.reset();
        assert_eq!(work.seconds(), 0);
    }

    #[test]
    fn test_tick_saturates() {
        let mut work = WorkAccumulator { seconds: u64::MAX - 1 };
        assert_eq!(work.tick(150, IdleSample::new(0)), u64::MAX);
    }
}
