//! Idle time sampling.
//!
//! Asks the display server how long the user has been away from the
//! keyboard and mouse. Nothing is cached: every sample is a fresh round-trip.

use tracing::trace;

use crate::display::{DisplayError, DisplayServerAdapter};

/// One idle-time reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSample {
    /// Seconds since the last keyboard or pointer event.
    pub seconds_since_last_input: u64,
}

impl IdleSample {
    /// Create a sample from a raw reading.
    pub fn new(seconds_since_last_input: u64) -> Self {
        Self {
            seconds_since_last_input,
        }
    }

    /// Returns true if input happened within the last `period_seconds`.
    pub fn active_within(self, period_seconds: u64) -> bool {
        self.seconds_since_last_input < period_seconds
    }
}

/// Query the display server for the current idle time.
///
/// Failures surface as [`DisplayError::ProbeUnavailable`] and are not retried.
pub fn sample<D>(display: &mut D) -> Result<IdleSample, DisplayError>
where
    D: DisplayServerAdapter + ?Sized,
{
    let seconds = display.query_idle_seconds().map_err(|e| match e {
        DisplayError::ProbeUnavailable(_) => e,
        other => DisplayError::ProbeUnavailable(other.to_string()),
    })?;
    trace!("Idle for {}s", seconds);
    Ok(IdleSample::new(seconds))
}
