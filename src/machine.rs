//! Break enforcement state machine.
//!
//! [`BreakStateMachine`] is the single authority on whether the user is
//! working or resting. It owns the [`Session`] and, during a rest, the one
//! live [`OverlaySession`].

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::display::{DisplayError, DisplayServerAdapter, WindowHandle};
use crate::idle;
use crate::overlay::{OverlaySession, OverlayState};
use crate::render::Renderer;
use crate::work::WorkAccumulator;

/// How often the countdown is redrawn while resting.
pub const RENDER_INTERVAL: Duration = Duration::from_secs(1);

/// Phase of the enforcement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Working,
    /// Overlay window requested, waiting for it to reach the screen.
    AwaitingOverlayReady,
    Resting,
}

/// Timing of the work/rest cycle. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    check_period_seconds: u64,
    work_threshold_seconds: u64,
    rest_duration_seconds: u64,
}

/// Rejected schedule.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Check period must be at least one second")]
    ZeroCheckPeriod,

    #[error("Rest duration must be at least one second")]
    ZeroRestDuration,
}

impl Schedule {
    /// Five minutes of rest after fifty minutes of work.
    pub const REST_DURATION_SECONDS: u64 = 5 * 60;
    pub const WORK_THRESHOLD_SECONDS: u64 = 50 * 60;
    /// Half the rest duration.
    pub const CHECK_PERIOD_SECONDS: u64 = Self::REST_DURATION_SECONDS / 2;

    pub fn new(
        check_period_seconds: u64,
        work_threshold_seconds: u64,
        rest_duration_seconds: u64,
    ) -> Result<Self, ScheduleError> {
        if check_period_seconds == 0 {
            return Err(ScheduleError::ZeroCheckPeriod);
        }
        if rest_duration_seconds == 0 {
            return Err(ScheduleError::ZeroRestDuration);
        }
        if check_period_seconds > work_threshold_seconds {
            warn!(
                "Check period ({}s) is longer than the work threshold ({}s); \
                 every active period will trigger a rest",
                check_period_seconds, work_threshold_seconds
            );
        }
        Ok(Self {
            check_period_seconds,
            work_threshold_seconds,
            rest_duration_seconds,
        })
    }

    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.check_period_seconds)
    }

    pub fn check_period_seconds(&self) -> u64 {
        self.check_period_seconds
    }

    pub fn work_threshold_seconds(&self) -> u64 {
        self.work_threshold_seconds
    }

    pub fn rest_duration_seconds(&self) -> u64 {
        self.rest_duration_seconds
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            check_period_seconds: Self::CHECK_PERIOD_SECONDS,
            work_threshold_seconds: Self::WORK_THRESHOLD_SECONDS,
            rest_duration_seconds: Self::REST_DURATION_SECONDS,
        }
    }
}

/// The enforcement loop's state for one display connection.
#[derive(Debug)]
pub struct Session {
    work: WorkAccumulator,
    phase: Phase,
    rest_started_at: Option<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            work: WorkAccumulator::new(),
            phase: Phase::Working,
            rest_started_at: None,
        }
    }

}

#[cfg(test)]
impl Session {
    pub fn accumulated_work_seconds(&self) -> u64 {
        self.work.seconds()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rest_started_at(&self) -> Option<Instant> {
        self.rest_started_at
    }
}

/// What a step of the state machine changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing worth reporting.
    None,
    /// Work threshold reached, overlay requested.
    RestDue { worked_seconds: u64 },
    /// Overlay on screen and input grabbed.
    RestStarted,
    /// Rest completed, back to work with a clean slate.
    RestFinished,
    /// The overlay could not be shown or could not grab input; back to work
    /// without resetting the accumulated time.
    RestAborted,
}

/// How the main loop should wait before the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Sleep, then call [`BreakStateMachine::tick`].
    Sleep(Duration),
    /// Block until the overlay window gets its first paint notification.
    FirstPaint(WindowHandle),
}

/// Orchestrates work accounting and rest overlays.
#[derive(Debug)]
pub struct BreakStateMachine {
    schedule: Schedule,
    session: Session,
    overlay: Option<OverlaySession>,
    rests_started: u64,
}

impl BreakStateMachine {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            session: Session::new(),
            overlay: None,
            rests_started: 0,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    #[cfg(test)]
    pub fn overlay(&self) -> Option<&OverlaySession> {
        self.overlay.as_ref()
    }

    /// Number of overlays constructed so far.
    #[cfg(test)]
    pub fn rests_started(&self) -> u64 {
        self.rests_started
    }

    pub fn next_wait(&self) -> Wait {
        match self.session.phase {
            Phase::Working => Wait::Sleep(self.schedule.check_period()),
            Phase::AwaitingOverlayReady => {
                match self.overlay.as_ref().and_then(OverlaySession::window) {
                    Some(window) => Wait::FirstPaint(window.handle),
                    None => Wait::Sleep(self.schedule.check_period()),
                }
            }
            Phase::Resting => Wait::Sleep(RENDER_INTERVAL),
        }
    }

    /// Advance one step.
    ///
    /// While working this samples idle time once and accounts for one check
    /// period. While resting it drives the overlay's countdown.
    pub fn tick<D, R>(
        &mut self,
        now: Instant,
        display: &mut D,
        renderer: &mut R,
    ) -> Result<Transition, DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
        R: Renderer + ?Sized,
    {
        match self.session.phase {
            Phase::Working => self.tick_working(display),
            Phase::AwaitingOverlayReady => {
                if self.overlay.is_none() {
                    self.session.phase = Phase::Working;
                }
                Ok(Transition::None)
            }
            Phase::Resting => self.tick_resting(now, display, renderer),
        }
    }

    /// Forward a paint notification to the live overlay.
    pub fn on_paint_needed<D, R>(
        &mut self,
        window: WindowHandle,
        now: Instant,
        display: &mut D,
        renderer: &mut R,
    ) -> Result<Transition, DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
        R: Renderer + ?Sized,
    {
        let Some(overlay) = self.overlay.as_mut() else {
            return Ok(Transition::None);
        };

        match overlay.on_paint_needed(window, now, display, renderer) {
            Ok(()) => {}
            Err(DisplayError::GrabFailed(reason)) => {
                error!("Could not grab input for the overlay ({}); skipping this rest", reason);
                return Ok(self.abort_rest());
            }
            Err(e) => return Err(e),
        }

        if self.session.phase == Phase::AwaitingOverlayReady
            && overlay.state() == OverlayState::Active
        {
            self.session.phase = Phase::Resting;
            self.session.rest_started_at = overlay.started_at();
            info!("Rest started");
            return Ok(Transition::RestStarted);
        }
        Ok(Transition::None)
    }

    /// Tear down any live overlay and return to working.
    ///
    /// Used on shutdown and before surfacing a fatal error, so input is never
    /// left grabbed.
    pub fn abandon<D>(&mut self, display: &mut D)
    where
        D: DisplayServerAdapter + ?Sized,
    {
        if let Some(mut overlay) = self.overlay.take() {
            if !overlay.is_closed() {
                info!("Closing overlay early");
            }
            overlay.close(display);
        }
        self.session.phase = Phase::Working;
        self.session.rest_started_at = None;
    }

    fn tick_working<D>(&mut self, display: &mut D) -> Result<Transition, DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
    {
        let sample = idle::sample(display)?;
        let worked = self
            .session
            .work
            .tick(self.schedule.check_period_seconds, sample);

        if worked < self.schedule.work_threshold_seconds {
            return Ok(Transition::None);
        }
        self.begin_rest(worked, display)
    }

    fn begin_rest<D>(&mut self, worked: u64, display: &mut D) -> Result<Transition, DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
    {
        // Only reachable from Working, so at most one overlay ever exists
        debug_assert!(self.overlay.is_none());
        info!(
            "Worked {}s, time for break #{} ({}s)",
            worked,
            self.rests_started + 1,
            self.schedule.rest_duration_seconds
        );

        let mut overlay = OverlaySession::new(self.schedule.rest_duration_seconds);
        self.rests_started += 1;
        match overlay.open(display) {
            Ok(()) => {}
            Err(DisplayError::WindowCreationFailed(reason)) => {
                error!("Could not create the overlay ({}); skipping this rest", reason);
                return Ok(Transition::RestAborted);
            }
            Err(e) => return Err(e),
        }

        self.overlay = Some(overlay);
        self.session.phase = Phase::AwaitingOverlayReady;
        Ok(Transition::RestDue {
            worked_seconds: worked,
        })
    }

    fn tick_resting<D, R>(
        &mut self,
        now: Instant,
        display: &mut D,
        renderer: &mut R,
    ) -> Result<Transition, DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
        R: Renderer + ?Sized,
    {
        let Some(overlay) = self.overlay.as_mut() else {
            // Resting without an overlay cannot happen; recover by working
            self.session.phase = Phase::Working;
            return Ok(Transition::None);
        };

        overlay.tick(now, display, renderer)?;
        if !overlay.is_closed() {
            return Ok(Transition::None);
        }

        let rested = self
            .session
            .rest_started_at
            .map_or(0, |t| now.saturating_duration_since(t).as_secs());
        self.overlay = None;
        self.session.work.reset();
        self.session.phase = Phase::Working;
        self.session.rest_started_at = None;
        info!("Rested {}s, back to work", rested);
        Ok(Transition::RestFinished)
    }

    fn abort_rest(&mut self) -> Transition {
        if let Some(overlay) = self.overlay.take() {
            debug!("Dropping overlay in state {:?}", overlay.state());
        }
        self.session.phase = Phase::Working;
        self.session.rest_started_at = None;
        Transition::RestAborted
    }
}
