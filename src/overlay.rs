//! Full-screen countdown overlay lifecycle.
//!
//! One [`OverlaySession`] covers one rest: the window is created and mapped,
//! input is grabbed only once the server proves the window is on screen (its
//! first paint notification), the countdown is redrawn every second, and the
//! grab is released before the window goes away.
//!
//! ```text
//! Creating -> WaitingFirstPaint -> Active -> Closing -> Closed
//! ```

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::countdown::CountdownClock;
use crate::display::{Bounds, DisplayError, DisplayServerAdapter, WindowHandle};
use crate::render::{Renderer, Surface, render_frame};

/// Where the overlay is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// Nothing requested from the server yet.
    Creating,
    /// Window mapped, waiting for the server to say it is on screen.
    WaitingFirstPaint,
    /// Input grabbed, countdown running.
    Active,
    /// Tearing down.
    Closing,
    /// Done. Terminal.
    Closed,
}

/// The overlay's window as far as the session knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayWindow {
    pub handle: WindowHandle,
    pub bounds: Bounds,
    pub visible: bool,
    pub input_grabbed: bool,
}

impl OverlayWindow {
    fn surface(&self) -> Surface {
        Surface {
            window: self.handle,
            bounds: self.bounds,
        }
    }
}

/// One rest cycle's overlay.
#[derive(Debug)]
pub struct OverlaySession {
    state: OverlayState,
    rest_seconds: u64,
    window: Option<OverlayWindow>,
    clock: Option<CountdownClock>,
}

impl OverlaySession {
    /// Create a session for a rest of `rest_seconds`. Nothing touches the
    /// display until [`open`](Self::open).
    pub fn new(rest_seconds: u64) -> Self {
        Self {
            state: OverlayState::Creating,
            rest_seconds,
            window: None,
            clock: None,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == OverlayState::Closed
    }

    pub fn window(&self) -> Option<&OverlayWindow> {
        self.window.as_ref()
    }

    /// When the countdown started, once the overlay is active.
    pub fn started_at(&self) -> Option<Instant> {
        self.clock.map(|c| c.started_at())
    }

    /// Create the full-screen window and ask for it to be shown.
    ///
    /// On failure nothing is left behind on the server and the session is
    /// `Closed`.
    pub fn open<D>(&mut self, display: &mut D) -> Result<(), DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
    {
        if self.state != OverlayState::Creating {
            return Ok(());
        }

        let created = display
            .screen_bounds()
            .and_then(|bounds| Ok((bounds, display.create_fullscreen_window(bounds)?)));
        let (bounds, handle) = match created {
            Ok(created) => created,
            Err(e) => {
                self.state = OverlayState::Closed;
                return Err(match e {
                    DisplayError::WindowCreationFailed(_) => e,
                    other => DisplayError::WindowCreationFailed(other.to_string()),
                });
            }
        };
        debug!(
            "Created overlay window {:?} ({}x{})",
            handle, bounds.width, bounds.height
        );

        self.window = Some(OverlayWindow {
            handle,
            bounds,
            visible: false,
            input_grabbed: false,
        });
        // The window exists from here on; any failure must destroy it.
        self.state = OverlayState::WaitingFirstPaint;

        let shown = display
            .hide_cursor(handle)
            .and_then(|()| display.request_visible(handle));
        if let Err(e) = shown {
            self.close(display);
            return Err(DisplayError::WindowCreationFailed(e.to_string()));
        }
        Ok(())
    }

    /// Handle a paint notification for `window`.
    ///
    /// The first one moves the session to `Active`: input is grabbed, the
    /// countdown starts at `now` and the first frame is drawn. Later ones
    /// repaint the current value. Notifications for other windows are ignored.
    pub fn on_paint_needed<D, R>(
        &mut self,
        window: WindowHandle,
        now: Instant,
        display: &mut D,
        renderer: &mut R,
    ) -> Result<(), DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
        R: Renderer + ?Sized,
    {
        let Some(ours) = self.window else {
            return Ok(());
        };
        if ours.handle != window {
            trace!("Ignoring paint notification for foreign window {:?}", window);
            return Ok(());
        }

        match self.state {
            OverlayState::WaitingFirstPaint => {
                if let Err(e) = display.grab_pointer_and_keyboard(ours.handle) {
                    self.close(display);
                    return Err(e);
                }
                if let Some(w) = self.window.as_mut() {
                    w.visible = true;
                    w.input_grabbed = true;
                }
                self.clock = Some(CountdownClock::new(self.rest_seconds, now));
                self.state = OverlayState::Active;
                info!("Overlay on screen, input grabbed, resting for {}s", self.rest_seconds);
                self.draw(now, renderer)
            }
            OverlayState::Active => {
                trace!("Repainting overlay");
                self.draw(now, renderer)
            }
            _ => Ok(()),
        }
    }

    /// Redraw the countdown and close the overlay once it has run out.
    ///
    /// The final `00:00` frame is drawn before the grab is released.
    pub fn tick<D, R>(
        &mut self,
        now: Instant,
        display: &mut D,
        renderer: &mut R,
    ) -> Result<(), DisplayError>
    where
        D: DisplayServerAdapter + ?Sized,
        R: Renderer + ?Sized,
    {
        if self.state != OverlayState::Active {
            return Ok(());
        }
        let Some(clock) = self.clock else {
            return Ok(());
        };

        self.draw(now, renderer)?;
        if clock.is_expired(now) {
            debug!("Countdown expired");
            self.close(display);
        }
        Ok(())
    }

    /// Tear the overlay down: release grabs, hide, destroy.
    ///
    /// Safe in any state. Teardown errors are logged, never returned, so a
    /// failing step cannot leave the grab held.
    pub fn close<D>(&mut self, display: &mut D)
    where
        D: DisplayServerAdapter + ?Sized,
    {
        if self.state == OverlayState::Closed {
            return;
        }
        self.state = OverlayState::Closing;

        if let Some(mut window) = self.window.take() {
            if window.input_grabbed {
                if let Err(e) = display.release_grabs() {
                    warn!("Failed to release input grabs: {}", e);
                }
                window.input_grabbed = false;
            }
            if let Err(e) = display.hide(window.handle) {
                warn!("Failed to hide overlay window: {}", e);
            }
            window.visible = false;
            if let Err(e) = display.destroy(window.handle) {
                warn!("Failed to destroy overlay window: {}", e);
            }
            debug!("Destroyed overlay window {:?}", window.handle);
        }

        self.state = OverlayState::Closed;
    }

    fn draw<R>(&mut self, now: Instant, renderer: &mut R) -> Result<(), DisplayError>
    where
        R: Renderer + ?Sized,
    {
        let (Some(window), Some(clock)) = (self.window, self.clock) else {
            return Ok(());
        };
        let seconds = clock.display_seconds(now);
        trace!("Rendering countdown: {}s left", seconds);
        render_frame(renderer, &window.surface(), seconds)?;
        Ok(())
    }
}
