//! Display server abstraction.
//!
//! Everything the break enforcer needs from the windowing system goes through
//! [`DisplayServerAdapter`]: idle-time queries, the overlay window lifecycle,
//! input grabs and the protocol event stream.

#[cfg(test)]
pub(crate) mod fake;
mod x11;

use thiserror::Error;
pub use x11::{X11Display, X11Renderer, X11Session};

/// Opaque window identifier handed out by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u32);

/// Window geometry in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Bounds {
    /// Create new bounds.
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Display protocol notifications the break enforcer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The window (or part of it) must be redrawn. The first one for a
    /// freshly mapped window is the proof that it is on screen.
    PaintNeeded { window: WindowHandle },
    /// The pointer moved over one of our windows.
    PointerMoved { window: WindowHandle },
    /// A key was pressed while one of our windows had the keyboard.
    KeyPressed { window: WindowHandle },
    /// Anything else.
    Other,
}

/// Errors reported by a display server adapter.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Display connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Idle time query unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("Window creation failed: {0}")]
    WindowCreationFailed(String),

    #[error("Input grab refused: {0}")]
    GrabFailed(String),

    #[error("Display request failed: {0}")]
    RequestFailed(String),
}

/// Capability set required from the windowing system.
///
/// Implementations are used from a single thread, strictly sequentially.
pub trait DisplayServerAdapter {
    /// Seconds since the display server last saw user input.
    fn query_idle_seconds(&mut self) -> Result<u64, DisplayError>;

    /// Geometry of the screen the overlay should cover.
    fn screen_bounds(&mut self) -> Result<Bounds, DisplayError>;

    /// Create a window covering `bounds` and ask for full-screen placement.
    ///
    /// The window is not mapped yet.
    fn create_fullscreen_window(&mut self, bounds: Bounds) -> Result<WindowHandle, DisplayError>;

    /// Ask for the window to be shown. Asynchronous: the window is only
    /// guaranteed to be on screen once a paint notification arrives.
    fn request_visible(&mut self, window: WindowHandle) -> Result<(), DisplayError>;

    fn hide(&mut self, window: WindowHandle) -> Result<(), DisplayError>;

    fn destroy(&mut self, window: WindowHandle) -> Result<(), DisplayError>;

    /// Take exclusive pointer and keyboard input for `window`.
    ///
    /// Fails with [`DisplayError::GrabFailed`] if the server refuses either
    /// grab; in that case nothing stays grabbed.
    fn grab_pointer_and_keyboard(&mut self, window: WindowHandle) -> Result<(), DisplayError>;

    fn release_grabs(&mut self) -> Result<(), DisplayError>;

    fn hide_cursor(&mut self, window: WindowHandle) -> Result<(), DisplayError>;

    /// Block until the next protocol event arrives. No timeout.
    fn next_event(&mut self) -> Result<DisplayEvent, DisplayError>;

    /// Return a pending event without blocking.
    fn poll_event(&mut self) -> Result<Option<DisplayEvent>, DisplayError>;

    /// Block until the first paint notification for `window`, dropping any
    /// other events on the way.
    fn wait_for_paint_notification(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        loop {
            if let DisplayEvent::PaintNeeded { window: w } = self.next_event()?
                && w == window
            {
                return Ok(());
            }
        }
    }
}
