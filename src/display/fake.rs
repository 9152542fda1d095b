//! In-memory display server and renderer used by tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{Bounds, DisplayError, DisplayEvent, DisplayServerAdapter, WindowHandle};
use crate::render::{Renderer, Surface};

/// A recorded adapter or renderer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(WindowHandle),
    HideCursor(WindowHandle),
    RequestVisible(WindowHandle),
    Grab(WindowHandle),
    Release,
    Hide(WindowHandle),
    Destroy(WindowHandle),
    Background(WindowHandle),
    Text(WindowHandle, String),
    Flush(WindowHandle),
}

/// Call log shared between a [`FakeDisplay`] and its [`RecordingRenderer`].
pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Scriptable display server.
///
/// Idle samples are served from a queue (falling back to `default_idle`).
/// Mapping a window queues a paint notification for it unless
/// `withhold_paint` is set. With `fail_events` set, waiting for an event
/// reports a failed request instead.
#[derive(Debug)]
pub struct FakeDisplay {
    pub log: CallLog,
    pub idle: VecDeque<u64>,
    pub default_idle: u64,
    pub events: VecDeque<DisplayEvent>,
    pub fail_probe: bool,
    pub fail_create: bool,
    pub fail_grab: bool,
    pub withhold_paint: bool,
    pub fail_events: bool,
    pub bounds: Bounds,
    pub windows_created: u32,
    next_id: u32,
}

impl FakeDisplay {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            idle: VecDeque::new(),
            default_idle: 0,
            events: VecDeque::new(),
            fail_probe: false,
            fail_create: false,
            fail_grab: false,
            withhold_paint: false,
            fail_events: false,
            bounds: Bounds::new(0, 0, 1920, 1080),
            windows_created: 0,
            next_id: 1,
        }
    }

    pub fn push_event(&mut self, event: DisplayEvent) {
        self.events.push_back(event);
    }

    /// Renderer writing into the same call log.
    pub fn renderer(&self) -> RecordingRenderer {
        RecordingRenderer {
            log: Rc::clone(&self.log),
            fail_draw: false,
        }
    }

    /// Snapshot of every call so far, adapter and renderer interleaved.
    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    /// Texts drawn so far, in order.
    pub fn texts(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Text(_, t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.log.borrow().iter().position(pred)
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl DisplayServerAdapter for FakeDisplay {
    fn query_idle_seconds(&mut self) -> Result<u64, DisplayError> {
        if self.fail_probe {
            return Err(DisplayError::ProbeUnavailable("fake".to_string()));
        }
        Ok(self.idle.pop_front().unwrap_or(self.default_idle))
    }

    fn screen_bounds(&mut self) -> Result<Bounds, DisplayError> {
        Ok(self.bounds)
    }

    fn create_fullscreen_window(&mut self, _bounds: Bounds) -> Result<WindowHandle, DisplayError> {
        if self.fail_create {
            return Err(DisplayError::WindowCreationFailed("fake".to_string()));
        }
        let window = WindowHandle(self.next_id);
        self.next_id += 1;
        self.windows_created += 1;
        self.record(Call::Create(window));
        Ok(window)
    }

    fn request_visible(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        self.record(Call::RequestVisible(window));
        if !self.withhold_paint {
            self.events.push_back(DisplayEvent::PaintNeeded { window });
        }
        Ok(())
    }

    fn hide(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        self.record(Call::Hide(window));
        Ok(())
    }

    fn destroy(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        self.record(Call::Destroy(window));
        Ok(())
    }

    fn grab_pointer_and_keyboard(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        if self.fail_grab {
            return Err(DisplayError::GrabFailed("AlreadyGrabbed".to_string()));
        }
        self.record(Call::Grab(window));
        Ok(())
    }

    fn release_grabs(&mut self) -> Result<(), DisplayError> {
        self.record(Call::Release);
        Ok(())
    }

    fn hide_cursor(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        self.record(Call::HideCursor(window));
        Ok(())
    }

    fn next_event(&mut self) -> Result<DisplayEvent, DisplayError> {
        if self.fail_events {
            return Err(DisplayError::RequestFailed("BadWindow".to_string()));
        }
        // A real server would block forever here; a test must never get that far.
        self.events
            .pop_front()
            .ok_or_else(|| DisplayError::ConnectionFailed("no more scripted events".to_string()))
    }

    fn poll_event(&mut self) -> Result<Option<DisplayEvent>, DisplayError> {
        Ok(self.events.pop_front())
    }
}

/// Renderer that appends its calls to a [`FakeDisplay`]'s log, so both
/// streams can be checked for ordering.
///
/// With `fail_draw` set, every background draw fails and nothing is logged.
#[derive(Debug)]
pub struct RecordingRenderer {
    log: CallLog,
    pub fail_draw: bool,
}

impl Renderer for RecordingRenderer {
    fn draw_background(&mut self, surface: &Surface) -> Result<(), DisplayError> {
        if self.fail_draw {
            return Err(DisplayError::RequestFailed("fake draw".to_string()));
        }
        self.log.borrow_mut().push(Call::Background(surface.window));
        Ok(())
    }

    fn draw_centered_text(&mut self, surface: &Surface, text: &str) -> Result<(), DisplayError> {
        self.log
            .borrow_mut()
            .push(Call::Text(surface.window, text.to_string()));
        Ok(())
    }

    fn flush(&mut self, surface: &Surface) -> Result<(), DisplayError> {
        self.log.borrow_mut().push(Call::Flush(surface.window));
        Ok(())
    }
}
