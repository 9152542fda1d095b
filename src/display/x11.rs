//! X11 display backend.
//!
//! Idle time comes from the MIT-SCREEN-SAVER extension. The overlay is a
//! plain `InputOutput` window with the EWMH full-screen hint, drawn into with
//! core protocol fills only.

use std::env;
use std::io;
use std::rc::Rc;

use tracing::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ConnectionError;
use x11rb::protocol::Event;
use x11rb::protocol::screensaver::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeGCAux, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _,
    CreateGCAux, CreateWindowAux, EventMask, Gcontext, GrabMode, GrabStatus, PropMode, Rectangle,
    Screen, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use super::{Bounds, DisplayError, DisplayEvent, DisplayServerAdapter, WindowHandle};
use crate::render::{self, Rect, Renderer, Surface};

x11rb::atom_manager! {
    Atoms: AtomsCookie {
        _NET_WM_STATE,
        _NET_WM_STATE_FULLSCREEN,
    }
}

/// `_NET_WM_STATE` client message action.
const NET_WM_STATE_ADD: u32 = 1;
/// `_NET_WM_STATE` source indication: normal application.
const SOURCE_APPLICATION: u32 = 1;

/// Background gradient, top and bottom grey levels (0-255).
const GRADIENT_TOP: u8 = 26;
const GRADIENT_BOTTOM: u8 = 51;
const GRADIENT_BANDS: u16 = 64;

const TEXT_PIXEL: u32 = 0x00ff_ffff;
const SHADOW_PIXEL: u32 = 0x001a_1a1a;

/// One X server connection, shared by the adapter and the renderer.
pub struct X11Session {
    conn: RustConnection,
    screen_num: usize,
    atoms: Atoms,
}

impl X11Session {
    /// Connect to `display_name`, or `$DISPLAY` when `None`.
    pub fn connect(display_name: Option<&str>) -> Result<Rc<Self>, DisplayError> {
        let (conn, screen_num) = x11rb::connect(display_name)
            .map_err(|e| DisplayError::ConnectionFailed(e.to_string()))?;

        let has_screensaver = conn
            .extension_information(screensaver::X11_EXTENSION_NAME)
            .map_err(|e| DisplayError::ConnectionFailed(e.to_string()))?
            .is_some();
        if !has_screensaver {
            return Err(DisplayError::ProbeUnavailable(format!(
                "X server lacks the {} extension",
                screensaver::X11_EXTENSION_NAME
            )));
        }

        let atoms = Atoms::new(&conn)
            .map_err(|e| DisplayError::ConnectionFailed(e.to_string()))?
            .reply()
            .map_err(|e| DisplayError::ConnectionFailed(e.to_string()))?;

        info!("Connected to X server (screen {})", screen_num);
        Ok(Rc::new(Self {
            conn,
            screen_num,
            atoms,
        }))
    }

    /// Get diagnostic information about the X11 environment.
    pub fn get_diagnostics() -> Vec<String> {
        let mut diags = Vec::new();

        match env::var("DISPLAY") {
            Ok(v) => diags.push(format!("DISPLAY={v}")),
            Err(_) => diags.push("DISPLAY: NOT SET".to_string()),
        }

        match env::var("XAUTHORITY") {
            Ok(v) => diags.push(format!("XAUTHORITY={v}")),
            Err(_) => diags.push("XAUTHORITY: NOT SET".to_string()),
        }

        if env::var("WAYLAND_DISPLAY").is_ok() {
            diags.push(
                "WAYLAND_DISPLAY is set: idle time from XWayland may be unreliable".to_string(),
            );
        }

        diags
    }

    fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }
}

fn request_failed(e: impl std::fmt::Display) -> DisplayError {
    DisplayError::RequestFailed(e.to_string())
}

fn creation_failed(e: impl std::fmt::Display) -> DisplayError {
    DisplayError::WindowCreationFailed(e.to_string())
}

fn grab_failed(e: impl std::fmt::Display) -> DisplayError {
    DisplayError::GrabFailed(e.to_string())
}

fn probe_failed(e: impl std::fmt::Display) -> DisplayError {
    DisplayError::ProbeUnavailable(e.to_string())
}

/// [`DisplayServerAdapter`] over an X11 connection.
pub struct X11Display {
    session: Rc<X11Session>,
}

impl X11Display {
    pub fn new(session: Rc<X11Session>) -> Self {
        Self { session }
    }
}

impl DisplayServerAdapter for X11Display {
    fn query_idle_seconds(&mut self) -> Result<u64, DisplayError> {
        let root = self.session.screen().root;
        let info = self
            .session
            .conn
            .screensaver_query_info(root)
            .map_err(probe_failed)?
            .reply()
            .map_err(probe_failed)?;
        Ok(u64::from(info.ms_since_user_input) / 1000)
    }

    fn screen_bounds(&mut self) -> Result<Bounds, DisplayError> {
        let root = self.session.screen().root;
        let geometry = self
            .session
            .conn
            .get_geometry(root)
            .map_err(request_failed)?
            .reply()
            .map_err(request_failed)?;
        Ok(Bounds::new(0, 0, geometry.width, geometry.height))
    }

    fn create_fullscreen_window(&mut self, bounds: Bounds) -> Result<WindowHandle, DisplayError> {
        let conn = &self.session.conn;
        let screen = self.session.screen();
        let atoms = &self.session.atoms;

        let window = conn.generate_id().map_err(creation_failed)?;
        let aux = CreateWindowAux::new()
            .background_pixel(screen.black_pixel)
            .event_mask(EventMask::EXPOSURE | EventMask::POINTER_MOTION | EventMask::KEY_PRESS);
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            screen.root,
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &aux,
        )
        .map_err(creation_failed)?
        .check()
        .map_err(creation_failed)?;

        // Set before mapping so the window manager places it full-screen
        // right away; the client message in request_visible covers managers
        // that only honour it on mapped windows.
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_STATE,
            AtomEnum::ATOM,
            &[atoms._NET_WM_STATE_FULLSCREEN],
        )
        .map_err(creation_failed)?;

        debug!("Created window 0x{:x}", window);
        Ok(WindowHandle(window))
    }

    fn request_visible(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        let conn = &self.session.conn;
        let atoms = &self.session.atoms;
        let root = self.session.screen().root;

        conn.map_window(window.0).map_err(request_failed)?;

        let event = ClientMessageEvent::new(
            32,
            window.0,
            atoms._NET_WM_STATE,
            [
                NET_WM_STATE_ADD,
                atoms._NET_WM_STATE_FULLSCREEN,
                0,
                SOURCE_APPLICATION,
                0,
            ],
        );
        conn.send_event(
            false,
            root,
            EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
            event,
        )
        .map_err(request_failed)?;

        conn.flush().map_err(request_failed)?;
        debug!("Mapped window 0x{:x}", window.0);
        Ok(())
    }

    fn hide(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        let conn = &self.session.conn;
        conn.unmap_window(window.0).map_err(request_failed)?;
        conn.flush().map_err(request_failed)
    }

    fn destroy(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        let conn = &self.session.conn;
        conn.destroy_window(window.0).map_err(request_failed)?;
        conn.flush().map_err(request_failed)
    }

    fn grab_pointer_and_keyboard(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        let conn = &self.session.conn;

        let pointer = conn
            .grab_pointer(
                true,
                window.0,
                EventMask::POINTER_MOTION | EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                window.0,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )
            .map_err(grab_failed)?
            .reply()
            .map_err(grab_failed)?;
        if pointer.status != GrabStatus::SUCCESS {
            return Err(DisplayError::GrabFailed(format!(
                "pointer grab status {:?}",
                pointer.status
            )));
        }

        let keyboard = conn
            .grab_keyboard(
                true,
                window.0,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(grab_failed)?
            .reply()
            .map_err(grab_failed)?;
        if keyboard.status != GrabStatus::SUCCESS {
            // Do not keep half a grab
            conn.ungrab_pointer(x11rb::CURRENT_TIME)
                .map_err(request_failed)?;
            conn.flush().map_err(request_failed)?;
            return Err(DisplayError::GrabFailed(format!(
                "keyboard grab status {:?}",
                keyboard.status
            )));
        }

        debug!("Grabbed pointer and keyboard for 0x{:x}", window.0);
        Ok(())
    }

    fn release_grabs(&mut self) -> Result<(), DisplayError> {
        let conn = &self.session.conn;
        conn.ungrab_keyboard(x11rb::CURRENT_TIME)
            .map_err(request_failed)?;
        conn.ungrab_pointer(x11rb::CURRENT_TIME)
            .map_err(request_failed)?;
        conn.flush().map_err(request_failed)?;
        debug!("Released input grabs");
        Ok(())
    }

    fn hide_cursor(&mut self, window: WindowHandle) -> Result<(), DisplayError> {
        let conn = &self.session.conn;
        let root = self.session.screen().root;

        // An all-transparent 1x1 bitmap cursor
        let pixmap = conn.generate_id().map_err(request_failed)?;
        let cursor = conn.generate_id().map_err(request_failed)?;
        conn.create_pixmap(1, pixmap, root, 1, 1)
            .map_err(request_failed)?;
        conn.create_cursor(cursor, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0)
            .map_err(request_failed)?;
        conn.change_window_attributes(window.0, &ChangeWindowAttributesAux::new().cursor(cursor))
            .map_err(request_failed)?;
        conn.free_pixmap(pixmap).map_err(request_failed)?;
        conn.free_cursor(cursor).map_err(request_failed)?;
        Ok(())
    }

    fn next_event(&mut self) -> Result<DisplayEvent, DisplayError> {
        loop {
            match self.session.conn.wait_for_event() {
                Ok(event) => return translate_event(event),
                Err(ConnectionError::IoError(e)) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("Event wait interrupted, retrying");
                }
                Err(e) => return Err(DisplayError::ConnectionFailed(e.to_string())),
            }
        }
    }

    fn poll_event(&mut self) -> Result<Option<DisplayEvent>, DisplayError> {
        self.session
            .conn
            .poll_for_event()
            .map_err(|e| DisplayError::ConnectionFailed(e.to_string()))?
            .map(translate_event)
            .transpose()
    }
}

/// Map a raw X11 event onto the events the break enforcer understands.
///
/// An error packet for an earlier request becomes [`DisplayError::RequestFailed`]:
/// a failed map would otherwise leave the loop waiting for a paint that never
/// comes.
fn translate_event(event: Event) -> Result<DisplayEvent, DisplayError> {
    let translated = match event {
        // Only the last Expose of a series; earlier ones are partial
        Event::Expose(e) if e.count == 0 => DisplayEvent::PaintNeeded {
            window: WindowHandle(e.window),
        },
        Event::MotionNotify(e) => DisplayEvent::PointerMoved {
            window: WindowHandle(e.event),
        },
        Event::KeyPress(e) => DisplayEvent::KeyPressed {
            window: WindowHandle(e.event),
        },
        Event::Error(e) => {
            warn!("X11 error: {:?}", e);
            return Err(DisplayError::RequestFailed(format!(
                "{:?} error from {} (bad value {:#x})",
                e.error_kind,
                e.request_name.unwrap_or("unknown request"),
                e.bad_value
            )));
        }
        other => {
            trace!("Ignoring X11 event: {:?}", other);
            DisplayEvent::Other
        }
    };
    Ok(translated)
}

/// [`Renderer`] drawing with core X11 fills.
///
/// Assumes a 24-bit `TrueColor` root visual.
pub struct X11Renderer {
    session: Rc<X11Session>,
    gc: Option<Gcontext>,
    shadow_offset: i16,
}

impl X11Renderer {
    /// `shadow_offset` is how far below the text its dark copy is drawn.
    pub fn new(session: Rc<X11Session>, shadow_offset: i16) -> Self {
        Self {
            session,
            gc: None,
            shadow_offset,
        }
    }

    /// Graphics context, created on first use against `surface`.
    ///
    /// Every overlay window shares root and depth, so one context serves all.
    fn gc(&mut self, surface: &Surface) -> Result<Gcontext, DisplayError> {
        if let Some(gc) = self.gc {
            return Ok(gc);
        }
        let conn = &self.session.conn;
        let gc = conn.generate_id().map_err(request_failed)?;
        conn.create_gc(
            gc,
            surface.window.0,
            &CreateGCAux::new().graphics_exposures(0),
        )
        .map_err(request_failed)?;
        self.gc = Some(gc);
        Ok(gc)
    }

    fn fill(
        &mut self,
        surface: &Surface,
        pixel: u32,
        rects: &[Rectangle],
    ) -> Result<(), DisplayError> {
        let gc = self.gc(surface)?;
        let conn = &self.session.conn;
        conn.change_gc(gc, &ChangeGCAux::new().foreground(pixel))
            .map_err(request_failed)?;
        conn.poly_fill_rectangle(surface.window.0, gc, rects)
            .map_err(request_failed)?;
        Ok(())
    }
}

impl Renderer for X11Renderer {
    fn draw_background(&mut self, surface: &Surface) -> Result<(), DisplayError> {
        let bounds = surface.bounds;
        for (y, height, pixel) in gradient_bands(bounds.height, GRADIENT_BANDS) {
            let band = Rectangle {
                x: 0,
                y,
                width: bounds.width,
                height,
            };
            self.fill(surface, pixel, &[band])?;
        }
        Ok(())
    }

    fn draw_centered_text(&mut self, surface: &Surface, text: &str) -> Result<(), DisplayError> {
        let glyphs = render::layout_text(text, surface.bounds);
        let shadow = render::offset(&glyphs, 0, i32::from(self.shadow_offset));

        let shadow: Vec<Rectangle> = shadow.iter().map(to_x11).collect();
        let glyphs: Vec<Rectangle> = glyphs.iter().map(to_x11).collect();
        self.fill(surface, SHADOW_PIXEL, &shadow)?;
        self.fill(surface, TEXT_PIXEL, &glyphs)
    }

    fn flush(&mut self, _surface: &Surface) -> Result<(), DisplayError> {
        self.session.conn.flush().map_err(request_failed)
    }
}

impl Drop for X11Renderer {
    fn drop(&mut self) {
        if let Some(gc) = self.gc.take() {
            let _ = self.session.conn.free_gc(gc);
            let _ = self.session.conn.flush();
        }
    }
}

/// Split `height` into `bands` horizontal stripes shading from
/// `GRADIENT_TOP` to `GRADIENT_BOTTOM`. Returns `(y, height, pixel)`.
fn gradient_bands(height: u16, bands: u16) -> Vec<(i16, u16, u32)> {
    let bands = bands.clamp(1, height.max(1));
    let total = u32::from(height);
    let steps = u32::from(bands);
    let top = u32::from(GRADIENT_TOP);
    let bottom = u32::from(GRADIENT_BOTTOM);

    (0..steps)
        .map(|i| {
            let y0 = total * i / steps;
            let y1 = total * (i + 1) / steps;
            let grey = if steps == 1 {
                top
            } else {
                top + (bottom - top) * i / (steps - 1)
            };
            let pixel = (grey << 16) | (grey << 8) | grey;
            (
                i16::try_from(y0).unwrap_or(i16::MAX),
                u16::try_from(y1 - y0).unwrap_or(u16::MAX),
                pixel,
            )
        })
        .collect()
}

fn to_x11(rect: &Rect) -> Rectangle {
    let clamp_i16 =
        |v: i32| i16::try_from(v.clamp(i32::from(i16::MIN), i32::from(i16::MAX))).unwrap_or(0);
    Rectangle {
        x: clamp_i16(rect.x),
        y: clamp_i16(rect.y),
        width: u16::try_from(rect.width).unwrap_or(u16::MAX),
        height: u16::try_from(rect.height).unwrap_or(u16::MAX),
    }
}
