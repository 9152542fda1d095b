//! Countdown rendering.
//!
//! [`Renderer`] is the drawing capability the overlay needs. The text layout
//! lives here too: countdown digits are drawn as seven-segment glyphs built
//! from filled rectangles, so a backend only has to know how to fill boxes.

use crate::display::{Bounds, DisplayError, WindowHandle};

/// A window that can be drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub window: WindowHandle,
    pub bounds: Bounds,
}

/// Drawing capability.
pub trait Renderer {
    /// Paint the whole surface with the overlay background.
    fn draw_background(&mut self, surface: &Surface) -> Result<(), DisplayError>;

    /// Draw `text` centred in the surface.
    fn draw_centered_text(&mut self, surface: &Surface, text: &str) -> Result<(), DisplayError>;

    /// Push pending drawing to the screen.
    fn flush(&mut self, surface: &Surface) -> Result<(), DisplayError>;
}

/// Format seconds as `MM:SS`.
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Draw one complete countdown frame.
pub fn render_frame<R>(
    renderer: &mut R,
    surface: &Surface,
    seconds: u64,
) -> Result<(), DisplayError>
where
    R: Renderer + ?Sized,
{
    renderer.draw_background(surface)?;
    renderer.draw_centered_text(surface, &format_countdown(seconds))?;
    renderer.flush(surface)
}

/// Axis-aligned filled box, in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: u32::try_from(width).unwrap_or(0),
            height: u32::try_from(height).unwrap_or(0),
        }
    }
}

// Segment bits: a=top, b=top right, c=bottom right, d=bottom, e=bottom left,
// f=top left, g=middle.
const SEG_A: u8 = 1 << 0;
const SEG_B: u8 = 1 << 1;
const SEG_C: u8 = 1 << 2;
const SEG_D: u8 = 1 << 3;
const SEG_E: u8 = 1 << 4;
const SEG_F: u8 = 1 << 5;
const SEG_G: u8 = 1 << 6;

const DIGIT_SEGMENTS: [u8; 10] = [
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,
    SEG_B | SEG_C,
    SEG_A | SEG_B | SEG_G | SEG_E | SEG_D,
    SEG_A | SEG_B | SEG_G | SEG_C | SEG_D,
    SEG_F | SEG_G | SEG_B | SEG_C,
    SEG_A | SEG_F | SEG_G | SEG_C | SEG_D,
    SEG_A | SEG_F | SEG_G | SEG_E | SEG_C | SEG_D,
    SEG_A | SEG_B | SEG_C,
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,
];

/// Glyph metrics derived from the surface size.
#[derive(Debug, Clone, Copy)]
struct Metrics {
    digit_width: i32,
    digit_height: i32,
    stroke: i32,
    gap: i32,
}

impl Metrics {
    fn for_bounds(bounds: Bounds) -> Self {
        let height = i32::from(bounds.height);
        let width = i32::from(bounds.width);
        // Digits are half as wide as tall; "MM:SS" should fill roughly
        // half the screen width at most.
        let digit_width = (height / 8).min(width / 14).max(5);
        let stroke = (digit_width / 5).max(1);
        Self {
            digit_width,
            digit_height: digit_width * 2,
            stroke,
            gap: stroke * 2,
        }
    }

    fn advance(self, c: char) -> i32 {
        if c == ':' {
            self.stroke * 3
        } else {
            self.digit_width
        }
    }
}

/// Lay out `text` centred in `bounds`.
///
/// Digits and `:` are drawn; any other character leaves a blank cell.
pub fn layout_text(text: &str, bounds: Bounds) -> Vec<Rect> {
    let metrics = Metrics::for_bounds(bounds);
    let count = i32::try_from(text.chars().count()).unwrap_or(i32::MAX);
    let total_width: i32 = text.chars().map(|c| metrics.advance(c)).sum::<i32>()
        + metrics.gap * (count - 1).max(0);

    let mut x = i32::from(bounds.width) / 2 - total_width / 2;
    let y = i32::from(bounds.height) / 2 - metrics.digit_height / 2;

    let mut rects = Vec::new();
    for c in text.chars() {
        match c {
            ':' => colon(&mut rects, metrics, x, y),
            _ => {
                if let Some(d) = c.to_digit(10) {
                    digit(&mut rects, metrics, DIGIT_SEGMENTS[d as usize], x, y);
                }
            }
        }
        x += metrics.advance(c) + metrics.gap;
    }
    rects
}

/// Translate rectangles by `(dx, dy)`.
pub fn offset(rects: &[Rect], dx: i32, dy: i32) -> Vec<Rect> {
    rects
        .iter()
        .map(|r| Rect {
            x: r.x + dx,
            y: r.y + dy,
            ..*r
        })
        .collect()
}

fn digit(rects: &mut Vec<Rect>, m: Metrics, segments: u8, x: i32, y: i32) {
    let w = m.digit_width;
    let h = m.digit_height;
    let t = m.stroke;
    let mid = y + h / 2 - t / 2;
    let upper = mid - y + t / 2;
    let lower = y + h - mid - t / 2;

    let boxes = [
        (SEG_A, Rect::new(x, y, w, t)),
        (SEG_B, Rect::new(x + w - t, y, t, upper)),
        (SEG_C, Rect::new(x + w - t, mid + t / 2, t, lower)),
        (SEG_D, Rect::new(x, y + h - t, w, t)),
        (SEG_E, Rect::new(x, mid + t / 2, t, lower)),
        (SEG_F, Rect::new(x, y, t, upper)),
        (SEG_G, Rect::new(x, mid, w, t)),
    ];
    rects.extend(
        boxes
            .into_iter()
            .filter(|(bit, _)| segments & bit != 0)
            .map(|(_, r)| r),
    );
}

fn colon(rects: &mut Vec<Rect>, m: Metrics, x: i32, y: i32) {
    let t = m.stroke;
    let h = m.digit_height;
    rects.push(Rect::new(x + t, y + h / 3 - t / 2, t, t));
    rects.push(Rect::new(x + t, y + 2 * h / 3 - t / 2, t, t));
}
