//! Status text drawn onto each frame before it is previewed and encoded.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ REC ON            (red / grey, 3×)           │
//! │ FPS: 19.8         (white, 2×)                │
//! │                                              │
//! │ Press 'r' to toggle recording, ... (white)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Glyphs come from the 8×8 `font8x8` bitmap font and are clipped to the
//! frame, so drawing never changes the frame's dimensions.

use font8x8::{UnicodeFonts, BASIC_FONTS};

use crate::types::{Frame, RecordingState};

/// BGR colours.
pub const RED:   [u8; 3] = [0, 0, 255];
pub const GREY:  [u8; 3] = [200, 200, 200];
pub const WHITE: [u8; 3] = [255, 255, 255];

pub const HELP_TEXT: &str = "Press 'r' to toggle recording, 's' to save screenshot, 'q' to quit";

const GLYPH: i64 = 8;
const MARGIN: i64 = 10;
const STATUS_SCALE: u32 = 3;
const RATE_SCALE: u32 = 2;
const HELP_SCALE: u32 = 1;

/// Draw the recording indicator, measured rate and help line in place.
pub fn render_status(frame: &mut Frame, state: RecordingState, measured_fps: f64) {
    let color = if state.is_recording() { RED } else { GREY };
    draw_text(frame, &state.to_string(), MARGIN, MARGIN, STATUS_SCALE, color);

    let rate_top = MARGIN + GLYPH * STATUS_SCALE as i64 + 8;
    draw_text(frame, &format!("FPS: {measured_fps:.1}"), MARGIN, rate_top, RATE_SCALE, WHITE);

    let help_top = frame.height() as i64 - MARGIN - GLYPH * HELP_SCALE as i64;
    draw_text(frame, HELP_TEXT, MARGIN, help_top, HELP_SCALE, WHITE);
}

/// Draw `text` with its top-left corner at `(x, y)`.
///
/// Characters missing from the font are skipped but still advance the pen.
pub fn draw_text(frame: &mut Frame, text: &str, x: i64, y: i64, scale: u32, color: [u8; 3]) {
    let scale = scale.max(1) as i64;
    let mut pen_x = x;
    for c in text.chars() {
        if pen_x >= frame.width() as i64 {
            break;
        }
        if let Some(rows) = BASIC_FONTS.get(c) {
            draw_glyph(frame, &rows, pen_x, y, scale, color);
        }
        pen_x += GLYPH * scale;
    }
}

fn draw_glyph(frame: &mut Frame, rows: &[u8; 8], x: i64, y: i64, scale: i64, color: [u8; 3]) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..8 {
            if bits & (1 << col) == 0 {
                continue;
            }
            let px = x + col as i64 * scale;
            let py = y + row as i64 * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    frame.put_pixel(px + dx, py + dy, color);
                }
            }
        }
    }
}
