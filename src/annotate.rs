//! Text overlay burned into frames.
//!
//! The same rendering serves the live preview and the persisted copy, so the
//! two always look identical. Styling is deliberately fixed: anchor, scale,
//! and padding are constants, not derived from frame size, so the label
//! reads the same on every camera the station is pointed at.

use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// Embedded label face; keeps rendering identical across machines.
static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

const FONT_SCALE: f32 = 28.0;
const PADDING: i32 = 6;
const ANCHOR_X: i32 = 10;
const ANCHOR_Y: i32 = 10;

/// Phosphor green on black, readable over shop-floor footage.
const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

fn font() -> &'static FontRef<'static> {
    static FONT: OnceLock<FontRef<'static>> = OnceLock::new();
    FONT.get_or_init(|| FontRef::try_from_slice(FONT_DATA).expect("embedded font is valid"))
}

/// Compose the burned-in label: identifier plus wall-clock time.
///
/// Preview and capture must pass the same string to [`annotate`] /
/// [`annotate_in_place`] so both copies carry the same overlay. A blank
/// identifier renders as "N/A".
pub fn label_text(identifier: &str, time: DateTime<Local>) -> String {
    let identifier = identifier.trim();
    let identifier = if identifier.is_empty() { "N/A" } else { identifier };
    format!("{} {}", identifier, time.format("%H:%M:%S %d-%m-%Y"))
}

/// Overlay `text` on a copy of `frame`; the original is untouched.
///
/// This is the persistence path: the live frame may still be shown (or saved
/// again) afterwards and must not accumulate overlays.
pub fn annotate(frame: &RgbImage, text: &str) -> RgbImage {
    let mut copy = frame.clone();
    annotate_in_place(&mut copy, text);
    copy
}

/// Overlay `text` directly on `frame`. Preview path only; that buffer is
/// discarded right after render.
pub fn annotate_in_place(frame: &mut RgbImage, text: &str) {
    if text.is_empty() {
        return;
    }

    let scale = PxScale::from(FONT_SCALE);
    let (text_width, text_height) = text_size(scale, font(), text);

    // Filled background box sized to the measured text plus padding.
    let box_width = (text_width as i32 + 2 * PADDING) as u32;
    let box_height = (text_height as i32 + 2 * PADDING) as u32;
    draw_filled_rect_mut(
        frame,
        Rect::at(ANCHOR_X, ANCHOR_Y).of_size(box_width, box_height),
        BOX_COLOR,
    );

    draw_text_mut(
        frame,
        TEXT_COLOR,
        ANCHOR_X + PADDING,
        ANCHOR_Y + PADDING,
        scale,
        font(),
        text,
    );
}
