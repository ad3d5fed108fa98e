//! # Coordinate Normalization
//!
//! Three coordinate spaces meet in this crate:
//! - **device pixels**: what the UI tree reports and what taps use
//! - **screenshot pixels**: the captured raster, possibly downscaled or cropped
//! - **percent**: 0-100 on each axis, portable across resolutions
//!
//! Everything here is pure and deterministic.

use serde::{Deserialize, Serialize};

/// How a screenshot relates to the device screen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureFrame {
    /// Size of the image the coordinates were read from.
    pub displayed: (u32, u32),
    /// Top-left of the crop in device pixels, (0, 0) when uncropped.
    pub crop_offset: (i32, i32),
    /// Size of the original capture in device pixels.
    pub original: (u32, u32),
}

impl CaptureFrame {
    /// An uncropped capture displayed at `displayed` of a screen sized `original`.
    pub fn scaled(displayed: (u32, u32), original: (u32, u32)) -> Self {
        Self {
            displayed,
            crop_offset: (0, 0),
            original,
        }
    }

    pub fn has_crop(&self) -> bool {
        self.crop_offset != (0, 0)
    }
}

/// Pixel to percent. A zero-sized axis maps to 0.
pub fn to_percent(x: f64, y: f64, screen_w: u32, screen_h: u32) -> (f64, f64) {
    let px = if screen_w == 0 { 0.0 } else { x / screen_w as f64 * 100.0 };
    let py = if screen_h == 0 { 0.0 } else { y / screen_h as f64 * 100.0 };
    (px, py)
}

/// Percent to pixel, rounded to the nearest pixel and clamped to the screen.
pub fn to_pixel(x_percent: f64, y_percent: f64, screen_w: u32, screen_h: u32) -> (i32, i32) {
    let x = (x_percent / 100.0 * screen_w as f64).round();
    let y = (y_percent / 100.0 * screen_h as f64).round();
    (
        x.clamp(0.0, screen_w as f64) as i32,
        y.clamp(0.0, screen_h as f64) as i32,
    )
}

/// Maps a point read from a (possibly cropped or rescaled) screenshot back to
/// device pixels.
///
/// Crops are never rescaled: when an offset is present it is added as-is.
/// Otherwise, if the displayed size differs from the original, each axis is
/// scaled by `original / displayed`.
pub fn reconcile(x: f64, y: f64, frame: &CaptureFrame) -> (f64, f64) {
    if frame.has_crop() {
        return (x + frame.crop_offset.0 as f64, y + frame.crop_offset.1 as f64);
    }
    let (dw, dh) = frame.displayed;
    let (ow, oh) = frame.original;
    if (dw, dh) == (ow, oh) || dw == 0 || dh == 0 {
        return (x, y);
    }
    (x * ow as f64 / dw as f64, y * oh as f64 / dh as f64)
}

/// Clamps a device point onto the screen rectangle.
pub fn clamp_to_screen(x: f64, y: f64, screen_w: u32, screen_h: u32) -> (f64, f64) {
    (x.clamp(0.0, screen_w as f64), y.clamp(0.0, screen_h as f64))
}
