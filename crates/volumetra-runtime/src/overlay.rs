//! Annotating frames with the selected circle.

use volumetra_types::{Frame, PixelFormat};

use crate::presenter::OverlayData;

const RING_RGB: [u8; 3] = [0, 255, 0];
const CENTER_RGB: [u8; 3] = [255, 0, 0];
const RING_GRAY: u8 = 255;
const CENTER_GRAY: u8 = 0;

/// Ring half-thickness in pixels.
const RING_HALF_WIDTH: f64 = 1.0;
/// Center mark radius in pixels.
const CENTER_RADIUS: i64 = 2;

/// Draw the selected circle's outline and a center mark into `frame`.
///
/// Green ring and red center on RGB frames, white ring and black center on
/// greyscale ones. Anything outside the frame is clipped. A frame with no
/// selected circle, or a malformed frame, is left untouched.
pub fn draw_overlay(frame: &mut Frame, overlay: &OverlayData) {
    let Some(circle) = overlay.circle else {
        return;
    };
    if frame.validate().is_err() {
        return;
    }
    let (ring, center) = match frame.format {
        PixelFormat::Rgb8 => (&RING_RGB[..], &CENTER_RGB[..]),
        PixelFormat::Gray8 => (&[RING_GRAY][..], &[CENTER_GRAY][..]),
    };

    let outer = circle.radius_px + RING_HALF_WIDTH;
    let inner = (circle.radius_px - RING_HALF_WIDTH).max(0.0);
    let max_x = i64::from(frame.width) - 1;
    let max_y = i64::from(frame.height) - 1;
    let x0 = ((circle.center_x - outer).floor() as i64).clamp(0, max_x);
    let x1 = ((circle.center_x + outer).ceil() as i64).clamp(0, max_x);
    let y0 = ((circle.center_y - outer).floor() as i64).clamp(0, max_y);
    let y1 = ((circle.center_y + outer).ceil() as i64).clamp(0, max_y);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = (x as f64 - circle.center_x).hypot(y as f64 - circle.center_y);
            if d >= inner && d <= outer {
                put(frame, x, y, ring);
            }
        }
    }

    let cx = circle.center_x.round() as i64;
    let cy = circle.center_y.round() as i64;
    for dy in -CENTER_RADIUS..=CENTER_RADIUS {
        for dx in -CENTER_RADIUS..=CENTER_RADIUS {
            if dx * dx + dy * dy <= CENTER_RADIUS * CENTER_RADIUS {
                put(frame, cx + dx, cy + dy, center);
            }
        }
    }
}

fn put(frame: &mut Frame, x: i64, y: i64, color: &[u8]) {
    if x < 0 || y < 0 || x >= i64::from(frame.width) || y >= i64::from(frame.height) {
        return;
    }
    let channels = frame.format.channels();
    let idx = (y as usize * frame.width as usize + x as usize) * channels;
    frame.data[idx..idx + channels].copy_from_slice(color);
}
