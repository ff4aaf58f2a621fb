//! Capture-size negotiation: ask for the largest size first and step down
//! until the device reports back exactly what was requested.

use tracing::{debug, info};
use volumetra_types::VisionError;

/// Standard capture sizes, largest first.
pub const STANDARD_SIZES: [(u32, u32); 4] = [(1920, 1080), (1280, 720), (800, 600), (640, 480)];

/// Sizes to try for a `width`×`height` request: the request itself, then
/// every standard size with fewer pixels.
pub fn resolution_ladder(width: u32, height: u32) -> Vec<(u32, u32)> {
    let area = u64::from(width) * u64::from(height);
    std::iter::once((width, height))
        .chain(
            STANDARD_SIZES
                .into_iter()
                .filter(|&(w, h)| u64::from(w) * u64::from(h) < area),
        )
        .collect()
}

/// Walk `ladder`, opening the device at each size with `open`, which returns
/// the device and the size it actually delivers.
///
/// The first exact match wins. A mismatching device is dropped before the
/// next size is tried, except on the last rung where it is kept as is. Open
/// failures move on to the next size.
///
/// # Errors
///
/// Returns the last open error when no rung could be opened, or
/// [`VisionError::Config`] for an empty ladder.
pub fn negotiate<T>(
    ladder: &[(u32, u32)],
    mut open: impl FnMut(u32, u32) -> Result<(T, (u32, u32)), VisionError>,
) -> Result<T, VisionError> {
    let mut last_err = VisionError::Config("no capture sizes to try".to_string());
    for (i, &(width, height)) in ladder.iter().enumerate() {
        match open(width, height) {
            Ok((device, actual)) if actual == (width, height) => {
                info!(width, height, "capture size negotiated");
                return Ok(device);
            }
            Ok((device, (aw, ah))) if i + 1 == ladder.len() => {
                info!(width = aw, height = ah, "device kept its own capture size");
                return Ok(device);
            }
            Ok((_, (aw, ah))) => {
                debug!(width, height, got_width = aw, got_height = ah, "size refused");
            }
            Err(e) => {
                debug!(width, height, error = %e, "open failed at this size");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_starts_at_request_and_steps_down() {
        assert_eq!(
            resolution_ladder(1920, 1080),
            vec![(1920, 1080), (1280, 720), (800, 600), (640, 480)]
        );
        assert_eq!(resolution_ladder(1024, 768), vec![(1024, 768), (800, 600), (640, 480)]);
        assert_eq!(resolution_ladder(640, 480), vec![(640, 480)]);
        assert_eq!(resolution_ladder(320, 240), vec![(320, 240)]);
    }

    #[test]
    fn first_exact_size_wins() {
        let mut tried = Vec::new();
        let got = negotiate(&resolution_ladder(1920, 1080), |w, h| {
            tried.push((w, h));
            // Device tops out at 1280×720 and clamps anything larger.
            let actual = if w > 1280 { (1280, 720) } else { (w, h) };
            Ok((actual, actual))
        })
        .unwrap();
        assert_eq!(got, (1280, 720));
        assert_eq!(tried, vec![(1920, 1080), (1280, 720)]);
    }

    #[test]
    fn last_rung_is_kept_even_if_inexact() {
        let got = negotiate(&[(800, 600), (640, 480)], |_, _| Ok(("cam", (352, 288)))).unwrap();
        assert_eq!(got, "cam");
    }

    #[test]
    fn open_failures_fall_through_to_smaller_sizes() {
        let got = negotiate(&resolution_ladder(1280, 720), |w, h| {
            if w >= 800 {
                Err(VisionError::DeviceUnavailable {
                    device: "webcam:0".to_string(),
                    details: format!("{w}x{h} unsupported"),
                })
            } else {
                Ok(((w, h), (w, h)))
            }
        })
        .unwrap();
        assert_eq!(got, (640, 480));
    }

    #[test]
    fn all_failures_return_last_error() {
        let err = negotiate::<()>(&[(640, 480)], |_, _| {
            Err(VisionError::DeviceUnavailable {
                device: "webcam:0".to_string(),
                details: "busy".to_string(),
            })
        })
        .unwrap_err();
        assert!(err.to_string().contains("busy"));
        assert!(matches!(
            negotiate::<()>(&[], |_, _| unreachable!()),
            Err(VisionError::Config(_))
        ));
    }
}
