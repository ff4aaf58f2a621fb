//! Synthetic frame source for demos, CI and tests without a camera.
//!
//! [`SyntheticBallSource`] renders a flat-shaded disc ("the ball") on a dark
//! background sprinkled with deterministic pseudo-noise. The disc radius is
//! scripted per frame so tests can exercise calibration followed by
//! measurement of a different sphere.
//!
//! # Example
//!
//! ```rust
//! use volumetra_hal::{FrameSource, sim::SyntheticBallSource};
//!
//! let mut source = SyntheticBallSource::new("sim", 160, 120)
//!     .with_script(vec![Some(30.0), None])
//!     .with_frame_limit(2);
//!
//! assert!(source.next_frame().unwrap().is_some());
//! assert!(source.next_frame().unwrap().is_some());
//! assert!(source.next_frame().unwrap().is_none());
//! ```

use tracing::trace;
use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::source::FrameSource;

const BACKGROUND: [u8; 3] = [28, 30, 34];
const BALL: [u8; 3] = [235, 140, 45];

/// Renders a scripted sequence of ball frames.
#[derive(Debug, Clone)]
pub struct SyntheticBallSource {
    id: String,
    width: u32,
    height: u32,
    center: (f64, f64),
    /// Radius per frame, cycled; `None` renders an empty scene.
    script: Vec<Option<f64>>,
    noise_amplitude: u8,
    frame_limit: Option<u64>,
    emitted: u64,
    rng_state: u64,
}

impl SyntheticBallSource {
    /// A centred ball of radius `min(width, height) / 4` on every frame,
    /// never ending.
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        let radius = f64::from(width.min(height)) / 4.0;
        Self {
            id: id.into(),
            width,
            height,
            center: (f64::from(width) / 2.0, f64::from(height) / 2.0),
            script: vec![Some(radius)],
            noise_amplitude: 6,
            frame_limit: None,
            emitted: 0,
            rng_state: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Place the ball center at `(x, y)` pixels.
    pub fn with_center(mut self, x: f64, y: f64) -> Self {
        self.center = (x, y);
        self
    }

    /// Replace the per-frame radius script. An empty script renders no ball.
    pub fn with_script(mut self, script: Vec<Option<f64>>) -> Self {
        self.script = script;
        self
    }

    /// Peak amplitude of the background noise (0 disables it).
    pub fn with_noise(mut self, amplitude: u8) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// End the stream after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Number of frames produced so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn next_noise(&mut self) -> i16 {
        if self.noise_amplitude == 0 {
            return 0;
        }
        // xorshift64
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        let span = u64::from(self.noise_amplitude) * 2 + 1;
        (x % span) as i16 - i16::from(self.noise_amplitude)
    }

    fn render(&mut self, radius: Option<f64>) -> Frame {
        let mut frame = Frame::blank(self.width, self.height, PixelFormat::Rgb8);
        let (cx, cy) = self.center;
        for y in 0..self.height {
            for x in 0..self.width {
                let inside = radius.is_some_and(|r| {
                    let dx = f64::from(x) + 0.5 - cx;
                    let dy = f64::from(y) + 0.5 - cy;
                    dx * dx + dy * dy <= r * r
                });
                let base = if inside { BALL } else { BACKGROUND };
                let noise = self.next_noise();
                let idx = (y as usize * self.width as usize + x as usize) * 3;
                for (c, value) in base.iter().enumerate() {
                    frame.data[idx + c] = (i16::from(*value) + noise).clamp(0, 255) as u8;
                }
            }
        }
        frame
    }
}

impl FrameSource for SyntheticBallSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        if self.frame_limit.is_some_and(|limit| self.emitted >= limit) {
            return Ok(None);
        }
        let radius = if self.script.is_empty() {
            None
        } else {
            self.script[(self.emitted % self.script.len() as u64) as usize]
        };
        let frame = self.render(radius);
        self.emitted += 1;
        trace!(source = %self.id, frame = self.emitted, ?radius, "rendered synthetic frame");
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * frame.width as usize + x as usize) * 3;
        [frame.data[idx], frame.data[idx + 1], frame.data[idx + 2]]
    }

    #[test]
    fn renders_ball_inside_radius_only() {
        let mut source = SyntheticBallSource::new("sim", 100, 80)
            .with_center(50.0, 40.0)
            .with_script(vec![Some(20.0)])
            .with_noise(0);
        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.validate().is_ok());
        assert_eq!(pixel(&frame, 50, 40), BALL);
        assert_eq!(pixel(&frame, 5, 5), BACKGROUND);
        assert_eq!(pixel(&frame, 50, 40 + 25), BACKGROUND);
    }

    #[test]
    fn script_cycles_and_none_renders_empty_scene() {
        let mut source = SyntheticBallSource::new("sim", 40, 40)
            .with_script(vec![Some(10.0), None])
            .with_noise(0);
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(pixel(&first, 20, 20), BALL);
        assert_eq!(pixel(&second, 20, 20), BACKGROUND);
        assert_eq!(first, third);
    }

    #[test]
    fn frame_limit_ends_stream() {
        let mut source = SyntheticBallSource::new("sim", 8, 8).with_frame_limit(2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.emitted(), 2);
    }

    #[test]
    fn noise_is_bounded_and_deterministic() {
        let mut a = SyntheticBallSource::new("a", 16, 16).with_script(vec![]).with_noise(5);
        let mut b = SyntheticBallSource::new("b", 16, 16).with_script(vec![]).with_noise(5);
        let fa = a.next_frame().unwrap().unwrap();
        let fb = b.next_frame().unwrap().unwrap();
        assert_eq!(fa, fb);
        for chunk in fa.data.chunks(3) {
            for (c, value) in chunk.iter().enumerate() {
                let diff = i16::from(*value) - i16::from(BACKGROUND[c]);
                assert!(diff.abs() <= 5, "noise out of bounds: {diff}");
            }
        }
    }
}
