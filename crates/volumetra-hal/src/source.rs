//! Generic [`FrameSource`] trait for image-capture hardware and recordings.

use volumetra_types::{Frame, VisionError};

/// A camera, recording, or simulator that yields one frame per cycle.
///
/// Drivers implement this trait and are opened through
/// [`open_source`][crate::open_source] or constructed directly.
pub trait FrameSource {
    /// Stable identifier for this source, e.g. `"webcam:0"`.
    fn id(&self) -> &str;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` once the source is exhausted or the device has been
    /// closed cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DeviceUnavailable`] when the device can no
    /// longer supply frames, and [`VisionError::InvalidFrame`] when a single
    /// capture is unusable but later ones may succeed.
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        (**self).next_frame()
    }
}
