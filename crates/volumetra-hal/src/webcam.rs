//! Live capture from a local camera through `nokhwa`.
//!
//! Compiled only with the `webcam` cargo feature.

use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use tracing::info;
use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::resolution::{negotiate, resolution_ladder};
use crate::source::FrameSource;

/// A capture device opened by index.
pub struct WebcamSource {
    id: String,
    camera: Camera,
}

impl WebcamSource {
    /// Open device `index` and start streaming. Capture sizes are tried
    /// from `width`×`height` down through the standard sizes until the
    /// device delivers one exactly.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DeviceUnavailable`] if the device cannot be
    /// opened at any size or refuses to stream.
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self, VisionError> {
        let id = format!("webcam:{index}");
        let unavailable = |e: nokhwa::NokhwaError| VisionError::DeviceUnavailable {
            device: id.clone(),
            details: e.to_string(),
        };

        let mut camera = negotiate(&resolution_ladder(width, height), |w, h| {
            let wanted = CameraFormat::new(Resolution::new(w, h), FrameFormat::MJPEG, 30);
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));
            let camera = Camera::new(CameraIndex::Index(index), requested).map_err(unavailable)?;
            let actual = camera.resolution();
            Ok((camera, (actual.width(), actual.height())))
        })?;
        camera.open_stream().map_err(unavailable)?;

        let resolution = camera.resolution();
        info!(
            device = %id,
            width = resolution.width(),
            height = resolution.height(),
            "camera stream opened"
        );
        Ok(Self { id, camera })
    }
}

impl FrameSource for WebcamSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| VisionError::DeviceUnavailable {
                device: self.id.clone(),
                details: e.to_string(),
            })?;
        let img = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| VisionError::InvalidFrame(format!("{}: {e}", self.id)))?;
        let (width, height) = img.dimensions();
        Ok(Some(Frame {
            width,
            height,
            format: PixelFormat::Rgb8,
            data: img.into_raw(),
        }))
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(device = %self.id, error = %e, "failed to stop camera stream");
        }
    }
}
