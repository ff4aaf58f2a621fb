//! `volumetra-hal` – frame acquisition.
//!
//! # Modules
//!
//! - [`source`] – the [`FrameSource`] trait every driver implements.
//! - [`sim`] – [`SyntheticBallSource`][sim::SyntheticBallSource]: renders a
//!   scripted ball for CI and demos.
//! - [`image_dir`] – [`ImageSequenceSource`][image_dir::ImageSequenceSource]:
//!   replays a directory of PNG/JPEG stills.
//! - [`stream`] – [`MjpegStreamSource`][stream::MjpegStreamSource]: network
//!   cameras serving Motion-JPEG over HTTP.
//! - [`resolution`] – capture-size ladder used when opening a webcam.
//! - `webcam` – `WebcamSource`: live capture via `nokhwa` (feature
//!   `webcam`).
//!
//! [`open_source`] builds the driver named by a [`SourceSpec`], which is what
//! the CLI reads from its config file.

pub mod image_dir;
pub mod resolution;
pub mod sim;
pub mod source;
pub mod stream;
#[cfg(feature = "webcam")]
pub mod webcam;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use volumetra_types::VisionError;

pub use source::FrameSource;

/// Which driver to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Images,
    Webcam,
    /// MJPEG over HTTP from [`SourceSpec::url`].
    Stream,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Synthetic => write!(f, "synthetic"),
            SourceKind::Images => write!(f, "images"),
            SourceKind::Webcam => write!(f, "webcam"),
            SourceKind::Stream => write!(f, "stream"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "sim" => Ok(SourceKind::Synthetic),
            "images" | "image" => Ok(SourceKind::Images),
            "webcam" | "camera" => Ok(SourceKind::Webcam),
            "stream" | "mjpeg" | "http" | "url" => Ok(SourceKind::Stream),
            other => Err(VisionError::Config(format!("unknown source kind '{other}'"))),
        }
    }
}

/// Driver selection and capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(default)]
    pub kind: SourceKind,
    /// Capture device index for [`SourceKind::Webcam`].
    #[serde(default)]
    pub camera_index: u32,
    /// Directory replayed by [`SourceKind::Images`].
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    /// MJPEG endpoint read by [`SourceKind::Stream`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Requested capture width; also the synthetic frame width.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Requested capture height; also the synthetic frame height.
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("frames")
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            camera_index: 0,
            image_dir: default_image_dir(),
            url: None,
            width: default_width(),
            height: default_height(),
        }
    }
}

/// Open the driver described by `spec`.
///
/// # Errors
///
/// Returns [`VisionError::DeviceUnavailable`] if the device, directory or
/// stream cannot be opened, or [`VisionError::Config`] when the webcam driver
/// was not compiled in or a stream source has no URL.
pub fn open_source(spec: &SourceSpec) -> Result<Box<dyn FrameSource>, VisionError> {
    match spec.kind {
        SourceKind::Synthetic => Ok(Box::new(sim::SyntheticBallSource::new(
            "synthetic",
            spec.width,
            spec.height,
        ))),
        SourceKind::Images => Ok(Box::new(image_dir::ImageSequenceSource::open(
            &spec.image_dir,
        )?)),
        SourceKind::Webcam => open_webcam(spec),
        SourceKind::Stream => {
            let url = spec.url.as_deref().ok_or_else(|| {
                VisionError::Config("source kind 'stream' needs a url".to_string())
            })?;
            Ok(Box::new(stream::MjpegStreamSource::connect(url)?))
        }
    }
}

#[cfg(feature = "webcam")]
fn open_webcam(spec: &SourceSpec) -> Result<Box<dyn FrameSource>, VisionError> {
    Ok(Box::new(webcam::WebcamSource::open(
        spec.camera_index,
        spec.width,
        spec.height,
    )?))
}

#[cfg(not(feature = "webcam"))]
fn open_webcam(_spec: &SourceSpec) -> Result<Box<dyn FrameSource>, VisionError> {
    Err(VisionError::Config(
        "webcam support not compiled in; rebuild with `--features webcam`".to_string(),
    ))
}
