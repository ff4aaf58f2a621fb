//! [`SnapshotPresenter`] – periodic annotated PNG dumps.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma, Rgb};
use tracing::{debug, warn};
use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::overlay::draw_overlay;
use crate::presenter::{OverlayData, Presenter};

/// Saves every `every`-th cycle's frame, with the overlay drawn in, as
/// `cycle_NNNNNN.png` under a directory.
///
/// Failures to write are logged and otherwise ignored.
#[derive(Debug)]
pub struct SnapshotPresenter {
    dir: PathBuf,
    every: u64,
    saved: u64,
}

impl SnapshotPresenter {
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] if `every` is zero or `dir` cannot be
    /// created.
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Result<Self, VisionError> {
        if every == 0 {
            return Err(VisionError::Config(
                "snapshot interval must be at least 1".to_string(),
            ));
        }
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            VisionError::Config(format!("cannot create snapshot dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            every,
            saved: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of snapshots written so far.
    pub fn saved(&self) -> u64 {
        self.saved
    }

    fn save(&self, frame: &Frame, path: &Path) -> Result<(), String> {
        let result = match frame.format {
            PixelFormat::Rgb8 => {
                ImageBuffer::<Rgb<u8>, _>::from_raw(frame.width, frame.height, frame.data.as_slice())
                    .ok_or("buffer does not match dimensions")?
                    .save(path)
            }
            PixelFormat::Gray8 => {
                ImageBuffer::<Luma<u8>, _>::from_raw(frame.width, frame.height, frame.data.as_slice())
                    .ok_or("buffer does not match dimensions")?
                    .save(path)
            }
        };
        result.map_err(|e| e.to_string())
    }
}

impl Presenter for SnapshotPresenter {
    fn show(&mut self, frame: &Frame, overlay: &OverlayData) {
        if overlay.cycle % self.every != 0 {
            return;
        }
        let mut annotated = frame.clone();
        draw_overlay(&mut annotated, overlay);
        let path = self.dir.join(format!("cycle_{:06}.png", overlay.cycle));
        match self.save(&annotated, &path) {
            Ok(()) => {
                self.saved += 1;
                debug!(path = %path.display(), "snapshot saved");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "snapshot failed"),
        }
    }
}
