//! Replays still images from a directory as a frame stream.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::source::FrameSource;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Reads PNG/JPEG files in file-name order, one per frame.
#[derive(Debug)]
pub struct ImageSequenceSource {
    id: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    /// Index every image file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DeviceUnavailable`] if the directory cannot be
    /// listed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, VisionError> {
        let dir = dir.as_ref();
        let id = format!("images:{}", dir.display());
        let entries = fs::read_dir(dir).map_err(|e| VisionError::DeviceUnavailable {
            device: id.clone(),
            details: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        info!(source = %id, frames = files.len(), "indexed image sequence");

        Ok(Self { id, files, next: 0 })
    }

    /// Number of frames left to replay.
    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }
}

impl FrameSource for ImageSequenceSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!(path = %path.display(), "decoding frame");
        let img = image::open(path)
            .map_err(|e| VisionError::InvalidFrame(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Some(Frame {
            width,
            height,
            format: PixelFormat::Rgb8,
            data: img.into_raw(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
        img.save(dir.join(name)).expect("write png");
    }

    #[test]
    fn replays_images_in_name_order_then_ends() {
        let dir = tempfile::tempdir().expect("tmp dir");
        write_png(dir.path(), "b.png", 4, 2, 200);
        write_png(dir.path(), "a.png", 3, 3, 10);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).expect("open");
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame().unwrap().expect("first frame");
        assert_eq!((first.width, first.height), (3, 3));
        assert_eq!(first.data[0], 10);

        let second = source.next_frame().unwrap().expect("second frame");
        assert_eq!((second.width, second.height), (4, 2));
        assert!(second.validate().is_ok());

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_directory_is_device_unavailable() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = ImageSequenceSource::open(dir.path().join("nope")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn corrupt_file_is_invalid_frame_and_stream_continues() {
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::write(dir.path().join("a.png"), b"not a png").unwrap();
        write_png(dir.path(), "b.png", 2, 2, 50);

        let mut source = ImageSequenceSource::open(dir.path()).expect("open");
        assert!(matches!(
            source.next_frame(),
            Err(VisionError::InvalidFrame(_))
        ));
        assert!(source.next_frame().unwrap().is_some());
    }
}
