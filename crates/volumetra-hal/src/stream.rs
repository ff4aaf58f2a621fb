//! Network cameras that serve Motion-JPEG over HTTP (IP-camera and phone
//! camera apps, e.g. `http://192.168.0.106:4747/video`).
//!
//! The response body is a `multipart/x-mixed-replace` stream of JPEG
//! images. Rather than parsing part headers, [`JpegFrameSplitter`] cuts the
//! byte stream at JPEG start-of-image / end-of-image markers, which also
//! works for servers that send bare concatenated JPEGs.

use std::io::{self, Read};
use std::time::Duration;

use image::ImageFormat;
use tracing::{debug, info};
use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::source::FrameSource;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
/// Upper bound on one encoded frame; a stream that exceeds it is not MJPEG.
const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Splits a byte stream into complete JPEG images.
pub struct JpegFrameSplitter<R> {
    reader: R,
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl<R: Read> JpegFrameSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// The next complete JPEG, `Ok(None)` once the stream ends. A trailing
    /// partial image is discarded.
    ///
    /// # Errors
    ///
    /// Read errors from the underlying stream, and
    /// [`io::ErrorKind::InvalidData`] when a frame grows beyond the size
    /// limit (its bytes are dropped so the next call can resynchronise).
    pub fn next_jpeg(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            match find(&self.buf, &SOI) {
                Some(start) => {
                    self.buf.drain(..start);
                    if let Some(end) = find(&self.buf[SOI.len()..], &EOI) {
                        let len = SOI.len() + end + EOI.len();
                        return Ok(Some(self.buf.drain(..len).collect()));
                    }
                }
                None => {
                    // A lone 0xFF at the end may be the first half of a marker.
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    self.buf.drain(..self.buf.len() - keep);
                }
            }
            if self.buf.len() > self.max_frame_bytes {
                self.buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame exceeds {} bytes", self.max_frame_bytes),
                ));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

/// Decodes the JPEG frames of an MJPEG byte stream.
pub struct MjpegStreamSource {
    id: String,
    frames: JpegFrameSplitter<Box<dyn Read + Send>>,
}

impl MjpegStreamSource {
    /// Open `url` and start reading its body.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DeviceUnavailable`] if the URL is malformed,
    /// the server cannot be reached or answers with an error status.
    pub fn connect(url: &str) -> Result<Self, VisionError> {
        let id = format!("stream:{url}");
        let unavailable = |e: reqwest::Error| VisionError::DeviceUnavailable {
            device: id.clone(),
            details: e.to_string(),
        };
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(unavailable)?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;
        info!(
            device = %id,
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "stream connected"
        );
        Ok(Self::from_reader(id, response))
    }

    /// Read MJPEG from any byte source, e.g. a recorded `.mjpeg` file.
    pub fn from_reader(id: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            id: id.into(),
            frames: JpegFrameSplitter::new(Box::new(reader)),
        }
    }
}

impl FrameSource for MjpegStreamSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let jpeg = match self.frames.next_jpeg() {
            Ok(Some(jpeg)) => jpeg,
            Ok(None) => {
                info!(device = %self.id, "stream closed");
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(VisionError::InvalidFrame(format!("{}: {e}", self.id)));
            }
            Err(e) => {
                return Err(VisionError::DeviceUnavailable {
                    device: self.id.clone(),
                    details: e.to_string(),
                });
            }
        };
        debug!(device = %self.id, bytes = jpeg.len(), "decoding frame");
        let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|e| VisionError::InvalidFrame(format!("{}: {e}", self.id)))?
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
