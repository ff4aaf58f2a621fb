//! Noise suppression and intensity conversion ahead of circle detection.
//!
//! A frame is converted to a single-channel `f32` intensity image (BT.601
//! luma for RGB input) and then smoothed with a separable Gaussian: one
//! horizontal and one vertical 1-D pass, O(2k) per pixel instead of O(k²).
//!
//! Borders clamp: samples that fall outside the image replicate the nearest
//! edge pixel.

use volumetra_types::{Frame, PixelFormat, VisionError};

use crate::config::DetectorConfig;

/// Row-major single-channel `f32` image.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl GrayImage {
    /// An all-zero image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Wrap existing row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidFrame`] if `data` does not hold exactly
    /// `width * height` samples.
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Result<Self, VisionError> {
        if data.len() != width * height {
            return Err(VisionError::InvalidFrame(format!(
                "{width}x{height} grey image needs {} samples, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Greyscale conversion plus Gaussian smoothing with a fixed kernel.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    kernel: Vec<f32>,
}

impl Preprocessor {
    /// Build a preprocessor with a `size`-tap Gaussian of deviation `sigma`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] if `size` is even or below 3, or
    /// `sigma` is not a positive number.
    pub fn new(size: usize, sigma: f64) -> Result<Self, VisionError> {
        if size < 3 || size % 2 == 0 {
            return Err(VisionError::Config(format!(
                "blur kernel must be odd and >= 3, got {size}"
            )));
        }
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(VisionError::Config(format!(
                "blur sigma must be positive, got {sigma}"
            )));
        }
        Ok(Self {
            kernel: gaussian_kernel(size, sigma),
        })
    }

    /// Build from the blur fields of a [`DetectorConfig`].
    pub fn from_config(config: &DetectorConfig) -> Result<Self, VisionError> {
        Self::new(config.blur_kernel, config.blur_sigma)
    }

    /// The normalised 1-D kernel applied along both axes.
    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    /// Convert `frame` to intensity and blur it.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidFrame`] for empty frames or frames whose
    /// buffer does not match their dimensions.
    pub fn preprocess(&self, frame: &Frame) -> Result<GrayImage, VisionError> {
        frame.validate()?;
        let gray = to_gray(frame);
        Ok(convolve_separable(&gray, &self.kernel, &self.kernel))
    }
}

/// Sampled, normalised 1-D Gaussian of odd length `size`.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let half = (size / 2) as f64;
    let denom = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

fn to_gray(frame: &Frame) -> GrayImage {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let data = match frame.format {
        PixelFormat::Gray8 => frame.data.iter().map(|&v| f32::from(v)).collect(),
        PixelFormat::Rgb8 => frame
            .data
            .chunks_exact(3)
            .map(|px| 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]))
            .collect(),
    };
    GrayImage {
        width,
        height,
        data,
    }
}

/// Convolve rows with `row_kernel`, then columns with `col_kernel`.
///
/// Both kernels must have odd length; they are applied centered.
pub fn convolve_separable(src: &GrayImage, row_kernel: &[f32], col_kernel: &[f32]) -> GrayImage {
    let tmp = convolve_rows(src, row_kernel);
    convolve_cols(&tmp, col_kernel)
}

fn convolve_rows(src: &GrayImage, kernel: &[f32]) -> GrayImage {
    let w = src.width;
    let half = (kernel.len() / 2) as isize;
    let mut dst = GrayImage::new(w, src.height);
    for y in 0..src.height {
        let row = &src.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - half).clamp(0, w as isize - 1) as usize;
                acc += row[sx] * kv;
            }
            dst.data[y * w + x] = acc;
        }
    }
    dst
}

fn convolve_cols(src: &GrayImage, kernel: &[f32]) -> GrayImage {
    let w = src.width;
    let h = src.height;
    let half = (kernel.len() / 2) as isize;
    let mut dst = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - half).clamp(0, h as isize - 1) as usize;
                acc += src.data[sy * w + x] * kv;
            }
            dst.data[y * w + x] = acc;
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(9, 2.0);
        assert_eq!(k.len(), 9);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        for i in 0..4 {
            assert_relative_eq!(k[i], k[8 - i]);
        }
        assert!(k[4] > k[3] && k[3] > k[0]);
    }

    #[test]
    fn rejects_bad_kernel_parameters() {
        assert!(matches!(Preprocessor::new(4, 2.0), Err(VisionError::Config(_))));
        assert!(matches!(Preprocessor::new(1, 2.0), Err(VisionError::Config(_))));
        assert!(matches!(Preprocessor::new(5, 0.0), Err(VisionError::Config(_))));
    }

    #[test]
    fn uniform_frame_stays_uniform() {
        let pre = Preprocessor::new(5, 1.0).unwrap();
        let frame = Frame {
            width: 6,
            height: 4,
            format: PixelFormat::Gray8,
            data: vec![100; 24],
        };
        let out = pre.preprocess(&frame).unwrap();
        for &v in out.as_slice() {
            assert_relative_eq!(v, 100.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn rgb_is_converted_with_luma_weights() {
        let pre = Preprocessor::new(3, 0.5).unwrap();
        let frame = Frame {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
            data: vec![255, 0, 0],
        };
        let out = pre.preprocess(&frame).unwrap();
        assert_relative_eq!(out.get(0, 0), 0.299 * 255.0, epsilon = 1e-3);
    }

    #[test]
    fn blur_suppresses_isolated_spike() {
        let pre = Preprocessor::new(9, 2.0).unwrap();
        let mut frame = Frame::blank(15, 15, PixelFormat::Gray8);
        frame.data[7 * 15 + 7] = 255;
        let out = pre.preprocess(&frame).unwrap();
        let peak = out.get(7, 7);
        assert!(peak < 255.0 * 0.1, "spike survived blur: {peak}");
        assert!(out.get(6, 7) > 0.0);
        let total: f32 = out.as_slice().iter().sum();
        assert_relative_eq!(total, 255.0, epsilon = 0.5);
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let pre = Preprocessor::from_config(&DetectorConfig::default()).unwrap();
        let frame = Frame {
            width: 4,
            height: 4,
            format: PixelFormat::Rgb8,
            data: vec![0; 10],
        };
        assert!(matches!(
            pre.preprocess(&frame),
            Err(VisionError::InvalidFrame(_))
        ));
        let empty = Frame::blank(0, 0, PixelFormat::Rgb8);
        assert!(matches!(
            pre.preprocess(&empty),
            Err(VisionError::InvalidFrame(_))
        ));
    }

    #[test]
    fn gray_image_from_raw_checks_length() {
        assert!(GrayImage::from_raw(2, 2, vec![0.0; 4]).is_ok());
        assert!(GrayImage::from_raw(2, 2, vec![0.0; 3]).is_err());
    }
}
