//! Detector tuning parameters.

use serde::{Deserialize, Serialize};
use volumetra_types::VisionError;

/// Parameters shared by the [`Preprocessor`][crate::Preprocessor] and the
/// [`CircleDetector`][crate::CircleDetector].
///
/// Defaults reproduce the classic webcam setup: 9×9 Gaussian with σ = 2,
/// radii 20–300 px at full accumulator resolution, 30 center votes and at
/// most one circle per 100 px.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Gaussian kernel width in pixels; odd and at least 3.
    pub blur_kernel: usize,
    /// Gaussian standard deviation in pixels.
    pub blur_sigma: f64,
    /// Minimum Sobel gradient magnitude for a pixel to count as an edge.
    pub edge_threshold: f64,
    pub min_radius_px: u32,
    pub max_radius_px: u32,
    /// Accumulator cell size in pixels, at least 1.0 (1.0 = one cell per
    /// pixel, 2.0 = half the image resolution).
    pub accumulator_resolution: f64,
    /// Center votes a cell needs before it is considered a circle center.
    pub min_votes: u32,
    /// Centers closer than this to an already reported circle are dropped.
    pub min_center_distance_px: f64,
    /// Minimum fraction of the circumference that must be backed by edges.
    pub min_coverage: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 9,
            blur_sigma: 2.0,
            edge_threshold: 50.0,
            min_radius_px: 20,
            max_radius_px: 300,
            accumulator_resolution: 1.0,
            min_votes: 30,
            min_center_distance_px: 100.0,
            min_coverage: 0.3,
        }
    }
}

impl DetectorConfig {
    /// Check every parameter, reporting the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.blur_kernel < 3 || self.blur_kernel % 2 == 0 {
            return Err(config_error(format!(
                "blur_kernel must be odd and >= 3, got {}",
                self.blur_kernel
            )));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma > 0.0) {
            return Err(config_error(format!(
                "blur_sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        if !(self.edge_threshold.is_finite() && self.edge_threshold >= 0.0) {
            return Err(config_error(format!(
                "edge_threshold must be >= 0, got {}",
                self.edge_threshold
            )));
        }
        if self.min_radius_px == 0 {
            return Err(config_error("min_radius_px must be >= 1".to_string()));
        }
        if self.min_radius_px > self.max_radius_px {
            return Err(config_error(format!(
                "min_radius_px ({}) exceeds max_radius_px ({})",
                self.min_radius_px, self.max_radius_px
            )));
        }
        if !(self.accumulator_resolution.is_finite() && self.accumulator_resolution >= 1.0) {
            return Err(config_error(format!(
                "accumulator_resolution must be >= 1 (image pixels per accumulator cell), got {}",
                self.accumulator_resolution
            )));
        }
        if self.min_votes == 0 {
            return Err(config_error("min_votes must be >= 1".to_string()));
        }
        if !(self.min_center_distance_px.is_finite() && self.min_center_distance_px >= 0.0) {
            return Err(config_error(format!(
                "min_center_distance_px must be >= 0, got {}",
                self.min_center_distance_px
            )));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(config_error(format!(
                "min_coverage must lie in [0, 1], got {}",
                self.min_coverage
            )));
        }
        Ok(())
    }
}

fn config_error(msg: String) -> VisionError {
    VisionError::Config(format!("detector: {msg}"))
}
