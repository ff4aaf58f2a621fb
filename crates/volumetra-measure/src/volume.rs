//! Sphere geometry from a calibrated circle.
//!
//! The detected circle is taken to be the sphere's silhouette seen
//! frontally, so its radius is the sphere's radius.

use std::f64::consts::PI;

use volumetra_types::{
    CalibrationRatio, CircleCandidate, VisionError, VolumeMeasurement, WeightEstimate,
};

const MM_PER_CM: f64 = 10.0;

/// Physical radius, diameter and volume of `circle` under `ratio`.
///
/// ```
/// use volumetra_measure::estimate;
/// use volumetra_types::{CalibrationRatio, CircleCandidate};
///
/// let circle = CircleCandidate { center_x: 0.0, center_y: 0.0, radius_px: 50.0, score: 1.0, votes: 1 };
/// let m = estimate(&circle, &CalibrationRatio::new(5.0).unwrap());
/// assert_eq!(m.radius_mm, 10.0);
/// assert_eq!(m.diameter_mm, 20.0);
/// assert!((m.volume_cm3 - 4.18879).abs() < 1e-5);
/// ```
pub fn estimate(circle: &CircleCandidate, ratio: &CalibrationRatio) -> VolumeMeasurement {
    let radius_mm = circle.radius_px / ratio.pixels_per_mm();
    let radius_cm = radius_mm / MM_PER_CM;
    VolumeMeasurement {
        radius_mm,
        diameter_mm: 2.0 * radius_mm,
        volume_cm3: 4.0 / 3.0 * PI * radius_cm.powi(3),
    }
}

/// [`estimate`] when both a circle and a ratio are available.
pub fn measure(
    circle: Option<&CircleCandidate>,
    ratio: Option<&CalibrationRatio>,
) -> Option<VolumeMeasurement> {
    Some(estimate(circle?, ratio?))
}

/// Weight of a solid sphere of uniform density.
pub fn weight(volume: &VolumeMeasurement, density_g_per_cm3: f64) -> WeightEstimate {
    WeightEstimate {
        density_g_per_cm3,
        weight_g: volume.volume_cm3 * density_g_per_cm3,
    }
}

/// Accept `g_per_cm3` as a material density.
///
/// # Errors
///
/// Returns [`VisionError::Config`] unless the value is finite and positive.
pub fn validate_density(g_per_cm3: f64) -> Result<f64, VisionError> {
    if g_per_cm3.is_finite() && g_per_cm3 > 0.0 {
        Ok(g_per_cm3)
    } else {
        Err(VisionError::Config(format!(
            "density must be a positive number of g/cm³, got {g_per_cm3}"
        )))
    }
}
