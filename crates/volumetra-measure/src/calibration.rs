//! [`Calibration`] – the pixel-to-millimetre ratio and its state machine.
//!
//! ```text
//!   Uncalibrated ──begin_calibration(ok)──▶ Calibrated ──begin_calibration(ok)──┐
//!        │                                      ▲                               │
//!        └──begin_calibration(err): unchanged   └───────────────────────────────┘
//! ```
//!
//! There is no way back to `Uncalibrated`. A failed request never touches
//! the stored ratio.
//!
//! Exactly one [`Calibration`] value owns the ratio and mutates it through
//! `&mut self`. Anything else that needs to look at it (a presenter, the
//! operator console) holds a [`CalibrationReader`], which can be cloned and
//! sent across threads and always sees a whole ratio.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use volumetra_types::{
    CalibrationError, CalibrationRatio, CalibrationState, CircleCandidate, VisionError,
};

// ────────────────────────────────────────────────────────────────────────────
// Calibration
// ────────────────────────────────────────────────────────────────────────────

/// Owner of the calibration ratio.
///
/// # Example
///
/// ```
/// use volumetra_measure::Calibration;
/// use volumetra_types::{CalibrationState, CircleCandidate};
///
/// let mut calibration = Calibration::new();
/// assert_eq!(calibration.state(), CalibrationState::Uncalibrated);
///
/// let reference = CircleCandidate {
///     center_x: 320.0,
///     center_y: 240.0,
///     radius_px: 50.0,
///     score: 0.9,
///     votes: 120,
/// };
/// let ratio = calibration.begin_calibration(Some(&reference), 20.0).unwrap();
/// assert_eq!(ratio.pixels_per_mm(), 5.0);
/// assert_eq!(calibration.state(), CalibrationState::Calibrated);
/// ```
#[derive(Debug, Default)]
pub struct Calibration {
    ratio: Arc<RwLock<Option<CalibrationRatio>>>,
}

impl Calibration {
    /// Start `Uncalibrated`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `Calibrated` with a configured ratio, e.g. for a fixed camera
    /// rig whose geometry is known in advance.
    pub fn with_preset(ratio: CalibrationRatio) -> Self {
        info!(pixels_per_mm = ratio.pixels_per_mm(), "calibration preset applied");
        Self {
            ratio: Arc::new(RwLock::new(Some(ratio))),
        }
    }

    /// Calibrate against `selected`, whose true diameter is
    /// `known_diameter_mm`.
    ///
    /// On success the ratio `2 · radius_px / known_diameter_mm` replaces any
    /// previous one and is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Calibration`] with
    /// - [`CalibrationError::NoObjectSelected`] when `selected` is `None`,
    /// - [`CalibrationError::InvalidDiameter`] when the diameter is not a
    ///   positive finite number,
    /// - [`CalibrationError::DegenerateRadius`] when the candidate's radius is
    ///   not a positive finite number.
    ///
    /// The stored ratio is left untouched in every error case.
    pub fn begin_calibration(
        &mut self,
        selected: Option<&CircleCandidate>,
        known_diameter_mm: f64,
    ) -> Result<CalibrationRatio, VisionError> {
        let result = compute_ratio(selected, known_diameter_mm);
        match &result {
            Ok(ratio) => {
                self.store(*ratio);
                info!(
                    pixels_per_mm = ratio.pixels_per_mm(),
                    known_diameter_mm, "calibration applied"
                );
            }
            Err(e) => warn!(error = %e, "calibration rejected"),
        }
        result.map_err(VisionError::from)
    }

    /// `Calibrated` once any calibration has succeeded.
    pub fn state(&self) -> CalibrationState {
        self.reader().state()
    }

    /// The current ratio, if calibrated.
    pub fn ratio(&self) -> Option<CalibrationRatio> {
        self.reader().ratio()
    }

    /// A read-only handle sharing this calibration's ratio.
    pub fn reader(&self) -> CalibrationReader {
        CalibrationReader {
            ratio: Arc::clone(&self.ratio),
        }
    }

    fn store(&mut self, ratio: CalibrationRatio) {
        let mut slot = match self.ratio.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(ratio);
    }
}

fn compute_ratio(
    selected: Option<&CircleCandidate>,
    known_diameter_mm: f64,
) -> Result<CalibrationRatio, CalibrationError> {
    let candidate = selected.ok_or(CalibrationError::NoObjectSelected)?;
    if !(known_diameter_mm.is_finite() && known_diameter_mm > 0.0) {
        return Err(CalibrationError::InvalidDiameter(known_diameter_mm));
    }
    let radius = candidate.radius_px;
    if !(radius.is_finite() && radius > 0.0) {
        return Err(CalibrationError::DegenerateRadius(radius));
    }
    CalibrationRatio::new(2.0 * radius / known_diameter_mm)
        .ok_or(CalibrationError::DegenerateRadius(radius))
}

// ────────────────────────────────────────────────────────────────────────────
// CalibrationReader
// ────────────────────────────────────────────────────────────────────────────

/// Shared read-only view of a [`Calibration`].
#[derive(Debug, Clone)]
pub struct CalibrationReader {
    ratio: Arc<RwLock<Option<CalibrationRatio>>>,
}

impl CalibrationReader {
    pub fn ratio(&self) -> Option<CalibrationRatio> {
        // Writes are single assignments; a poisoned slot still holds a whole
        // value.
        match self.ratio.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> CalibrationState {
        if self.ratio().is_some() {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Uncalibrated
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
