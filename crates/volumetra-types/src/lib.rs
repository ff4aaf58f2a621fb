use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Pixel layout of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB, 3 bytes per pixel.
    Rgb8,
    /// 8-bit greyscale, 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// Number of bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A raw image frame produced once per cycle by a frame source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub format: PixelFormat,
    /// Row-major pixel data.
    pub data: Vec<u8>,
}

impl Frame {
    /// An all-black frame of the given size.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0u8; width as usize * height as usize * format.channels()],
        }
    }

    /// Check that the frame is non-empty and that `data` matches its
    /// declared dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidFrame`] describing the first violation.
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.width == 0 || self.height == 0 {
            return Err(VisionError::InvalidFrame(format!(
                "empty frame ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * self.format.channels();
        if self.data.len() != expected {
            return Err(VisionError::InvalidFrame(format!(
                "{}x{} {:?} frame carries {} bytes, expected {}",
                self.width,
                self.height,
                self.format,
                self.data.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// A circle hypothesis reported by the detector, in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleCandidate {
    pub center_x: f64,
    pub center_y: f64,
    pub radius_px: f64,
    /// Fraction of the circumference backed by edge evidence, in `[0, 1]`.
    pub score: f64,
    /// Center accumulator votes behind this candidate.
    pub votes: u32,
}

/// Conversion factor between image distance and physical distance.
///
/// Only constructible with a strictly positive, finite value. Serialises as
/// a bare number of pixels per millimetre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CalibrationRatio {
    pixels_per_mm: f64,
}

impl CalibrationRatio {
    /// Wrap `pixels_per_mm`, rejecting zero, negative and non-finite values.
    pub fn new(pixels_per_mm: f64) -> Option<Self> {
        (pixels_per_mm.is_finite() && pixels_per_mm > 0.0).then_some(Self { pixels_per_mm })
    }

    pub fn pixels_per_mm(&self) -> f64 {
        self.pixels_per_mm
    }
}

impl TryFrom<f64> for CalibrationRatio {
    type Error = String;

    fn try_from(pixels_per_mm: f64) -> Result<Self, Self::Error> {
        Self::new(pixels_per_mm)
            .ok_or_else(|| format!("pixels_per_mm must be positive and finite, got {pixels_per_mm}"))
    }
}

impl From<CalibrationRatio> for f64 {
    fn from(ratio: CalibrationRatio) -> f64 {
        ratio.pixels_per_mm
    }
}

/// Whether a calibration ratio is currently established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationState {
    Uncalibrated,
    Calibrated,
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationState::Uncalibrated => write!(f, "uncalibrated"),
            CalibrationState::Calibrated => write!(f, "calibrated"),
        }
    }
}

/// Physical size of the selected sphere, derived every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeasurement {
    pub radius_mm: f64,
    pub diameter_mm: f64,
    pub volume_cm3: f64,
}

/// Volumetric weight derived from a [`VolumeMeasurement`] and a density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightEstimate {
    pub density_g_per_cm3: f64,
    pub weight_g: f64,
}

/// Requests coming from the operator-input collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum OperatorCommand {
    /// Calibrate against the currently selected sphere, whose true diameter
    /// the operator has just entered.
    Calibrate { known_diameter_mm: f64 },
    /// Set the material density used for the weight readout.
    SetDensity { g_per_cm3: f64 },
    /// End the measurement loop.
    Stop,
}

/// Everything one cycle produced, as published on the measurement topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub cycle: u64,
    pub circle: Option<CircleCandidate>,
    pub state: CalibrationState,
    pub ratio: Option<CalibrationRatio>,
    pub volume: Option<VolumeMeasurement>,
    pub weight: Option<WeightEstimate>,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "volumetra-runtime::measurement_loop"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Measurement(MeasurementReport),
    Operator(OperatorCommand),
    CalibrationApplied(CalibrationRatio),
    /// A calibration or density request was refused; carries the reason.
    CalibrationRejected(String),
    SourceFault { device: String, details: String },
}

/// Reasons a calibration request is refused.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationError {
    #[error("no sphere is currently detected; cannot calibrate against nothing")]
    NoObjectSelected,

    #[error("known diameter must be a positive number of millimetres, got {0}")]
    InvalidDiameter(f64),

    #[error("detected radius {0} px is not usable for calibration")]
    DegenerateRadius(f64),
}

/// Error type spanning capture, calibration and configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VisionError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Calibration rejected: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Device unavailable ({device}): {details}")]
    DeviceUnavailable { device: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    Channel(String),
}

impl VisionError {
    /// `true` for errors that must end the measurement loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VisionError::DeviceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_validate_accepts_consistent_buffer() {
        let frame = Frame::blank(4, 3, PixelFormat::Rgb8);
        assert_eq!(frame.data.len(), 36);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn frame_validate_rejects_empty_and_short_buffers() {
        let empty = Frame::blank(0, 3, PixelFormat::Gray8);
        assert!(matches!(empty.validate(), Err(VisionError::InvalidFrame(_))));

        let mut short = Frame::blank(4, 4, PixelFormat::Gray8);
        short.data.pop();
        let err = short.validate().unwrap_err();
        assert!(err.to_string().contains("expected 16"));
    }

    #[test]
    fn calibration_ratio_rejects_non_positive() {
        assert!(CalibrationRatio::new(0.0).is_none());
        assert!(CalibrationRatio::new(-1.5).is_none());
        assert!(CalibrationRatio::new(f64::NAN).is_none());
        assert!(CalibrationRatio::new(f64::INFINITY).is_none());
        let ratio = CalibrationRatio::new(3.14).unwrap();
        assert!((ratio.pixels_per_mm() - 3.14).abs() < f64::EPSILON);
    }

    #[test]
    fn calibration_ratio_deserialisation_keeps_invariant() {
        let ratio: CalibrationRatio = serde_json::from_str("2.5").unwrap();
        assert_eq!(ratio.pixels_per_mm(), 2.5);
        assert_eq!(serde_json::to_string(&ratio).unwrap(), "2.5");
        assert!(serde_json::from_str::<CalibrationRatio>("-1.0").is_err());
    }

    #[test]
    fn operator_command_roundtrip() {
        let cmd = OperatorCommand::Calibrate {
            known_diameter_mm: 65.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: OperatorCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "volumetra-runtime::measurement_loop",
            EventPayload::Measurement(MeasurementReport {
                cycle: 7,
                circle: Some(CircleCandidate {
                    center_x: 10.0,
                    center_y: 20.0,
                    radius_px: 30.0,
                    score: 0.8,
                    votes: 120,
                }),
                state: CalibrationState::Uncalibrated,
                ratio: None,
                volume: None,
                weight: None,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::Measurement(report) => assert_eq!(report.cycle, 7),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn vision_error_display_and_fatality() {
        let err = VisionError::from(CalibrationError::InvalidDiameter(-2.0));
        assert!(err.to_string().contains("Calibration rejected"));
        assert!(err.to_string().contains("-2"));
        assert!(!err.is_fatal());

        let err = VisionError::DeviceUnavailable {
            device: "webcam:0".to_string(),
            details: "unplugged".to_string(),
        };
        assert!(err.to_string().contains("webcam:0"));
        assert!(err.is_fatal());
    }
}
