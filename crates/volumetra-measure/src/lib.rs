//! `volumetra-measure` – turning pixels into millimetres and cubic
//! centimetres.
//!
//! # Modules
//!
//! - [`calibration`] – [`Calibration`][calibration::Calibration]: the
//!   single owner of the pixel-to-millimetre ratio. Calibrating against a
//!   detected reference sphere of known diameter moves it from
//!   `Uncalibrated` to `Calibrated`; read-only
//!   [`CalibrationReader`][calibration::CalibrationReader] handles expose the
//!   current ratio to other threads.
//! - [`volume`] – [`estimate`][volume::estimate] and
//!   [`measure`][volume::measure]: sphere radius, diameter and volume from a
//!   detected circle and a ratio, plus the density-based
//!   [`weight`][volume::weight] readout.

pub mod calibration;
pub mod volume;

pub use calibration::{Calibration, CalibrationReader};
pub use volume::{estimate, measure, validate_density, weight};
