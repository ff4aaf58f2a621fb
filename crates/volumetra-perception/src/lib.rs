//! `volumetra-perception` – turns raw frames into at most one sphere
//! outline per cycle.
//!
//! # Modules
//!
//! - [`config`] – [`DetectorConfig`][config::DetectorConfig]: blur kernel,
//!   radius range, accumulator resolution and vote thresholds, with
//!   documented defaults and validation.
//! - [`preprocess`] – [`Preprocessor`][preprocess::Preprocessor]: greyscale
//!   conversion followed by a separable Gaussian blur, producing a
//!   [`GrayImage`][preprocess::GrayImage].
//! - [`hough`] – [`CircleDetector`][hough::CircleDetector]: gradient-directed
//!   circular Hough transform yielding a lazy stream of
//!   [`CircleCandidate`][volumetra_types::CircleCandidate]s.
//! - [`select`] – [`select`][select::select]: reduces candidates to the single
//!   best one with a deterministic tie-break.

pub mod config;
pub mod hough;
pub mod preprocess;
pub mod select;

pub use config::DetectorConfig;
pub use hough::{Candidates, CircleDetector};
pub use preprocess::{GrayImage, Preprocessor};
pub use select::{rank, select};
