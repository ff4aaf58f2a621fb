//! `volumetra-runtime` – the measurement engine.
//!
//! Wires a [`FrameSource`][volumetra_hal::FrameSource], the perception
//! pipeline and the calibration together into a single-threaded cycle, and
//! hands every processed frame to a [`Presenter`].
//!
//! # Modules
//!
//! - [`measurement_loop`] – [`MeasurementLoop`][measurement_loop::MeasurementLoop]:
//!   acquire → detect → select → calibrate-or-measure → present, one frame
//!   per [`tick`][measurement_loop::MeasurementLoop::tick]. Operator
//!   commands arrive over the event bus; results and alerts leave over it.
//! - [`presenter`] – the [`Presenter`][presenter::Presenter] seam plus
//!   [`LogPresenter`][presenter::LogPresenter],
//!   [`NullPresenter`][presenter::NullPresenter] and
//!   [`FanOut`][presenter::FanOut].
//! - [`overlay`] – [`draw_overlay`][overlay::draw_overlay]: ring and center
//!   mark for the selected circle.
//! - [`snapshot`] – [`SnapshotPresenter`][snapshot::SnapshotPresenter]:
//!   writes annotated frames to disk as PNG.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod measurement_loop;
pub mod overlay;
pub mod presenter;
pub mod snapshot;
pub mod telemetry;

pub use measurement_loop::{CycleOutcome, MeasurementLoop, MeasurementLoopConfig};
pub use overlay::draw_overlay;
pub use presenter::{FanOut, LogPresenter, NullPresenter, OverlayData, Presenter};
pub use snapshot::SnapshotPresenter;
pub use telemetry::{TracerProviderGuard, init_tracing};
