//! [`MeasurementLoop`] – the per-frame calibrate-and-measure cycle.
//!
//! Each [`tick`][MeasurementLoop::tick]:
//!
//! 1. **Drain** – pick up operator commands waiting on
//!    [`Topic::OperatorInput`] without blocking. Density changes and stop
//!    requests take effect immediately; a calibration request is held until
//!    this cycle's sphere has been selected.
//! 2. **Acquire** – pull the next frame from the [`FrameSource`]. This is the
//!    only call that may block. A frame that arrives after a stop request is
//!    dropped untouched.
//! 3. **Detect** – preprocess, run the [`CircleDetector`] and [`select`] the
//!    single best candidate.
//! 4. **Calibrate** – if requested, calibrate against the selected candidate.
//!    The outcome is published on [`Topic::SystemAlerts`].
//! 5. **Measure** – with a ratio available, estimate volume (and weight, if a
//!    density is set), publish a [`MeasurementReport`] on
//!    [`Topic::Measurements`] and hand the frame to the [`Presenter`].
//!
//! # Example
//!
//! ```rust
//! use volumetra_hal::sim::SyntheticBallSource;
//! use volumetra_middleware::EventBus;
//! use volumetra_runtime::{MeasurementLoop, MeasurementLoopConfig, NullPresenter};
//!
//! let mut source = SyntheticBallSource::new("sim", 160, 120).with_frame_limit(3);
//! let mut mloop = MeasurementLoop::new(MeasurementLoopConfig::default(), EventBus::default())
//!     .expect("default config is valid");
//! let cycles = mloop.run(&mut source, &mut NullPresenter).unwrap();
//! assert_eq!(cycles, 3);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, error, info, instrument, warn};
use volumetra_hal::FrameSource;
use volumetra_measure::{Calibration, CalibrationReader};
use volumetra_middleware::{EventBus, Topic, TopicReceiver};
use volumetra_perception::{CircleDetector, DetectorConfig, Preprocessor, select};
use volumetra_types::{
    CalibrationRatio, Event, EventPayload, MeasurementReport, OperatorCommand, VisionError,
};

use crate::presenter::{OverlayData, Presenter};

const EVENT_SOURCE: &str = "volumetra-runtime::measurement_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`MeasurementLoop`].
#[derive(Debug, Clone, Default)]
pub struct MeasurementLoopConfig {
    pub detector: DetectorConfig,
    /// Material density for the weight readout; `None` disables it until the
    /// operator sets one.
    pub density_g_per_cm3: Option<f64>,
    /// Start calibrated with this ratio (fixed camera rigs).
    pub initial_pixels_per_mm: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// What a single [`MeasurementLoop::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A frame was processed and reported.
    Processed(MeasurementReport),
    /// The source produced an unusable frame; nothing was reported.
    Dropped,
    /// The source has no more frames.
    EndOfStream,
    /// A stop was requested; the loop should not be ticked again.
    Stopped,
}

// ─────────────────────────────────────────────────────────────────────────────
// MeasurementLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every stage of the pipeline plus the calibration.
pub struct MeasurementLoop {
    preprocessor: Preprocessor,
    detector: CircleDetector,
    calibration: Calibration,
    density_g_per_cm3: Option<f64>,
    bus: EventBus,
    operator_rx: TopicReceiver,
    /// Known diameter of a calibration requested but not yet applied.
    pending_calibration: Option<f64>,
    shutdown: Arc<AtomicBool>,
    cycle: u64,
}

impl MeasurementLoop {
    /// Build the pipeline and subscribe to operator input on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] if the detector configuration is
    /// invalid, or the configured density or initial ratio is not a positive
    /// number.
    pub fn new(config: MeasurementLoopConfig, bus: EventBus) -> Result<Self, VisionError> {
        let preprocessor = Preprocessor::from_config(&config.detector)?;
        let detector = CircleDetector::new(config.detector)?;

        let calibration = match config.initial_pixels_per_mm {
            Some(value) => Calibration::with_preset(CalibrationRatio::new(value).ok_or_else(
                || VisionError::Config(format!("initial_pixels_per_mm must be positive, got {value}")),
            )?),
            None => Calibration::new(),
        };
        let density_g_per_cm3 = config
            .density_g_per_cm3
            .map(volumetra_measure::validate_density)
            .transpose()?;

        let operator_rx = bus.subscribe_to(Topic::OperatorInput);
        Ok(Self {
            preprocessor,
            detector,
            calibration,
            density_g_per_cm3,
            bus,
            operator_rx,
            pending_calibration: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            cycle: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Read-only view of the calibration for other threads.
    pub fn calibration_reader(&self) -> CalibrationReader {
        self.calibration.reader()
    }

    /// The flag that stops the loop once set; hand it to a signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn density(&self) -> Option<f64> {
        self.density_g_per_cm3
    }

    /// Number of frames processed so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Queue a calibration against the next processed frame, as if the
    /// operator had requested it over the bus.
    pub fn request_calibration(&mut self, known_diameter_mm: f64) {
        self.pending_calibration = Some(known_diameter_mm);
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned: [`VisionError::DeviceUnavailable`]
    /// when the source is lost. Bad frames and rejected calibrations are
    /// reported and absorbed.
    #[instrument(skip_all, fields(cycle = self.cycle + 1))]
    pub fn tick(
        &mut self,
        source: &mut dyn FrameSource,
        presenter: &mut dyn Presenter,
    ) -> Result<CycleOutcome, VisionError> {
        // ── 1. Drain operator input ───────────────────────────────────────────
        self.drain_operator_commands();
        if self.is_stopped() {
            return Ok(CycleOutcome::Stopped);
        }

        // ── 2. Acquire ────────────────────────────────────────────────────────
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(source = source.id(), "frame source exhausted");
                return Ok(CycleOutcome::EndOfStream);
            }
            Err(e) if e.is_fatal() => {
                error!(source = source.id(), error = %e, "frame source lost");
                if let VisionError::DeviceUnavailable { device, details } = &e {
                    self.publish(
                        Topic::SystemAlerts,
                        EventPayload::SourceFault {
                            device: device.clone(),
                            details: details.clone(),
                        },
                    );
                }
                return Err(e);
            }
            Err(e) => {
                warn!(source = source.id(), error = %e, "dropping frame");
                return Ok(CycleOutcome::Dropped);
            }
        };
        if self.is_stopped() {
            debug!("stop requested during acquisition; frame discarded");
            return Ok(CycleOutcome::Stopped);
        }

        // ── 3. Detect & select ────────────────────────────────────────────────
        let gray = match self.preprocessor.preprocess(&frame) {
            Ok(gray) => gray,
            Err(e) => {
                warn!(error = %e, "dropping frame");
                return Ok(CycleOutcome::Dropped);
            }
        };
        let selected = select(self.detector.detect(&gray));
        self.cycle += 1;
        debug!(selected = ?selected, "detection finished");

        // ── 4. Calibrate ──────────────────────────────────────────────────────
        if let Some(known_diameter_mm) = self.pending_calibration.take() {
            let payload = match self
                .calibration
                .begin_calibration(selected.as_ref(), known_diameter_mm)
            {
                Ok(ratio) => EventPayload::CalibrationApplied(ratio),
                Err(e) => EventPayload::CalibrationRejected(e.to_string()),
            };
            self.publish(Topic::SystemAlerts, payload);
        }

        // ── 5. Measure & present ──────────────────────────────────────────────
        let ratio = self.calibration.ratio();
        let volume = volumetra_measure::measure(selected.as_ref(), ratio.as_ref());
        let weight = volume
            .zip(self.density_g_per_cm3)
            .map(|(v, density)| volumetra_measure::weight(&v, density));
        let report = MeasurementReport {
            cycle: self.cycle,
            circle: selected,
            state: self.calibration.state(),
            ratio,
            volume,
            weight,
        };

        self.publish(Topic::Measurements, EventPayload::Measurement(report.clone()));
        presenter.show(&frame, &OverlayData::from(&report));
        Ok(CycleOutcome::Processed(report))
    }

    /// Tick until the source ends, a stop is requested or a fatal error
    /// occurs. Returns the number of processed cycles.
    ///
    /// # Errors
    ///
    /// Propagates the fatal error that ended the loop.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        presenter: &mut dyn Presenter,
    ) -> Result<u64, VisionError> {
        info!(source = source.id(), state = %self.calibration.state(), "measurement loop started");
        loop {
            match self.tick(source, presenter)? {
                CycleOutcome::Processed(_) | CycleOutcome::Dropped => {}
                CycleOutcome::EndOfStream | CycleOutcome::Stopped => break,
            }
        }
        info!(cycles = self.cycle, "measurement loop finished");
        Ok(self.cycle)
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    fn drain_operator_commands(&mut self) {
        while let Some(event) = self.operator_rx.try_recv() {
            let EventPayload::Operator(command) = event.payload else {
                continue;
            };
            match command {
                OperatorCommand::Calibrate { known_diameter_mm } => {
                    debug!(known_diameter_mm, "calibration requested");
                    self.pending_calibration = Some(known_diameter_mm);
                }
                OperatorCommand::SetDensity { g_per_cm3 } => {
                    match volumetra_measure::validate_density(g_per_cm3) {
                        Ok(density) => {
                            info!(density_g_per_cm3 = density, "density set");
                            self.density_g_per_cm3 = Some(density);
                        }
                        Err(e) => {
                            warn!(error = %e, "density rejected");
                            self.publish(
                                Topic::SystemAlerts,
                                EventPayload::CalibrationRejected(e.to_string()),
                            );
                        }
                    }
                }
                OperatorCommand::Stop => {
                    info!("stop requested by operator");
                    self.request_stop();
                }
            }
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        // Best-effort publish – no subscribers is not an error.
        let _ = self.bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
