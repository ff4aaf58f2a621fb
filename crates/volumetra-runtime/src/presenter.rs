//! The display seam: where each cycle's frame and readout go.

use tracing::{debug, info};
use volumetra_types::{
    CalibrationRatio, CalibrationState, CircleCandidate, Frame, MeasurementReport,
    VolumeMeasurement, WeightEstimate,
};

/// Everything a presenter needs to annotate one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayData {
    pub cycle: u64,
    pub circle: Option<CircleCandidate>,
    pub state: CalibrationState,
    pub ratio: Option<CalibrationRatio>,
    pub volume: Option<VolumeMeasurement>,
    pub weight: Option<WeightEstimate>,
}

impl From<&MeasurementReport> for OverlayData {
    fn from(report: &MeasurementReport) -> Self {
        Self {
            cycle: report.cycle,
            circle: report.circle,
            state: report.state,
            ratio: report.ratio,
            volume: report.volume,
            weight: report.weight,
        }
    }
}

/// Receives every processed frame together with its readout.
///
/// Called once per cycle from the measurement loop's thread; implementations
/// must not block for long.
pub trait Presenter {
    fn show(&mut self, frame: &Frame, overlay: &OverlayData);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn show(&mut self, frame: &Frame, overlay: &OverlayData) {
        (**self).show(frame, overlay);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn show(&mut self, _frame: &Frame, _overlay: &OverlayData) {}
}

/// Writes readouts to the `tracing` log: measurements at `info`, cycles
/// without a measurement at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show(&mut self, _frame: &Frame, overlay: &OverlayData) {
        match (&overlay.circle, &overlay.volume) {
            (Some(circle), Some(volume)) => info!(
                cycle = overlay.cycle,
                radius_px = circle.radius_px,
                diameter_mm = volume.diameter_mm,
                volume_cm3 = volume.volume_cm3,
                weight_g = overlay.weight.map(|w| w.weight_g),
                "sphere measured"
            ),
            (Some(circle), None) => debug!(
                cycle = overlay.cycle,
                radius_px = circle.radius_px,
                state = %overlay.state,
                "sphere detected"
            ),
            (None, _) => debug!(cycle = overlay.cycle, "no sphere in view"),
        }
    }
}

/// Forwards to several presenters in order.
#[derive(Default)]
pub struct FanOut {
    presenters: Vec<Box<dyn Presenter>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenters.push(Box::new(presenter));
        self
    }

    pub fn len(&self) -> usize {
        self.presenters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presenters.is_empty()
    }
}

impl Presenter for FanOut {
    fn show(&mut self, frame: &Frame, overlay: &OverlayData) {
        for presenter in &mut self.presenters {
            presenter.show(frame, overlay);
        }
    }
}
