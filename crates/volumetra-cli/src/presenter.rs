//! [`ConsolePresenter`] – a throttled, colored status line on stdout.

use colored::Colorize;
use volumetra_runtime::{OverlayData, Presenter};
use volumetra_types::{CalibrationState, Frame};

/// Prints a one-line readout whenever what is shown changes (sphere found or
/// lost, calibration state) and otherwise every `every` cycles.
pub struct ConsolePresenter {
    every: u64,
    last_key: Option<(bool, CalibrationState)>,
    last_printed: u64,
}

impl ConsolePresenter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            last_key: None,
            last_printed: 0,
        }
    }

    /// The line to print for this cycle, if one is due.
    fn line(&mut self, overlay: &OverlayData) -> Option<String> {
        let key = (overlay.circle.is_some(), overlay.state);
        let changed = self.last_key != Some(key);
        let due = overlay.cycle.saturating_sub(self.last_printed) >= self.every;
        if !changed && !due {
            return None;
        }
        self.last_key = Some(key);
        self.last_printed = overlay.cycle;
        Some(format_readout(overlay))
    }
}

impl Presenter for ConsolePresenter {
    fn show(&mut self, _frame: &Frame, overlay: &OverlayData) {
        if let Some(line) = self.line(overlay) {
            println!("{line}");
        }
    }
}

fn format_readout(overlay: &OverlayData) -> String {
    let prefix = format!("[{:>6}]", overlay.cycle).dimmed();
    let state = match overlay.state {
        CalibrationState::Calibrated => overlay
            .ratio
            .map(|r| format!("calibrated {:.2} px/mm", r.pixels_per_mm()))
            .unwrap_or_else(|| "calibrated".to_string())
            .green(),
        CalibrationState::Uncalibrated => "uncalibrated (press c)".yellow(),
    };
    let Some(circle) = overlay.circle else {
        return format!("{prefix} {state}  {}", "no sphere in view".dimmed());
    };
    let mut line = format!(
        "{prefix} {state}  r {:.1} px @ ({:.0}, {:.0})",
        circle.radius_px, circle.center_x, circle.center_y
    );
    if let Some(volume) = overlay.volume {
        line.push_str(&format!(
            "  {} {}",
            format!("Ø {:.1} mm", volume.diameter_mm).bold(),
            format!("V {:.2} cm³", volume.volume_cm3).bold().cyan()
        ));
    }
    if let Some(weight) = overlay.weight {
        line.push_str(&format!(
            "  {}",
            format!("W {:.1} g", weight.weight_g).bold().magenta()
        ));
    }
    line
}
