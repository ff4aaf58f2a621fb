//! Prints [`Topic::SystemAlerts`][volumetra_middleware::Topic::SystemAlerts]
//! traffic for the operator.

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use volumetra_middleware::TopicReceiver;
use volumetra_types::EventPayload;

/// Print alerts until the bus closes.
pub async fn watch(mut alerts: TopicReceiver) {
    loop {
        match alerts.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event.payload) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

/// Operator-facing text for an alert, `None` for payloads that are not
/// alerts.
pub fn describe(payload: &EventPayload) -> Option<String> {
    match payload {
        EventPayload::CalibrationApplied(ratio) => Some(format!(
            "  {} Calibrated: {:.3} px = 1 mm",
            "✓".green().bold(),
            ratio.pixels_per_mm()
        )),
        EventPayload::CalibrationRejected(reason) => {
            Some(format!("  {} {}", "✗".red().bold(), reason.red()))
        }
        EventPayload::SourceFault { device, details } => Some(format!(
            "  {} {} {}: {}",
            "⚠".yellow().bold(),
            "Camera lost".yellow().bold(),
            device,
            details
        )),
        EventPayload::Measurement(_) | EventPayload::Operator(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volumetra_types::{CalibrationRatio, OperatorCommand};

    #[test]
    fn describes_calibration_outcomes() {
        let applied = describe(&EventPayload::CalibrationApplied(
            CalibrationRatio::new(3.14).unwrap(),
        ))
        .unwrap();
        assert!(applied.contains("3.140 px = 1 mm"), "{applied}");

        let rejected =
            describe(&EventPayload::CalibrationRejected("no sphere".to_string())).unwrap();
        assert!(rejected.contains("no sphere"), "{rejected}");
    }

    #[test]
    fn ignores_non_alert_payloads() {
        assert!(describe(&EventPayload::Operator(OperatorCommand::Stop)).is_none());
    }

    #[tokio::test]
    async fn watch_ends_when_bus_is_dropped() {
        let bus = volumetra_middleware::EventBus::default();
        let rx = bus.subscribe_to(volumetra_middleware::Topic::SystemAlerts);
        drop(bus);
        tokio::time::timeout(std::time::Duration::from_secs(1), watch(rx))
            .await
            .expect("watch returns once the bus is closed");
    }
}
