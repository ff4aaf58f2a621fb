//! End-to-end runs of the measurement loop over a synthetic ball.

use std::f64::consts::PI;

use approx::assert_relative_eq;
use volumetra_hal::sim::SyntheticBallSource;
use volumetra_middleware::{EventBus, Topic};
use volumetra_perception::DetectorConfig;
use volumetra_runtime::{
    CycleOutcome, FanOut, LogPresenter, MeasurementLoop, MeasurementLoopConfig, NullPresenter,
    SnapshotPresenter,
};
use volumetra_types::{CalibrationState, Event, EventPayload, OperatorCommand};

fn loop_config() -> MeasurementLoopConfig {
    MeasurementLoopConfig {
        detector: DetectorConfig {
            min_radius_px: 15,
            max_radius_px: 80,
            ..DetectorConfig::default()
        },
        ..MeasurementLoopConfig::default()
    }
}

fn sphere_volume_cm3(diameter_mm: f64) -> f64 {
    let r_cm = diameter_mm / 20.0;
    4.0 / 3.0 * PI * r_cm.powi(3)
}

#[test]
fn calibrate_on_reference_then_measure_another_sphere() {
    let bus = EventBus::default();
    let mut mloop = MeasurementLoop::new(loop_config(), bus.clone()).expect("valid config");

    // Reference sphere of 80 px diameter for two frames, then a 50 px one.
    let mut source = SyntheticBallSource::new("sim", 240, 180)
        .with_script(vec![Some(40.0), Some(40.0), Some(25.0), Some(25.0)])
        .with_frame_limit(4);

    let first = mloop.tick(&mut source, &mut NullPresenter).unwrap();
    let CycleOutcome::Processed(report) = first else {
        panic!("expected processed cycle, got {first:?}");
    };
    assert_eq!(report.state, CalibrationState::Uncalibrated);
    assert!(report.volume.is_none());

    // Operator has a 40 mm reference ball: 80 px / 40 mm = 2 px/mm.
    bus.publish_to(
        Topic::OperatorInput,
        Event::new(
            "test::operator",
            EventPayload::Operator(OperatorCommand::Calibrate {
                known_diameter_mm: 40.0,
            }),
        ),
    )
    .expect("loop subscribed to operator input");

    let CycleOutcome::Processed(calibrated) = mloop.tick(&mut source, &mut NullPresenter).unwrap()
    else {
        panic!("expected processed cycle");
    };
    assert_eq!(calibrated.state, CalibrationState::Calibrated);
    let ratio = calibrated.ratio.expect("ratio set").pixels_per_mm();
    assert!((ratio - 2.0).abs() < 0.1, "ratio = {ratio}");

    let CycleOutcome::Processed(measured) = mloop.tick(&mut source, &mut NullPresenter).unwrap()
    else {
        panic!("expected processed cycle");
    };
    let volume = measured.volume.expect("calibrated loop measures");
    // 50 px at 2 px/mm = 25 mm.
    assert!((volume.diameter_mm - 25.0).abs() < 1.5, "{volume:?}");
    assert_relative_eq!(volume.diameter_mm, 2.0 * volume.radius_mm);
    assert_relative_eq!(
        volume.volume_cm3,
        sphere_volume_cm3(volume.diameter_mm),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        volume.volume_cm3,
        sphere_volume_cm3(25.0),
        max_relative = 0.2
    );

    assert!(matches!(
        mloop.tick(&mut source, &mut NullPresenter).unwrap(),
        CycleOutcome::Processed(_)
    ));
    assert_eq!(
        mloop.tick(&mut source, &mut NullPresenter).unwrap(),
        CycleOutcome::EndOfStream
    );
}

#[test]
fn recalibration_replaces_the_ratio() {
    let bus = EventBus::default();
    let mut mloop = MeasurementLoop::new(loop_config(), bus.clone()).unwrap();
    let reader = mloop.calibration_reader();
    let mut source = SyntheticBallSource::new("sim", 240, 180)
        .with_script(vec![Some(30.0)])
        .with_frame_limit(2);

    for known_diameter_mm in [60.0, 20.0] {
        bus.publish_to(
            Topic::OperatorInput,
            Event::new(
                "test::operator",
                EventPayload::Operator(OperatorCommand::Calibrate { known_diameter_mm }),
            ),
        )
        .unwrap();
        mloop.tick(&mut source, &mut NullPresenter).unwrap();
    }
    let ratio = reader.ratio().expect("calibrated").pixels_per_mm();
    assert!((ratio - 3.0).abs() < 0.15, "ratio = {ratio}");
}

#[tokio::test]
async fn reports_reach_async_subscribers() {
    let bus = EventBus::default();
    let mut measurements = bus.subscribe_to(Topic::Measurements);
    let mut mloop = MeasurementLoop::new(loop_config(), bus.clone()).unwrap();

    let cycles = tokio::task::spawn_blocking(move || {
        let mut source = SyntheticBallSource::new("sim", 160, 120).with_frame_limit(3);
        mloop.run(&mut source, &mut LogPresenter)
    })
    .await
    .expect("loop thread panicked")
    .expect("synthetic source never fails");
    assert_eq!(cycles, 3);

    for expected in 1..=3 {
        let event = measurements.recv().await.expect("report published");
        assert_eq!(event.source, "volumetra-runtime::measurement_loop");
        match event.payload {
            EventPayload::Measurement(report) => {
                assert_eq!(report.cycle, expected);
                assert!(report.circle.is_some());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}

#[test]
fn snapshots_are_written_during_a_run() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let snapshots = SnapshotPresenter::new(dir.path(), 2).unwrap();
    let mut presenter = FanOut::new().with(LogPresenter).with(snapshots);

    let cfg = MeasurementLoopConfig {
        initial_pixels_per_mm: Some(1.5),
        ..loop_config()
    };
    let mut mloop = MeasurementLoop::new(cfg, EventBus::default()).unwrap();
    let mut source = SyntheticBallSource::new("sim", 120, 90).with_frame_limit(4);
    assert_eq!(mloop.run(&mut source, &mut presenter).unwrap(), 4);

    assert!(dir.path().join("cycle_000002.png").exists());
    assert!(dir.path().join("cycle_000004.png").exists());
    assert!(!dir.path().join("cycle_000003.png").exists());
}
