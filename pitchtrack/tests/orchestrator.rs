use pitch_camera::SimulatedCameraModule;
use pitch_types::{CalibrationProfile, CameraIntrinsics, StereoGeometry};
use std::time::Duration;

fn calibration() -> CalibrationProfile {
    let f = 100.0;
    CalibrationProfile {
        left_serial: "L".into(),
        right_serial: "R".into(),
        left_intrinsics: CameraIntrinsics {
            serial: "L".into(),
            fx: f,
            fy: f,
            cx: 0.0,
            cy: 0.0,
            distortion: vec![],
        },
        right_intrinsics: CameraIntrinsics {
            serial: "R".into(),
            fx: f,
            fy: f,
            cx: 0.0,
            cy: 0.0,
            distortion: vec![],
        },
        stereo: StereoGeometry {
            baseline_ft: 0.5,
            projection_left: [[f, 0.0, 0.0, 0.0], [0.0, f, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
            projection_right: [
                [f, 0.0, 0.0, -f * 0.5],
                [0.0, f, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        },
        plate_plane_z_ft: 0.0,
    }
}

fn config_toml(output_dir: &std::path::Path) -> String {
    format!(
        r#"
        [camera]
        width = 64
        height = 48
        fps = 30.0

        [recording]
        output_dir = "{}"
        "#,
        output_dir.display()
    )
}

fn load_config(dir: &tempfile::TempDir) -> pitch_config::Config {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, config_toml(dir.path())).unwrap();
    pitch_config::Config::load_from_file(&path).unwrap()
}

#[test]
fn start_session_exports_calibration_and_stop_writes_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);

    let mut orchestrator = pitchtrack::Orchestrator::new(SimulatedCameraModule::new());
    orchestrator
        .start_capture(config, "left-sn", "right-sn", calibration(), None, None)
        .unwrap();
    assert!(orchestrator.is_capturing());

    let session_dir = orchestrator.start_session("test-session").unwrap();
    assert!(session_dir.join("calibration/stereo_geometry.json").exists());
    assert!(session_dir.join("calibration/intrinsics_left.json").exists());
    assert!(session_dir.join("calibration/intrinsics_right.json").exists());
    assert!(session_dir.join("calibration/roi_annotations.json").exists());

    // Let the threads run briefly; the simulated cameras never trigger any
    // detections (all-zero frames), so no pitch is expected to start.
    std::thread::sleep(Duration::from_millis(150));

    let summary = orchestrator.stop_session().unwrap();
    assert_eq!(summary.pitch_count, 0);
    assert!(session_dir.join("session_summary.json").exists());
    assert!(session_dir.join("session_summary.csv").exists());
    assert!(session_dir.join("manifest.json").exists());
    assert!(session_dir.join("event_log.jsonl").exists());

    orchestrator.stop_capture().unwrap();
    assert!(!orchestrator.is_capturing());
}

#[test]
fn start_capture_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    let mut orchestrator = pitchtrack::Orchestrator::new(SimulatedCameraModule::new());
    orchestrator
        .start_capture(config.clone(), "left-sn", "right-sn", calibration(), None, None)
        .unwrap();

    let err = orchestrator
        .start_capture(config, "left-sn", "right-sn", calibration(), None, None)
        .unwrap_err();
    assert!(matches!(err, pitchtrack::Error::AlreadyCapturing));

    orchestrator.stop_capture().unwrap();
}

#[test]
fn use_plate_gate_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(&dir);
    config.tracking.use_plate_gate = true;

    let mut orchestrator = pitchtrack::Orchestrator::new(SimulatedCameraModule::new());
    let err = orchestrator
        .start_capture(config, "left-sn", "right-sn", calibration(), None, None)
        .unwrap_err();
    assert!(matches!(err, pitchtrack::Error::Config(_)));
}

#[test]
fn stop_session_without_start_session_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    let mut orchestrator = pitchtrack::Orchestrator::new(SimulatedCameraModule::new());
    orchestrator
        .start_capture(config, "left-sn", "right-sn", calibration(), None, None)
        .unwrap();

    assert!(matches!(orchestrator.stop_session(), Err(pitchtrack::Error::NoSession)));
    orchestrator.stop_capture().unwrap();
}
