//! Thin CLI over the orchestrator: `run` starts capture and a session from
//! a config file, `replay-metrics` re-runs the Metrics Analyzer over a
//! persisted `stereo_observations.json`. Mirrors the `braid`/
//! `braid-process-video` binaries' `clap::Parser` derive style.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pitch_camera::SimulatedCameraModule;
use pitch_types::{CalibrationProfile, PitchData, StereoObservation};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start capture and recording against a simulated camera pair and run
    /// until interrupted with Ctrl-C.
    Run {
        /// Path to the TOML pipeline config.
        config_file: PathBuf,
        /// Serial to open the left camera under.
        #[arg(long, default_value = "left-sim")]
        left_serial: String,
        /// Serial to open the right camera under.
        #[arg(long, default_value = "right-sim")]
        right_serial: String,
        /// Calibration profile (JSON) with intrinsics/stereo geometry.
        #[arg(long)]
        calibration: PathBuf,
        /// Session directory name under `recording.output_dir`.
        #[arg(long, default_value = "session")]
        session_name: String,
    },
    /// Re-run the Metrics Analyzer over a previously recorded
    /// `stereo_observations.json`, printing the resulting summary as JSON.
    /// Supports the round-trip law: the same observations always produce
    /// the same summary.
    ReplayMetrics {
        /// Path to `<pitch_dir>/observations/stereo_observations.json`.
        observations_file: PathBuf,
        /// Path to the TOML pipeline config (for `metrics` and the derived
        /// strike zone).
        #[arg(long)]
        config_file: PathBuf,
        /// Pitch index to stamp onto the replayed `PitchData` (the original
        /// index isn't stored in the observations file).
        #[arg(long, default_value_t = 1)]
        pitch_index: u32,
    },
}

fn init_logging() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var(
            "RUST_LOG",
            "pitchtrack=info,pitch_camera=info,pitch_capture=info,pitch_detector=info,pitch_mvg=info,pitch_tracking=info,pitch_recorder=info,warn",
        );
    }
    tracing_subscriber::fmt::init();
}

/// Mirrors `pitch_recorder`'s private `ObservationRecord`/`ObservationsFile`
/// on-disk shape closely enough to deserialize it back, without the
/// recorder crate needing to expose a public read path it never uses
/// itself.
#[derive(Debug, Deserialize)]
struct ObservationRecord {
    timestamp_ns: i64,
    left_px: [f64; 2],
    right_px: [f64; 2],
    #[serde(rename = "X_ft")]
    x_ft: f64,
    #[serde(rename = "Y_ft")]
    y_ft: f64,
    #[serde(rename = "Z_ft")]
    z_ft: f64,
    quality: f64,
    confidence: f64,
}

impl From<&ObservationRecord> for StereoObservation {
    fn from(r: &ObservationRecord) -> Self {
        StereoObservation {
            t_ns: r.timestamp_ns,
            left_px: (r.left_px[0], r.left_px[1]),
            right_px: (r.right_px[0], r.right_px[1]),
            point_ft: (r.x_ft, r.y_ft, r.z_ft),
            covariance: None,
            quality: r.quality,
            confidence: r.confidence,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsFile {
    pitch_id: String,
    observations: Vec<ObservationRecord>,
}

fn run(
    config_file: &PathBuf,
    left_serial: &str,
    right_serial: &str,
    calibration_file: &PathBuf,
    session_name: &str,
) -> Result<()> {
    let config = pitch_config::Config::load_from_file(config_file)
        .with_context(|| format!("loading config {}", config_file.display()))?;
    let calibration_text = std::fs::read_to_string(calibration_file)
        .with_context(|| format!("reading calibration {}", calibration_file.display()))?;
    let calibration: CalibrationProfile = serde_json::from_str(&calibration_text)
        .with_context(|| format!("parsing calibration {}", calibration_file.display()))?;

    let mut orchestrator = pitchtrack::Orchestrator::new(SimulatedCameraModule::new());
    orchestrator.start_capture(config, left_serial, right_serial, calibration, None, None)?;
    orchestrator.start_session(session_name)?;

    tracing::info!(session = %session_name, "capture started, press Ctrl-C to stop");
    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("installing Ctrl-C handler")?;
    rx.recv().ok();

    let summary = orchestrator.stop_session()?;
    orchestrator.stop_capture()?;
    tracing::info!(pitch_count = summary.pitch_count, "session complete");
    Ok(())
}

fn replay_metrics(observations_file: &PathBuf, config_file: &PathBuf, pitch_index: u32) -> Result<()> {
    let config = pitch_config::Config::load_from_file(config_file)
        .with_context(|| format!("loading config {}", config_file.display()))?;
    let text = std::fs::read_to_string(observations_file)
        .with_context(|| format!("reading {}", observations_file.display()))?;
    let file: ObservationsFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", observations_file.display()))?;

    let observations: Vec<StereoObservation> = file.observations.iter().map(StereoObservation::from).collect();
    let start_ns = observations.first().map(|o| o.t_ns).unwrap_or(0);
    let end_ns = observations.last().map(|o| o.t_ns).unwrap_or(0);

    let pitch = PitchData {
        pitch_index,
        start_ns,
        end_ns,
        pre_roll_frames: pitch_types::PerCameraFrames::default(),
        observations,
        valid: true,
    };

    let zone = config.strike_zone();
    let summary = pitch_metrics::analyze(&pitch, &file.pitch_id, &config.metrics, &zone);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config_file,
            left_serial,
            right_serial,
            calibration,
            session_name,
        } => run(&config_file, &left_serial, &right_serial, &calibration, &session_name),
        Command::ReplayMetrics {
            observations_file,
            config_file,
            pitch_index,
        } => replay_metrics(&observations_file, &config_file, pitch_index),
    }
}
