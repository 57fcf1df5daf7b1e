//! Per-pitch recording: MJPEG AVI clips, timestamp CSVs, detection/
//! observation JSON exports, milestone PNG frames and the pitch manifest.
//!
//! Opened by the orchestrator's `on_pitch_start` callback and closed after
//! `on_pitch_end` plus `post_roll_ms` of additional frames.
//! `.tmp`-suffixed while open; renamed to its final name only once every
//! file has been written and fsync'd, so a directory without the suffix is
//! always a complete pitch.

pub mod avi;
pub mod error;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb, RgbImage};
use serde::Serialize;

use pitch_config::RecordingConfig;
use pitch_types::{CameraSide, Detection, Frame, PitchSummary, StereoObservation};

use avi::AviWriter;
use error::Result;

const JPEG_QUALITY: u8 = 85;

fn side_index(side: CameraSide) -> usize {
    match side {
        CameraSide::Left => 0,
        CameraSide::Right => 1,
    }
}

/// Converts a captured frame to an RGB8 image, decoding MJPEG payloads and
/// doing the YUY2->RGB conversion by hand (no example in the corpus links a
/// dedicated YUV conversion crate, and this is the one non-trivial format
/// `PixelFormat` declares).
fn frame_to_rgb8(frame: &Frame) -> Result<RgbImage> {
    use pitch_types::PixelFormat::*;
    match frame.pixel_format {
        Gray8 => {
            let img: ImageBuffer<image::Luma<u8>, _> =
                ImageBuffer::from_raw(frame.width, frame.height, frame.data.to_vec())
                    .expect("gray8 frame buffer length matches width*height");
            Ok(image::DynamicImage::ImageLuma8(img).to_rgb8())
        }
        Rgb8 => Ok(
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.to_vec())
                .expect("rgb8 frame buffer length matches width*height*3"),
        ),
        Yuy2 => Ok(yuy2_to_rgb8(frame)),
        Mjpg => {
            let img = image::load_from_memory(&frame.data)?;
            Ok(img.to_rgb8())
        }
    }
}

fn yuy2_to_rgb8(frame: &Frame) -> RgbImage {
    let (w, h) = (frame.width, frame.height);
    let mut out = ImageBuffer::new(w, h);
    let row_bytes = (w as usize) * 2;
    for y in 0..h as usize {
        let row = &frame.data[y * row_bytes..(y + 1) * row_bytes];
        for pair in 0..(w as usize / 2) {
            let base = pair * 4;
            let y0 = row[base] as f32;
            let u = row[base + 1] as f32 - 128.0;
            let y1 = row[base + 2] as f32;
            let v = row[base + 3] as f32 - 128.0;
            for (i, y_val) in [(0usize, y0), (1usize, y1)] {
                let r = (y_val + 1.402 * v).clamp(0.0, 255.0) as u8;
                let g = (y_val - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
                let b = (y_val + 1.772 * u).clamp(0.0, 255.0) as u8;
                out.put_pixel((pair * 2 + i) as u32, y as u32, Rgb([r, g, b]));
            }
        }
    }
    out
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    if frame.pixel_format == pitch_types::PixelFormat::Mjpg {
        return Ok(frame.data.to_vec());
    }
    let rgb = frame_to_rgb8(frame)?;
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(rgb.as_raw(), frame.width, frame.height, image::ExtendedColorType::Rgb8)?;
    Ok(buf)
}

fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    let rgb = frame_to_rgb8(frame)?;
    rgb.save(path)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    frame_index: u64,
    timestamp_ns: i64,
    u_px: f64,
    v_px: f64,
    radius_px: f64,
    confidence: f64,
}

impl From<&Detection> for DetectionRecord {
    fn from(d: &Detection) -> Self {
        Self {
            frame_index: d.frame_index,
            timestamp_ns: d.t_capture_monotonic_ns,
            u_px: d.u_px,
            v_px: d.v_px,
            radius_px: d.radius_px,
            confidence: d.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
struct DetectionsFile {
    pitch_id: String,
    camera: &'static str,
    detection_count: usize,
    detections: Vec<DetectionRecord>,
}

#[derive(Debug, Serialize)]
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

impl From<&StereoObservation> for ObservationRecord {
    fn from(o: &StereoObservation) -> Self {
        Self {
            timestamp_ns: o.t_ns,
            left_px: [o.left_px.0, o.left_px.1],
            right_px: [o.right_px.0, o.right_px.1],
            x_ft: o.point_ft.0,
            y_ft: o.point_ft.1,
            z_ft: o.point_ft.2,
            quality: o.quality,
            confidence: o.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
struct ObservationsFile {
    pitch_id: String,
    observation_count: usize,
    observations: Vec<ObservationRecord>,
}

#[derive(Debug, Serialize)]
struct PitchManifest<'a> {
    schema_version: u32,
    app_version: &'static str,
    pitch_id: String,
    t_start_ns: i64,
    t_end_ns: i64,
    is_strike: bool,
    zone_row: u8,
    zone_col: u8,
    run_in: f64,
    rise_in: f64,
    measured_speed_mph: f64,
    rotation_rpm: Option<f64>,
    trajectory: TrajectoryRef<'a>,
    left_video: &'a str,
    right_video: &'a str,
    left_timestamps: &'a str,
    right_timestamps: &'a str,
    incomplete: bool,
    performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Serialize)]
struct TrajectoryRef<'a> {
    plate_crossing_xyz_ft: [f64; 3],
    plate_crossing_t_ns: i64,
    model: &'a str,
    expected_error_ft: f64,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct PerformanceMetrics {
    detection_quality: DetectionQuality,
    timing_accuracy: TimingAccuracy,
}

#[derive(Debug, Serialize)]
struct DetectionQuality {
    stereo_observations: usize,
    detection_rate_hz: f64,
}

#[derive(Debug, Serialize)]
struct TimingAccuracy {
    pre_roll_frames_captured: usize,
    duration_ns: i64,
    start_ns: i64,
    end_ns: i64,
}

/// Tracks per-camera PNG-milestone bookkeeping so `close` can write the
/// "last detection" and "post-roll last" frames that are only known in
/// hindsight.
#[derive(Default)]
struct FrameMilestones {
    first_detection_written: bool,
    last_detection_frame: Option<Frame>,
    last_frame_overall: Option<Frame>,
}

pub struct PitchRecorder {
    pitch_index: u32,
    dir_tmp: PathBuf,
    dir_final: PathBuf,
    start_ns: i64,
    end_ns: Option<i64>,
    post_roll_ms: f64,
    save_detections: bool,
    save_observations: bool,
    save_training_frames: bool,
    frame_save_interval: u32,
    left_video: AviWriter<File>,
    right_video: AviWriter<File>,
    left_ts: csv::Writer<File>,
    right_ts: csv::Writer<File>,
    detections: [Vec<DetectionRecord>; 2],
    observations: Vec<ObservationRecord>,
    milestones: [FrameMilestones; 2],
    pre_roll_frame_count: usize,
    incomplete: bool,
}

fn video_path(dir: &Path, side: CameraSide) -> PathBuf {
    dir.join(format!("{}.avi", side.as_str()))
}

fn timestamps_path(dir: &Path, side: CameraSide) -> PathBuf {
    dir.join(format!("{}_timestamps.csv", side.as_str()))
}

impl PitchRecorder {
    /// Opens a new pitch directory under `session_dir` named
    /// `<session_id>-pitch-NNN` (caller passes the already-formatted
    /// `dir_name`), creates its `.tmp` working copy, and writes the
    /// pre-roll frames carried in `pre_roll` for both cameras.
    pub fn open(
        session_dir: &Path,
        dir_name: &str,
        pitch_index: u32,
        start_ns: i64,
        width: u32,
        height: u32,
        fps: f64,
        pre_roll: &pitch_types::PerCameraFrames,
        cfg: &RecordingConfig,
    ) -> Result<Self> {
        let dir_final = session_dir.join(dir_name);
        let dir_tmp = session_dir.join(format!("{dir_name}.tmp"));
        std::fs::create_dir_all(&dir_tmp)?;
        if cfg.save_training_frames {
            std::fs::create_dir_all(dir_tmp.join("frames/left"))?;
            std::fs::create_dir_all(dir_tmp.join("frames/right"))?;
        }
        if cfg.save_detections {
            std::fs::create_dir_all(dir_tmp.join("detections"))?;
        }
        if cfg.save_observations {
            std::fs::create_dir_all(dir_tmp.join("observations"))?;
        }

        let left_video = AviWriter::new(
            File::create(video_path(&dir_tmp, CameraSide::Left))?,
            width,
            height,
            fps,
        )?;
        let right_video = AviWriter::new(
            File::create(video_path(&dir_tmp, CameraSide::Right))?,
            width,
            height,
            fps,
        )?;
        let mut left_ts = csv::Writer::from_writer(File::create(timestamps_path(
            &dir_tmp,
            CameraSide::Left,
        ))?);
        let mut right_ts = csv::Writer::from_writer(File::create(timestamps_path(
            &dir_tmp,
            CameraSide::Right,
        ))?);
        left_ts.write_record(["frame_index", "t_capture_monotonic_ns"])?;
        right_ts.write_record(["frame_index", "t_capture_monotonic_ns"])?;

        let mut recorder = Self {
            pitch_index,
            dir_tmp,
            dir_final,
            start_ns,
            end_ns: None,
            post_roll_ms: 0.0, // set by caller via `arm_post_roll`
            save_detections: cfg.save_detections,
            save_observations: cfg.save_observations,
            save_training_frames: cfg.save_training_frames,
            frame_save_interval: cfg.frame_save_interval.max(1),
            left_video,
            right_video,
            left_ts,
            right_ts,
            detections: [Vec::new(), Vec::new()],
            observations: Vec::new(),
            milestones: [FrameMilestones::default(), FrameMilestones::default()],
            pre_roll_frame_count: pre_roll.left.len().max(pre_roll.right.len()),
            incomplete: false,
        };

        let mut first_pre_roll_written = false;
        for side in [CameraSide::Left, CameraSide::Right] {
            for frame in pre_roll.get(side) {
                recorder.write_video_and_ts(side, frame)?;
                if recorder.save_training_frames && !first_pre_roll_written {
                    let dir = recorder.frames_dir(side);
                    if let Err(e) =
                        save_png(frame, &dir.join(format!("pre_roll_{:05}.png", frame.frame_index)))
                    {
                        tracing::warn!(error = %e, "failed to write pre_roll milestone PNG");
                        recorder.incomplete = true;
                    }
                    first_pre_roll_written = true;
                }
                recorder.milestones[side_index(side)].last_frame_overall = Some(frame.clone());
            }
        }

        Ok(recorder)
    }

    pub fn arm_post_roll(&mut self, post_roll_ms: f64) {
        self.post_roll_ms = post_roll_ms;
    }

    fn frames_dir(&self, side: CameraSide) -> PathBuf {
        self.dir_tmp.join("frames").join(side.as_str())
    }

    fn write_video_and_ts(&mut self, side: CameraSide, frame: &Frame) -> Result<()> {
        let jpeg = match encode_jpeg(frame, JPEG_QUALITY) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, camera = %side, "frame encode failed, dropping frame");
                self.incomplete = true;
                return Ok(());
            }
        };
        let video = match side {
            CameraSide::Left => &mut self.left_video,
            CameraSide::Right => &mut self.right_video,
        };
        video.write_jpeg_frame(&jpeg)?;
        let ts = match side {
            CameraSide::Left => &mut self.left_ts,
            CameraSide::Right => &mut self.right_ts,
        };
        ts.write_record([
            frame.frame_index.to_string(),
            frame.t_capture_monotonic_ns.to_string(),
        ])?;
        Ok(())
    }

    /// Streams one live frame (plus whatever detections landed on it) into
    /// the pitch. Called once per frame per camera while the pitch is open.
    pub fn write_frame(&mut self, side: CameraSide, frame: &Frame, detections: &[Detection]) {
        if let Err(e) = self.write_video_and_ts(side, frame) {
            tracing::warn!(error = %e, camera = %side, "recorder write failed");
            self.incomplete = true;
        }

        if self.save_detections {
            self.detections[side_index(side)].extend(detections.iter().map(DetectionRecord::from));
        }

        if self.save_training_frames {
            let has_detection = !detections.is_empty();
            let idx = side_index(side);
            if has_detection && !self.milestones[idx].first_detection_written {
                let dir = self.frames_dir(side);
                let path = dir.join(format!("pitch_{:05}_first.png", self.pitch_index));
                if let Err(e) = save_png(frame, &path) {
                    tracing::warn!(error = %e, "failed to write first-detection milestone PNG");
                    self.incomplete = true;
                }
                self.milestones[idx].first_detection_written = true;
            }
            if frame.frame_index % self.frame_save_interval as u64 == 0 {
                let dir = self.frames_dir(side);
                let path = dir.join(format!("uniform_{:05}.png", frame.frame_index));
                if let Err(e) = save_png(frame, &path) {
                    tracing::warn!(error = %e, "failed to write uniform milestone PNG");
                    self.incomplete = true;
                }
            }
            if has_detection {
                self.milestones[idx].last_detection_frame = Some(frame.clone());
            }
            self.milestones[idx].last_frame_overall = Some(frame.clone());
        }
    }

    pub fn write_observation(&mut self, obs: StereoObservation) {
        if self.save_observations {
            self.observations.push(ObservationRecord::from(&obs));
        }
    }

    pub fn mark_ended(&mut self, end_ns: i64) {
        self.end_ns = Some(end_ns);
    }

    /// True once `post_roll_ms` of capture-clock time has elapsed since
    /// `mark_ended`. Frames observed after this point must be ignored by
    /// the caller rather than passed to `write_frame`.
    pub fn should_close(&self, now_ns: i64) -> bool {
        match self.end_ns {
            Some(end) => (now_ns - end) as f64 / 1_000_000.0 >= self.post_roll_ms,
            None => false,
        }
    }

    pub fn incomplete(&self) -> bool {
        self.incomplete
    }

    /// Writes the milestone PNGs only knowable in hindsight, the JSON
    /// exports, the manifest, fsyncs everything, then atomically renames
    /// the `.tmp` directory to its final name. Returns the final directory.
    pub fn close(mut self, pitch_id: &str, summary: &PitchSummary) -> Result<PathBuf> {
        let total_detections = self.detections[0].len() + self.detections[1].len();
        let stereo_observations = self.observations.len();
        let duration_ns = self.end_ns.unwrap_or(self.start_ns) - self.start_ns;
        let detection_rate_hz = if duration_ns > 0 {
            total_detections as f64 / (duration_ns as f64 / 1_000_000_000.0)
        } else {
            0.0
        };

        for side in [CameraSide::Left, CameraSide::Right] {
            if self.save_training_frames {
                let idx = side_index(side);
                if let Some(frame) = self.milestones[idx].last_detection_frame.take() {
                    let dir = self.frames_dir(side);
                    let path = dir.join(format!("pitch_{:05}_last.png", self.pitch_index));
                    if let Err(e) = save_png(&frame, &path) {
                        tracing::warn!(error = %e, "failed to write last-detection milestone PNG");
                        self.incomplete = true;
                    }
                }
                if let Some(frame) = self.milestones[idx].last_frame_overall.take() {
                    let dir = self.frames_dir(side);
                    let path = dir.join("post_roll_last.png");
                    if let Err(e) = save_png(&frame, &path) {
                        tracing::warn!(error = %e, "failed to write post-roll-last milestone PNG");
                        self.incomplete = true;
                    }
                }
            }
        }

        if self.save_detections {
            for side in [CameraSide::Left, CameraSide::Right] {
                let idx = side_index(side);
                let file = DetectionsFile {
                    pitch_id: pitch_id.to_string(),
                    camera: side.as_str(),
                    detection_count: self.detections[idx].len(),
                    detections: std::mem::take(&mut self.detections[idx]),
                };
                let path = self
                    .dir_tmp
                    .join("detections")
                    .join(format!("{}_detections.json", side.as_str()));
                write_json(&path, &file)?;
            }
        }

        if self.save_observations {
            let file = ObservationsFile {
                pitch_id: pitch_id.to_string(),
                observation_count: self.observations.len(),
                observations: std::mem::take(&mut self.observations),
            };
            let path = self
                .dir_tmp
                .join("observations")
                .join("stereo_observations.json");
            write_json(&path, &file)?;
        }

        self.left_video.close()?.sync_all()?;
        self.right_video.close()?.sync_all()?;
        self.left_ts.flush()?;
        self.right_ts.flush()?;

        let manifest = PitchManifest {
            schema_version: pitch_types::MANIFEST_SCHEMA_VERSION,
            app_version: pitch_types::APP_VERSION,
            pitch_id: pitch_id.to_string(),
            t_start_ns: summary.t_start_ns,
            t_end_ns: summary.t_end_ns,
            is_strike: summary.is_strike,
            zone_row: summary.zone_row,
            zone_col: summary.zone_col,
            run_in: summary.run_in,
            rise_in: summary.rise_in,
            measured_speed_mph: summary.measured_speed_mph,
            rotation_rpm: summary.rotation_rpm,
            trajectory: TrajectoryRef {
                plate_crossing_xyz_ft: summary.plate_crossing_xyz_ft,
                plate_crossing_t_ns: summary.plate_crossing_t_ns,
                model: &summary.model,
                expected_error_ft: summary.expected_error_ft,
                confidence: summary.confidence,
            },
            left_video: "left.avi",
            right_video: "right.avi",
            left_timestamps: "left_timestamps.csv",
            right_timestamps: "right_timestamps.csv",
            incomplete: self.incomplete,
            performance_metrics: PerformanceMetrics {
                detection_quality: DetectionQuality {
                    stereo_observations,
                    detection_rate_hz,
                },
                timing_accuracy: TimingAccuracy {
                    pre_roll_frames_captured: self.pre_roll_frame_count,
                    duration_ns,
                    start_ns: self.start_ns,
                    end_ns: self.end_ns.unwrap_or(self.start_ns),
                },
            },
        };
        write_json(&self.dir_tmp.join("manifest.json"), &manifest)?;

        fsync_tree(&self.dir_tmp)?;
        std::fs::rename(&self.dir_tmp, &self.dir_final)?;
        Ok(self.dir_final)
    }

    pub fn start_ns(&self) -> i64 {
        self.start_ns
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = serde_json::to_vec_pretty(value)?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    Ok(())
}

fn fsync_tree(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fsync_tree(&path)?;
        } else if let Ok(f) = File::open(&path) {
            let _ = f.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::{DetectorMode, PerCameraFrames, PixelFormat, TrajectoryDiagnostics};

    fn frame(side: CameraSide, index: u64, t_ns: i64) -> Frame {
        Frame {
            camera: side,
            serial: "SN".into(),
            t_capture_monotonic_ns: t_ns,
            frame_index: index,
            width: 4,
            height: 4,
            pixel_format: PixelFormat::Gray8,
            data: vec![128u8; 16].into(),
        }
    }

    fn detection(side: CameraSide, index: u64, t_ns: i64) -> Detection {
        Detection {
            camera: side,
            frame_index: index,
            t_capture_monotonic_ns: t_ns,
            u_px: 2.0,
            v_px: 2.0,
            radius_px: 1.0,
            confidence: 0.9,
            mode: DetectorMode::ClassicalA,
        }
    }

    fn recording_cfg(dir: &Path) -> RecordingConfig {
        RecordingConfig {
            output_dir: dir.to_path_buf(),
            save_detections: true,
            save_observations: true,
            save_training_frames: true,
            frame_save_interval: 2,
        }
    }

    fn summary() -> PitchSummary {
        PitchSummary {
            pitch_id: "s1-pitch-001".into(),
            t_start_ns: 0,
            t_end_ns: 500_000_000,
            plate_crossing_xyz_ft: [0.1, 2.5, 0.0],
            plate_crossing_t_ns: 400_000_000,
            release_point_ft: [0.0, 6.0, 50.0],
            run_in: 3.0,
            rise_in: 8.0,
            measured_speed_mph: 92.0,
            rotation_rpm: Some(2200.0),
            model: "ballistic_drag_rk4".into(),
            expected_error_ft: 0.2,
            confidence: 0.8,
            is_strike: true,
            zone_row: 1,
            zone_col: 1,
            diagnostics: TrajectoryDiagnostics::default(),
        }
    }

    #[test]
    fn open_write_close_produces_expected_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let session_dir = tmp.path();
        let cfg = recording_cfg(session_dir);

        let mut pre_roll = PerCameraFrames::default();
        pre_roll.left.push(frame(CameraSide::Left, 0, 0));
        pre_roll.right.push(frame(CameraSide::Right, 0, 0));

        let mut rec = PitchRecorder::open(
            session_dir,
            "session1-pitch-001",
            1,
            0,
            4,
            4,
            30.0,
            &pre_roll,
            &cfg,
        )
        .unwrap();
        rec.arm_post_roll(100.0);

        for i in 1..6u64 {
            let t_ns = i as i64 * 33_333_333;
            let dets = if i == 2 {
                vec![detection(CameraSide::Left, i, t_ns)]
            } else {
                vec![]
            };
            rec.write_frame(CameraSide::Left, &frame(CameraSide::Left, i, t_ns), &dets);
            rec.write_frame(CameraSide::Right, &frame(CameraSide::Right, i, t_ns), &[]);
        }
        rec.write_observation(StereoObservation {
            t_ns: 66_666_666,
            left_px: (2.0, 2.0),
            right_px: (2.0, 2.0),
            point_ft: (0.0, 2.5, 10.0),
            covariance: None,
            quality: 0.9,
            confidence: 0.85,
        });
        rec.mark_ended(5 * 33_333_333);
        assert!(!rec.should_close(5 * 33_333_333 + 50_000_000));
        assert!(rec.should_close(5 * 33_333_333 + 150_000_000));

        let final_dir = rec.close("session1-pitch-001", &summary()).unwrap();
        assert!(final_dir.ends_with("session1-pitch-001"));
        assert!(!final_dir.with_extension("tmp").exists());

        assert!(final_dir.join("left.avi").exists());
        assert!(final_dir.join("right.avi").exists());
        assert!(final_dir.join("left_timestamps.csv").exists());
        assert!(final_dir.join("manifest.json").exists());
        assert!(final_dir
            .join("detections/left_detections.json")
            .exists());
        assert!(final_dir
            .join("observations/stereo_observations.json")
            .exists());
        assert!(final_dir.join("frames/left/pre_roll_00000.png").exists());
        assert!(final_dir
            .join(format!("frames/left/pitch_{:05}_first.png", 1))
            .exists());
        assert!(final_dir
            .join(format!("frames/left/pitch_{:05}_last.png", 1))
            .exists());
        assert!(final_dir.join("frames/left/post_roll_last.png").exists());

        let manifest_text = std::fs::read_to_string(final_dir.join("manifest.json")).unwrap();
        assert!(manifest_text.contains("\"is_strike\": true"));
        assert!(manifest_text.contains("\"incomplete\": false"));

        let detections_text =
            std::fs::read_to_string(final_dir.join("detections/left_detections.json")).unwrap();
        assert!(detections_text.contains("\"detection_count\": 1"));
    }

    #[test]
    fn should_close_false_before_mark_ended() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = recording_cfg(tmp.path());
        let pre_roll = PerCameraFrames::default();
        let rec = PitchRecorder::open(
            tmp.path(),
            "s-pitch-001",
            1,
            0,
            4,
            4,
            30.0,
            &pre_roll,
            &cfg,
        )
        .unwrap();
        assert!(!rec.should_close(1_000_000_000));
    }
}
