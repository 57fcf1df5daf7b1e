//! Wires the capture/detector/matcher threads, the pitch state machine and
//! the recorder/metrics callback into one running pipeline.
//!
//! Grounded on `braid_run`/`braid::braid_start`'s shape for the binary
//! entrypoint (`src/main.rs`) and on `flydra2`'s coarse ownership of a
//! single long-lived tracking object the capture/detection stages feed
//! into, generalized here from one camera to a fixed stereo pair.
//!
//! The spec's "detector worker pool" collapses to exactly one thread per
//! camera: that already satisfies the single-consumer-per-camera ordering
//! guarantee and matches the pool's stated default size of two. The single
//! matcher thread doubles as the tick driver for
//! [`pitch_tracking::PitchStateMachine::update`]: a successful channel
//! receive drives a one-lane tick for whichever camera produced it, and a
//! receive timeout drives a zero-lane tick, so phase transitions keep
//! advancing even when nothing is currently detected.

mod callback;
pub mod error;
mod recorder_slot;
pub mod session;
pub mod stats;

pub use callback::OrchestratorCallback;
pub use error::{Error, Result};
pub use session::{SessionManifest, SessionSummary};
pub use stats::PipelineStats;

use parking_lot::Mutex;
use pitch_camera::{Camera, CameraModule, NoopReconnectPolicy, ReconnectPolicy};
use pitch_config::Config;
use pitch_detector::Detector;
use pitch_mvg::StereoMatcher;
use pitch_tracking::PitchStateMachine;
use pitch_types::{CalibrationProfile, CameraSide, Detection, PitchSummary, RoiPolygon};
use recorder_slot::RecorderSlot;
use stats::StatsCollector;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Number of consecutive transient read errors a capture thread tolerates
/// before declaring its camera fatal. Not named by the spec; a pragmatic
/// bound that's several multiples of a plausible one-off glitch without
/// masking a genuinely failing device.
const CAPTURE_RETRY_BUDGET: u32 = 5;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

fn pixfmt_for(prefs: &[pitch_config::PixFmtPref]) -> pitch_types::PixelFormat {
    match prefs.first().copied().unwrap_or(pitch_config::PixFmtPref::Gray8) {
        pitch_config::PixFmtPref::Gray8 => pitch_types::PixelFormat::Gray8,
        pitch_config::PixFmtPref::Yuy2 => pitch_types::PixelFormat::Yuy2,
        pitch_config::PixFmtPref::Mjpg => pitch_types::PixelFormat::Mjpg,
    }
}

fn configure_camera<C: Camera>(
    camera: &mut C,
    cfg: &pitch_config::CameraConfig,
    pixfmt: pitch_types::PixelFormat,
) -> pitch_camera::Result<()> {
    camera.set_mode(cfg.width, cfg.height, cfg.fps, pixfmt)?;
    camera.set_controls(cfg.exposure_us, cfg.gain, cfg.wb_mode.as_deref())?;
    Ok(())
}

fn join_with_timeout(handle: JoinHandle<()>, name: &'static str, timeout: Duration) -> Result<()> {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let watcher = std::thread::spawn(move || {
        let _ = handle.join();
        let _ = done_tx.send(());
    });
    match done_rx.recv_timeout(timeout) {
        Ok(()) => {
            let _ = watcher.join();
            Ok(())
        }
        Err(_) => Err(Error::ShutdownIncomplete(name)),
    }
}

#[derive(serde::Serialize)]
struct RoiAnnotations<'a> {
    left: &'a RoiPolygon,
    right: &'a RoiPolygon,
}

fn write_json(path: PathBuf, value: &impl serde::Serialize) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn write_calibration_export(session_dir: &std::path::Path, calibration: &CalibrationProfile, roi: &RoiPolygon) -> Result<()> {
    let dir = session_dir.join("calibration");
    std::fs::create_dir_all(&dir)?;
    write_json(dir.join("stereo_geometry.json"), &calibration.stereo)?;
    write_json(dir.join("intrinsics_left.json"), &calibration.left_intrinsics)?;
    write_json(dir.join("intrinsics_right.json"), &calibration.right_intrinsics)?;
    write_json(
        dir.join("roi_annotations.json"),
        &RoiAnnotations { left: roi, right: roi },
    )?;
    Ok(())
}

fn spawn_capture_thread<C: Camera + Send + 'static>(
    mut camera: C,
    producer: pitch_capture::CaptureQueueProducer,
    state_machine: Arc<PitchStateMachine>,
    stats: Arc<StatsCollector>,
    shutdown: Arc<AtomicBool>,
    frame_period: Duration,
    mut reconnect: Box<dyn ReconnectPolicy<C>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut consecutive_errors = 0u32;
        while !shutdown.load(Ordering::Relaxed) {
            match camera.read_frame(100) {
                Ok(frame) => {
                    consecutive_errors = 0;
                    stats.record_frame(frame.camera);
                    state_machine.buffer_frame(frame.clone());
                    let before = producer.stats().total_dropped;
                    producer.push(frame);
                    let after = producer.stats().total_dropped;
                    stats.record_queue_push(after > before);
                }
                Err(pitch_camera::Error::CameraReadTransient(msg)) => {
                    consecutive_errors += 1;
                    tracing::debug!(error = %msg, consecutive_errors, "transient camera read error");
                    if consecutive_errors > CAPTURE_RETRY_BUDGET {
                        tracing::error!("exceeded transient read-error retry budget, stopping capture thread");
                        break;
                    }
                    continue;
                }
                Err(pitch_camera::Error::CameraReadFatal(msg)) => {
                    tracing::error!(error = %msg, "fatal camera read error");
                    match reconnect.on_fatal_error(&camera) {
                        Ok(Some(replacement)) => {
                            camera = replacement;
                            consecutive_errors = 0;
                            continue;
                        }
                        _ => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "camera read error, stopping capture thread");
                    break;
                }
            }
            std::thread::sleep(frame_period);
        }
        let _ = camera.close();
    })
}

fn spawn_detector_thread(
    mut detector: Box<dyn Detector>,
    consumer: pitch_capture::CaptureQueueConsumer,
    roi: RoiPolygon,
    side: CameraSide,
    tx: crossbeam_channel::Sender<(Detection, Instant)>,
    recorder_slot: RecorderSlot,
    stats: Arc<StatsCollector>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            let frame = match consumer.pop_timeout(Duration::from_millis(100)) {
                Some(f) => f,
                None => continue,
            };
            let dequeue_instant = Instant::now();
            let detections = match detector.detect(&frame, &roi) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, camera = %side, "detector error, skipping frame");
                    continue;
                }
            };
            stats.record_detection_latency(side, dequeue_instant.elapsed().as_secs_f64() * 1000.0);

            {
                let mut guard = recorder_slot.lock();
                if let Some(state) = guard.as_mut() {
                    state.recorder_mut().write_frame(side, &frame, &detections);
                }
            }
            recorder_slot::drain_if_closeable(&recorder_slot, frame.t_capture_monotonic_ns);

            for det in detections {
                let _ = tx.send((det, dequeue_instant));
            }
        }
    })
}

fn spawn_matcher_thread(
    mut matcher: StereoMatcher,
    rx: crossbeam_channel::Receiver<(Detection, Instant)>,
    state_machine: Arc<PitchStateMachine>,
    recorder_slot: RecorderSlot,
    stats: Arc<StatsCollector>,
    shutdown: Arc<AtomicBool>,
    clock_start: Instant,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok((detection, dequeue_instant)) => {
                    let side = detection.camera;
                    let frame_ns = detection.t_capture_monotonic_ns;
                    let matcher_start = Instant::now();
                    let observation = matcher.push_detection(detection);
                    stats.record_matcher_latency(matcher_start.elapsed().as_secs_f64() * 1000.0);

                    if let Some(obs) = observation {
                        state_machine.add_observation(obs);
                        {
                            let mut guard = recorder_slot.lock();
                            if let Some(state) = guard.as_mut() {
                                state.recorder_mut().write_observation(obs);
                            }
                        }
                        stats.record_e2e_latency(dequeue_instant.elapsed().as_secs_f64() * 1000.0);
                    }

                    let (left_lane, right_lane) = match side {
                        CameraSide::Left => (1, 0),
                        CameraSide::Right => (0, 1),
                    };
                    state_machine.update(frame_ns, left_lane, right_lane, 0);
                    recorder_slot::drain_if_closeable(&recorder_slot, frame_ns);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    let now_ns = clock_start.elapsed().as_nanos() as i64;
                    state_machine.update(now_ns, 0, 0, 0);
                    recorder_slot::drain_if_closeable(&recorder_slot, now_ns);
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

/// Owns the running pipeline: two capture threads, two detector threads,
/// one matcher/tick-driver thread, and the pitch state machine they all
/// feed. `M` is the camera backend (the simulated reference backend, or a
/// real vendor-specific one behind the same trait).
pub struct Orchestrator<M: CameraModule> {
    camera_module: M,
    shutdown: Arc<AtomicBool>,
    shutdown_timeout: Duration,
    capturing: bool,
    capture_handles: Vec<JoinHandle<()>>,
    detector_handles: Vec<JoinHandle<()>>,
    matcher_handle: Option<JoinHandle<()>>,
    state_machine: Option<Arc<PitchStateMachine>>,
    stats: Arc<StatsCollector>,
    left_queue: Option<pitch_capture::CaptureQueueProducer>,
    right_queue: Option<pitch_capture::CaptureQueueProducer>,
    output_dir: Option<PathBuf>,
    calibration: Option<CalibrationProfile>,
    roi: Option<RoiPolygon>,
    session_id: Arc<Mutex<Option<String>>>,
    session_dir: Arc<Mutex<Option<PathBuf>>>,
    session_started_at: Option<chrono::DateTime<chrono::Utc>>,
    recorder_slot: RecorderSlot,
    pending_summaries: Arc<Mutex<Vec<PitchSummary>>>,
}

impl<M: CameraModule> Orchestrator<M>
where
    M::CameraType: Send + 'static,
{
    pub fn new(camera_module: M) -> Self {
        Self {
            camera_module,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            capturing: false,
            capture_handles: Vec::new(),
            detector_handles: Vec::new(),
            matcher_handle: None,
            state_machine: None,
            stats: Arc::new(StatsCollector::new()),
            left_queue: None,
            right_queue: None,
            output_dir: None,
            calibration: None,
            roi: None,
            session_id: Arc::new(Mutex::new(None)),
            session_dir: Arc::new(Mutex::new(None)),
            session_started_at: None,
            recorder_slot: Arc::new(Mutex::new(None)),
            pending_summaries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Opens both cameras, builds the capture/detector/matcher stages and
    /// the pitch state machine, and starts their threads. Every resource
    /// acquired here is released (cameras closed, threads joined) by
    /// [`Orchestrator::stop_capture`], including on this method's own error
    /// paths.
    pub fn start_capture(
        &mut self,
        config: Config,
        left_serial: &str,
        right_serial: &str,
        calibration: CalibrationProfile,
        reconnect_left: Option<Box<dyn ReconnectPolicy<M::CameraType>>>,
        reconnect_right: Option<Box<dyn ReconnectPolicy<M::CameraType>>>,
    ) -> Result<()> {
        if self.capturing {
            return Err(Error::AlreadyCapturing);
        }
        config.validate()?;
        if config.tracking.use_plate_gate {
            return Err(Error::Config(pitch_config::Error::Invalid(
                "tracking.use_plate_gate requires a plate-detection lane this orchestrator does not wire"
                    .into(),
            )));
        }

        let pixfmt = pixfmt_for(&config.camera.pixfmt);

        let mut left_camera = self.camera_module.open("left", left_serial)?;
        let mut right_camera = match self.camera_module.open("right", right_serial) {
            Ok(cam) => cam,
            Err(e) => {
                let _ = left_camera.close();
                return Err(e.into());
            }
        };

        let configure_result = configure_camera(&mut left_camera, &config.camera, pixfmt)
            .and_then(|_| configure_camera(&mut right_camera, &config.camera, pixfmt));
        if let Err(e) = configure_result {
            let _ = left_camera.close();
            let _ = right_camera.close();
            return Err(e.into());
        }

        let (left_producer, left_consumer) =
            pitch_capture::capture_queue("left", config.capture.queue_size);
        let (right_producer, right_consumer) =
            pitch_capture::capture_queue("right", config.capture.queue_size);

        let left_detector = pitch_detector::build_detector(&config.detector)?;
        let right_detector = pitch_detector::build_detector(&config.detector)?;
        let roi = RoiPolygon::full_frame(config.camera.width, config.camera.height);

        let matcher = StereoMatcher::new(calibration.clone(), &config.stereo);

        let callback = Box::new(OrchestratorCallback::new(
            self.session_id.clone(),
            self.session_dir.clone(),
            self.recorder_slot.clone(),
            self.pending_summaries.clone(),
            self.stats.clone(),
            config.recording.clone(),
            config.metrics.clone(),
            config.strike_zone(),
            config.camera.width,
            config.camera.height,
            config.camera.fps,
            config.tracking.post_roll_ms,
        ));
        let state_machine = Arc::new(PitchStateMachine::new(
            config.tracking.clone(),
            config.camera.fps,
            callback,
        ));

        self.shutdown.store(false, Ordering::Relaxed);
        let clock_start = Instant::now();
        let frame_period = Duration::from_secs_f64(1.0 / config.camera.fps);
        let (tx, rx) = crossbeam_channel::unbounded::<(Detection, Instant)>();

        let left_handle = spawn_capture_thread(
            left_camera,
            left_producer.clone(),
            state_machine.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
            frame_period,
            reconnect_left.unwrap_or_else(|| Box::new(NoopReconnectPolicy)),
        );
        let right_handle = spawn_capture_thread(
            right_camera,
            right_producer.clone(),
            state_machine.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
            frame_period,
            reconnect_right.unwrap_or_else(|| Box::new(NoopReconnectPolicy)),
        );

        let left_det_handle = spawn_detector_thread(
            left_detector,
            left_consumer,
            roi.clone(),
            CameraSide::Left,
            tx.clone(),
            self.recorder_slot.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
        );
        let right_det_handle = spawn_detector_thread(
            right_detector,
            right_consumer,
            roi.clone(),
            CameraSide::Right,
            tx,
            self.recorder_slot.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
        );

        let matcher_handle = spawn_matcher_thread(
            matcher,
            rx,
            state_machine.clone(),
            self.recorder_slot.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
            clock_start,
        );

        self.capture_handles = vec![left_handle, right_handle];
        self.detector_handles = vec![left_det_handle, right_det_handle];
        self.matcher_handle = Some(matcher_handle);
        self.state_machine = Some(state_machine);
        self.left_queue = Some(left_producer);
        self.right_queue = Some(right_producer);
        self.output_dir = Some(config.recording.output_dir.clone());
        self.calibration = Some(calibration);
        self.roi = Some(roi);
        self.capturing = true;
        Ok(())
    }

    /// Arms recording: creates the session directory, exports the
    /// calibration subtree, and lets the pitch callback start opening
    /// per-pitch recorders. Tracking runs identically whether or not a
    /// session is armed; an unarmed session simply means finished pitches
    /// are scored but never written to disk.
    pub fn start_session(&mut self, session_name: &str) -> Result<PathBuf> {
        if !self.capturing {
            return Err(Error::NotCapturing);
        }
        let base = self.output_dir.clone().ok_or(Error::NotCapturing)?;
        let session_dir = base.join(session_name);
        std::fs::create_dir_all(&session_dir)?;

        if let (Some(calibration), Some(roi)) = (&self.calibration, &self.roi) {
            write_calibration_export(&session_dir, calibration, roi)?;
        }

        *self.session_id.lock() = Some(session_name.to_string());
        *self.session_dir.lock() = Some(session_dir.clone());
        self.session_started_at = Some(chrono::Utc::now());
        self.pending_summaries.lock().clear();
        Ok(session_dir)
    }

    /// Disarms recording, flushes whatever pitch finished draining, and
    /// writes the session's manifest, summary and event log.
    pub fn stop_session(&mut self) -> Result<SessionSummary> {
        let session_dir = self.session_dir.lock().take().ok_or(Error::NoSession)?;
        let session_id = self.session_id.lock().take().ok_or(Error::NoSession)?;

        recorder_slot::force_close(&self.recorder_slot);

        let events = self
            .state_machine
            .as_ref()
            .map(|sm| sm.events())
            .unwrap_or_default();
        session::write_event_log(&session_dir, &events)?;

        let pitches = std::mem::take(&mut *self.pending_summaries.lock());
        let summary = SessionSummary {
            session_id: session_id.clone(),
            pitch_count: pitches.len(),
            pitches,
        };
        session::write_session_summary(&session_dir, &summary)?;

        let manifest = SessionManifest {
            schema_version: pitch_types::MANIFEST_SCHEMA_VERSION,
            app_version: pitch_types::APP_VERSION,
            session_id: &summary.session_id,
            start_utc: self.session_started_at.take().unwrap_or_else(chrono::Utc::now),
            end_utc: Some(chrono::Utc::now()),
            pitch_count: summary.pitch_count,
        };
        session::write_session_manifest(&session_dir, &manifest)?;

        Ok(summary)
    }

    /// Signals every thread to stop, joins them (each bounded by the
    /// configured shutdown timeout), and closes the cameras. A recorder
    /// left mid-write never gets promoted out of its `.tmp` directory, so
    /// an abrupt shutdown mid-pitch simply leaves an incomplete clip behind
    /// rather than a corrupt finished one.
    pub fn stop_capture(&mut self) -> Result<()> {
        if !self.capturing {
            return Err(Error::NotCapturing);
        }
        self.shutdown.store(true, Ordering::Relaxed);

        let mut first_err = None;

        if let Some(h) = self.matcher_handle.take() {
            if let Err(e) = join_with_timeout(h, "matcher thread", self.shutdown_timeout) {
                first_err.get_or_insert(e);
            }
        }
        for h in self.detector_handles.drain(..) {
            if let Err(e) = join_with_timeout(h, "detector thread", self.shutdown_timeout) {
                first_err.get_or_insert(e);
            }
        }
        for h in self.capture_handles.drain(..) {
            if let Err(e) = join_with_timeout(h, "capture thread", self.shutdown_timeout) {
                first_err.get_or_insert(e);
            }
        }

        self.state_machine = None;
        self.left_queue = None;
        self.right_queue = None;
        self.capturing = false;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Point-in-time observability snapshot.
    pub fn stats(&self) -> PipelineStats {
        let left_q = self.left_queue.as_ref().map(|p| p.stats());
        let right_q = self.right_queue.as_ref().map(|p| p.stats());
        self.stats.snapshot(left_q, right_q)
    }
}
