//! Observability snapshot: a plain in-process getter, not a network
//! service, mirroring `flydra2::model_server` exposing live state to a
//! consumer directly rather than only through logs.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const LATENCY_WINDOW: usize = 256;
const FPS_WINDOW_SECS: u64 = 10;

/// fps < 58 sustained for 2s, drop rate > 2%, queue depth > 6 sustained,
/// e2e p95 > 500ms sustained over 10 pitches.
pub const WARN_MIN_FPS: f64 = 58.0;
pub const WARN_QUEUE_DEPTH: usize = 6;
pub const WARN_E2E_P95_MS: f64 = 500.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStats {
    pub p50_ms: f64,
    pub p95_ms: f64,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

struct LatencyRing {
    samples: VecDeque<f64>,
}

impl LatencyRing {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    fn push(&mut self, ms: f64) {
        if self.samples.len() >= LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    fn stats(&self) -> LatencyStats {
        let mut sorted: Vec<f64> = self.samples.iter().cloned().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        LatencyStats {
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
        }
    }
}

struct CameraCounters {
    frame_times: Mutex<VecDeque<Instant>>,
    last_two: Mutex<(Option<Instant>, Option<Instant>)>,
    jitter_ms: Mutex<LatencyRing>,
    total_frames: AtomicU64,
}

impl CameraCounters {
    fn new() -> Self {
        Self {
            frame_times: Mutex::new(VecDeque::new()),
            last_two: Mutex::new((None, None)),
            jitter_ms: Mutex::new(LatencyRing::new()),
            total_frames: AtomicU64::new(0),
        }
    }

    fn record_frame(&self, now: Instant) {
        self.total_frames.fetch_add(1, Ordering::Relaxed);
        {
            let mut times = self.frame_times.lock();
            times.push_back(now);
            while let Some(front) = times.front() {
                if now.duration_since(*front) > Duration::from_secs(FPS_WINDOW_SECS) {
                    times.pop_front();
                } else {
                    break;
                }
            }
        }
        let mut last_two = self.last_two.lock();
        if let (_, Some(prev)) = *last_two {
            let delta_ms = now.duration_since(prev).as_secs_f64() * 1000.0;
            self.jitter_ms.lock().push(delta_ms);
        }
        *last_two = (last_two.1, Some(now));
    }

    fn mean_fps(&self) -> f64 {
        let times = self.frame_times.lock();
        if times.len() < 2 {
            return 0.0;
        }
        let span = times.back().unwrap().duration_since(*times.front().unwrap());
        if span.as_secs_f64() == 0.0 {
            0.0
        } else {
            (times.len() as f64 - 1.0) / span.as_secs_f64()
        }
    }
}

/// Shared, thread-safe accumulator fed by the capture/detector/matcher
/// threads; [`Orchestrator::stats`](crate::Orchestrator::stats) reads a
/// point-in-time [`PipelineStats`] snapshot out of it.
pub struct StatsCollector {
    left: CameraCounters,
    right: CameraCounters,
    detection_latency_left: Mutex<LatencyRing>,
    detection_latency_right: Mutex<LatencyRing>,
    matcher_latency: Mutex<LatencyRing>,
    e2e_latency: Mutex<LatencyRing>,
    dropped_frames: AtomicU64,
    pushed_frames: AtomicU64,
    pitches_started: AtomicU64,
    pitches_completed: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            left: CameraCounters::new(),
            right: CameraCounters::new(),
            detection_latency_left: Mutex::new(LatencyRing::new()),
            detection_latency_right: Mutex::new(LatencyRing::new()),
            matcher_latency: Mutex::new(LatencyRing::new()),
            e2e_latency: Mutex::new(LatencyRing::new()),
            dropped_frames: AtomicU64::new(0),
            pushed_frames: AtomicU64::new(0),
            pitches_started: AtomicU64::new(0),
            pitches_completed: AtomicU64::new(0),
        }
    }

    pub fn record_frame(&self, side: pitch_types::CameraSide) {
        let counters = self.side(side);
        counters.record_frame(Instant::now());
    }

    pub fn record_detection_latency(&self, side: pitch_types::CameraSide, ms: f64) {
        let ring = match side {
            pitch_types::CameraSide::Left => &self.detection_latency_left,
            pitch_types::CameraSide::Right => &self.detection_latency_right,
        };
        ring.lock().push(ms);
    }

    pub fn record_matcher_latency(&self, ms: f64) {
        self.matcher_latency.lock().push(ms);
    }

    pub fn record_e2e_latency(&self, ms: f64) {
        self.e2e_latency.lock().push(ms);
    }

    pub fn record_queue_push(&self, dropped: bool) {
        self.pushed_frames.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_pitch_started(&self) {
        self.pitches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pitch_completed(&self) {
        self.pitches_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn side(&self, side: pitch_types::CameraSide) -> &CameraCounters {
        match side {
            pitch_types::CameraSide::Left => &self.left,
            pitch_types::CameraSide::Right => &self.right,
        }
    }

    pub fn snapshot(&self, left_queue: Option<pitch_capture::QueueStats>, right_queue: Option<pitch_capture::QueueStats>) -> PipelineStats {
        let pushed = self.pushed_frames.load(Ordering::Relaxed);
        let dropped = self.dropped_frames.load(Ordering::Relaxed);
        let started = self.pitches_started.load(Ordering::Relaxed);
        let completed = self.pitches_completed.load(Ordering::Relaxed);
        PipelineStats {
            left_fps_mean: self.left.mean_fps(),
            right_fps_mean: self.right.mean_fps(),
            left_jitter_p95_ms: self.left.jitter_ms.lock().stats().p95_ms,
            right_jitter_p95_ms: self.right.jitter_ms.lock().stats().p95_ms,
            total_pushed: pushed,
            total_dropped: dropped,
            drop_rate: if pushed == 0 { 0.0 } else { dropped as f64 / pushed as f64 },
            left_queue_depth: left_queue.map(|s| s.depth).unwrap_or(0),
            right_queue_depth: right_queue.map(|s| s.depth).unwrap_or(0),
            left_detection_latency: self.detection_latency_left.lock().stats(),
            right_detection_latency: self.detection_latency_right.lock().stats(),
            matcher_latency: self.matcher_latency.lock().stats(),
            end_to_end_latency: self.e2e_latency.lock().stats(),
            pitches_started: started,
            pitches_completed: completed,
            track_success_rate: if started == 0 { 1.0 } else { completed as f64 / started as f64 },
        }
    }
}

/// Point-in-time observability snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PipelineStats {
    pub left_fps_mean: f64,
    pub right_fps_mean: f64,
    pub left_jitter_p95_ms: f64,
    pub right_jitter_p95_ms: f64,
    pub total_pushed: u64,
    pub total_dropped: u64,
    pub drop_rate: f64,
    pub left_queue_depth: usize,
    pub right_queue_depth: usize,
    pub left_detection_latency: LatencyStats,
    pub right_detection_latency: LatencyStats,
    pub matcher_latency: LatencyStats,
    pub end_to_end_latency: LatencyStats,
    pub pitches_started: u64,
    pub pitches_completed: u64,
    pub track_success_rate: f64,
}

impl PipelineStats {
    /// Logs the WARN conditions that currently hold. Sustained
    /// detection (N consecutive samples) is the caller's responsibility;
    /// this only checks the instantaneous snapshot.
    pub fn warn_if_degraded(&self) {
        if self.left_fps_mean > 0.0 && self.left_fps_mean < WARN_MIN_FPS {
            tracing::warn!(camera = "left", fps = self.left_fps_mean, "fps below threshold");
        }
        if self.right_fps_mean > 0.0 && self.right_fps_mean < WARN_MIN_FPS {
            tracing::warn!(camera = "right", fps = self.right_fps_mean, "fps below threshold");
        }
        if self.drop_rate > 0.02 {
            tracing::warn!(drop_rate = self.drop_rate, "sustained capture drop rate");
        }
        if self.left_queue_depth > WARN_QUEUE_DEPTH || self.right_queue_depth > WARN_QUEUE_DEPTH {
            tracing::warn!(
                left_depth = self.left_queue_depth,
                right_depth = self.right_queue_depth,
                "capture queue depth above threshold"
            );
        }
        if self.end_to_end_latency.p95_ms > WARN_E2E_P95_MS {
            tracing::warn!(p95_ms = self.end_to_end_latency.p95_ms, "end-to-end latency above threshold");
        }
    }
}
