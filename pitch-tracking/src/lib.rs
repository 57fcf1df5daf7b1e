//! The pitch state machine, the heart of the core.
//!
//! Grounded on `flydra2`'s coarse-lock philosophy for tracking-state
//! mutation: rather than fine-grained locks
//! per field (a known source of the "lost ramp-up observations" class of
//! bug the corpus describes), every public method serializes through one
//! lock held for its entire duration.

mod callback;
mod pre_roll;

pub use callback::{NoopPitchCallback, PitchCallback};
pub use pre_roll::PreRollRing;

use parking_lot::ReentrantMutex;
use pitch_config::TrackingConfig;
use pitch_types::{
    Frame, PerCameraFrames, PitchData, StereoObservation, TrackingEvent, TrackingEventKind,
};
use std::cell::RefCell;
use std::collections::VecDeque;

const EVENT_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    RampUp,
    Active,
}

struct Inner {
    phase: Phase,
    config: TrackingConfig,
    fps: f64,
    pitch_index: u32,
    first_detection_ns: i64,
    active_frames: u32,
    gap_frames: u32,
    last_detection_ns: i64,
    ramp_up_observations: Vec<StereoObservation>,
    active_observations: Vec<StereoObservation>,
    pre_roll: PreRollRing,
    events: VecDeque<TrackingEvent>,
    callback: Box<dyn PitchCallback>,
}

impl Inner {
    fn log(&mut self, t_ns: i64, kind: TrackingEventKind) {
        if self.events.len() >= EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(TrackingEvent { t_ns, kind });
    }

    fn pre_roll_capacity(pre_roll_ms: f64, fps: f64) -> usize {
        (pre_roll_ms * fps / 1000.0).ceil().max(0.0) as usize
    }

    fn is_active(&self, left_lane_count: u32, right_lane_count: u32, plate_count: u32) -> bool {
        if self.config.use_plate_gate {
            plate_count > 0
        } else {
            left_lane_count + right_lane_count > 0
        }
    }
}

/// Four explicit phases: INACTIVE, RAMP_UP, ACTIVE, and a transient
/// FINALIZED that exists only for the duration of the end-of-pitch callback
/// (modeled here as a synchronous step inside `update`, not a stored phase).
pub struct PitchStateMachine {
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl PitchStateMachine {
    pub fn new(config: TrackingConfig, fps: f64, callback: Box<dyn PitchCallback>) -> Self {
        let capacity = Inner::pre_roll_capacity(config.pre_roll_ms, fps);
        let inner = Inner {
            phase: Phase::Inactive,
            config,
            fps,
            pitch_index: 0,
            first_detection_ns: 0,
            active_frames: 0,
            gap_frames: 0,
            last_detection_ns: 0,
            ramp_up_observations: Vec::new(),
            active_observations: Vec::new(),
            pre_roll: PreRollRing::new(capacity),
            events: VecDeque::new(),
            callback,
        };
        Self {
            inner: ReentrantMutex::new(RefCell::new(inner)),
        }
    }

    /// Replaces the tracking configuration. Rejected (no-op, returns `Err`)
    /// unless the phase is currently INACTIVE.
    pub fn update_config(&self, config: TrackingConfig, fps: f64) -> Result<(), &'static str> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.phase != Phase::Inactive {
            return Err("update_config is only valid while INACTIVE");
        }
        let capacity = Inner::pre_roll_capacity(config.pre_roll_ms, fps);
        inner.pre_roll.set_capacity(capacity);
        inner.config = config;
        inner.fps = fps;
        Ok(())
    }

    /// Appends `frame` to the pre-roll ring for its camera. Called
    /// unconditionally on every frame, regardless of phase; a no-op while
    /// ACTIVE, since active-phase frames are written directly by the
    /// Recorder rather than buffered here.
    pub fn buffer_frame(&self, frame: Frame) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.phase != Phase::Active {
            inner.pre_roll.push(frame);
        }
    }

    /// Appends `obs` to whichever observation list matches the current
    /// phase. Discarded while INACTIVE.
    pub fn add_observation(&self, obs: StereoObservation) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        match inner.phase {
            Phase::RampUp => inner.ramp_up_observations.push(obs),
            Phase::Active => inner.active_observations.push(obs),
            Phase::Inactive => {}
        }
    }

    /// Drives the phase transitions. Called once per frame period by the
    /// orchestrator with aggregated gate-crossing counts.
    pub fn update(&self, frame_ns: i64, left_lane_count: u32, right_lane_count: u32, plate_count: u32) {
        let guard = self.inner.lock();
        let active = {
            let inner = guard.borrow();
            inner.is_active(left_lane_count, right_lane_count, plate_count)
        };
        let phase = guard.borrow().phase;
        drop(guard);

        match (phase, active) {
            (Phase::Inactive, true) => {
                let guard = self.inner.lock();
                let mut inner = guard.borrow_mut();
                inner.phase = Phase::RampUp;
                inner.first_detection_ns = frame_ns;
                inner.active_frames = 1;
                inner.gap_frames = 0;
                inner.ramp_up_observations.clear();
                inner.log(frame_ns, TrackingEventKind::EnteredRampUp { first_detection_ns: frame_ns });
            }
            (Phase::Inactive, false) => {}
            (Phase::RampUp, true) => {
                self.advance_ramp_up(frame_ns);
            }
            (Phase::RampUp, false) => {
                let guard = self.inner.lock();
                let mut inner = guard.borrow_mut();
                inner.gap_frames += 1;
                if inner.gap_frames >= inner.config.end_gap_frames {
                    inner.phase = Phase::Inactive;
                    inner.ramp_up_observations.clear();
                    let gap_frames = inner.gap_frames;
                    inner.log(frame_ns, TrackingEventKind::AbandonedRampUp { gap_frames });
                }
            }
            (Phase::Active, true) => {
                let guard = self.inner.lock();
                let mut inner = guard.borrow_mut();
                inner.gap_frames = 0;
                inner.last_detection_ns = frame_ns;
            }
            (Phase::Active, false) => {
                self.advance_active_gap(frame_ns);
            }
        }
    }

    fn advance_ramp_up(&self, frame_ns: i64) {
        // Held for the whole transition: a concurrent `add_observation`
        // landing between the clone below and the clear in the match arms
        // would otherwise be appended to `ramp_up_observations` after it's
        // been snapshotted but before it's cleared, and silently lost.
        let guard = self.inner.lock();

        let should_promote = {
            let mut inner = guard.borrow_mut();
            inner.active_frames += 1;
            inner.gap_frames = 0;
            inner.active_frames >= inner.config.min_active_frames
                && (frame_ns - inner.first_detection_ns) as f64 >= inner.config.min_duration_ms * 1.0e6
        };
        if !should_promote {
            return;
        }

        let (pitch_index, start_ns, pre_roll_frames, observations) = {
            let mut inner = guard.borrow_mut();
            let pitch_index = inner.pitch_index + 1;
            let start_ns = inner
                .ramp_up_observations
                .first()
                .map(|o| o.t_ns)
                .unwrap_or(inner.first_detection_ns);
            let pre_roll_frames = inner.pre_roll.drain();
            let observations = inner.ramp_up_observations.clone();
            (pitch_index, start_ns, pre_roll_frames, observations)
        };

        let pitch_so_far = PitchData {
            pitch_index,
            start_ns,
            end_ns: start_ns,
            pre_roll_frames,
            observations,
            valid: false,
        };

        let callback_result = {
            let mut inner = guard.borrow_mut();
            inner.callback.on_pitch_start(&pitch_so_far)
        };

        let mut inner = guard.borrow_mut();
        match callback_result {
            Ok(()) => {
                inner.phase = Phase::Active;
                inner.pitch_index = pitch_index;
                inner.active_observations = pitch_so_far.observations;
                inner.gap_frames = 0;
                inner.last_detection_ns = frame_ns;
                inner.log(frame_ns, TrackingEventKind::PromotedToActive { pitch_index });
            }
            Err(reason) => {
                // Roll back: phase reverts to INACTIVE, pitch index is
                // unchanged, ramp-up lists are cleared. Note the drained
                // pre-roll frames are not un-drained; they are simply
                // dropped along with the rejected candidate, same as any
                // other abandoned pitch.
                inner.phase = Phase::Inactive;
                inner.ramp_up_observations.clear();
                inner.active_frames = 0;
                inner.log(frame_ns, TrackingEventKind::CallbackFailedRolledBack { reason });
            }
        }
    }

    fn advance_active_gap(&self, frame_ns: i64) {
        // Held for the whole transition, same reasoning as
        // `advance_ramp_up`: the snapshot of `active_observations` below
        // and its `.clear()` at the end must not straddle a window where a
        // concurrent `add_observation` could slip in and then be wiped.
        let guard = self.inner.lock();

        let should_finalize = {
            let mut inner = guard.borrow_mut();
            inner.gap_frames += 1;
            inner.gap_frames >= inner.config.end_gap_frames
        };
        if !should_finalize {
            return;
        }

        let (pitch_index, start_ns, end_ns, observations, min_observations, min_duration_ms) = {
            let inner = guard.borrow();
            (
                inner.pitch_index,
                inner
                    .active_observations
                    .first()
                    .map(|o| o.t_ns)
                    .unwrap_or(inner.first_detection_ns),
                inner.last_detection_ns,
                inner.active_observations.clone(),
                inner.config.min_observations,
                inner.config.min_duration_ms,
            )
        };

        let valid = observations.len() >= min_observations
            && (end_ns - start_ns) as f64 >= min_duration_ms * 1.0e6;

        if valid {
            let pitch_data = PitchData {
                pitch_index,
                start_ns,
                end_ns,
                pre_roll_frames: PerCameraFrames::default(),
                observations,
                valid: true,
            };
            let callback_result = {
                let mut inner = guard.borrow_mut();
                inner.callback.on_pitch_end(pitch_data)
            };
            let mut inner = guard.borrow_mut();
            match callback_result {
                Ok(()) => {
                    inner.log(frame_ns, TrackingEventKind::Finalized { pitch_index, accepted: true });
                }
                Err(reason) => {
                    inner.log(frame_ns, TrackingEventKind::CallbackFailedRolledBack { reason });
                }
            }
        } else {
            let mut inner = guard.borrow_mut();
            inner.log(
                frame_ns,
                TrackingEventKind::RejectedPitch {
                    reason: format!(
                        "observations={} (need {}), duration_ns={} (need {})",
                        observations.len(),
                        min_observations,
                        end_ns - start_ns,
                        (min_duration_ms * 1.0e6) as i64
                    ),
                },
            );
        }

        let mut inner = guard.borrow_mut();
        inner.phase = Phase::Inactive;
        inner.active_frames = 0;
        inner.gap_frames = 0;
        inner.active_observations.clear();
    }

    /// Current phase name, for observability. Not part of the state
    /// machine's decision logic.
    pub fn phase_name(&self) -> &'static str {
        let guard = self.inner.lock();
        let phase = guard.borrow().phase;
        match phase {
            Phase::Inactive => "INACTIVE",
            Phase::RampUp => "RAMP_UP",
            Phase::Active => "ACTIVE",
        }
    }

    pub fn pitch_index(&self) -> u32 {
        self.inner.lock().borrow().pitch_index
    }

    /// Snapshot of the bounded event log, oldest first.
    pub fn events(&self) -> Vec<TrackingEvent> {
        self.inner.lock().borrow().events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::CameraSide;
    use std::sync::{Arc, Mutex};

    fn cfg() -> TrackingConfig {
        TrackingConfig {
            min_active_frames: 5,
            end_gap_frames: 10,
            min_observations: 3,
            min_duration_ms: 100.0,
            pre_roll_ms: 500.0,
            post_roll_ms: 500.0,
            use_plate_gate: false,
        }
    }

    const FRAME_PERIOD_NS: i64 = 33_333_333;

    struct RecordingCallback {
        starts: Arc<Mutex<Vec<PitchData>>>,
        ends: Arc<Mutex<Vec<PitchData>>>,
    }

    impl PitchCallback for RecordingCallback {
        fn on_pitch_start(&mut self, data: &PitchData) -> Result<(), String> {
            self.starts.lock().unwrap().push(data.clone_for_test());
            Ok(())
        }
        fn on_pitch_end(&mut self, data: PitchData) -> Result<(), String> {
            self.ends.lock().unwrap().push(data);
            Ok(())
        }
    }

    // PitchData has no Clone derive (observations can be large); tests need
    // a cheap snapshot, so this helper builds one from the borrowed fields
    // actually used by assertions.
    trait CloneForTest {
        fn clone_for_test(&self) -> PitchData;
    }
    impl CloneForTest for PitchData {
        fn clone_for_test(&self) -> PitchData {
            PitchData {
                pitch_index: self.pitch_index,
                start_ns: self.start_ns,
                end_ns: self.end_ns,
                pre_roll_frames: PerCameraFrames {
                    left: self.pre_roll_frames.left.clone(),
                    right: self.pre_roll_frames.right.clone(),
                },
                observations: self.observations.clone(),
                valid: self.valid,
            }
        }
    }

    fn obs(t_ns: i64, z: f64) -> StereoObservation {
        StereoObservation {
            t_ns,
            left_px: (0.0, 0.0),
            right_px: (0.0, 0.0),
            point_ft: (0.0, 0.0, z),
            covariance: None,
            quality: 1.0,
            confidence: 1.0,
        }
    }

    fn machine() -> (PitchStateMachine, Arc<Mutex<Vec<PitchData>>>, Arc<Mutex<Vec<PitchData>>>) {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let ends = Arc::new(Mutex::new(Vec::new()));
        let callback = RecordingCallback {
            starts: starts.clone(),
            ends: ends.clone(),
        };
        let sm = PitchStateMachine::new(cfg(), 30.0, Box::new(callback));
        (sm, starts, ends)
    }

    #[test]
    fn scenario_1_false_trigger_rejection() {
        let (sm, starts, ends) = machine();
        for k in 0..3 {
            sm.update(k * FRAME_PERIOD_NS, 1, 0, 0);
        }
        for k in 3..15 {
            sm.update(k * FRAME_PERIOD_NS, 0, 0, 0);
        }
        assert!(starts.lock().unwrap().is_empty());
        assert!(ends.lock().unwrap().is_empty());
        assert_eq!(sm.pitch_index(), 0);
    }

    #[test]
    fn scenario_2_minimum_valid_pitch() {
        let (sm, starts, ends) = machine();
        for k in 0..5 {
            sm.update(k * FRAME_PERIOD_NS, 1, 0, 0);
            sm.add_observation(obs(k * FRAME_PERIOD_NS, 20.0 - k as f64));
        }
        for k in 5..15 {
            sm.update(k * FRAME_PERIOD_NS, 0, 0, 0);
        }
        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(starts.lock().unwrap()[0].pitch_index, 1);
        let ends = ends.lock().unwrap();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].observations.len(), 5);
        assert_eq!(ends[0].start_ns, 0);
        assert_eq!(ends[0].end_ns, 4 * FRAME_PERIOD_NS);
    }

    #[test]
    fn scenario_3_ramp_up_observations_all_retained() {
        let (sm, _starts, ends) = machine();
        for k in 0..21 {
            sm.update(k * FRAME_PERIOD_NS, 1, 0, 0);
            sm.add_observation(obs(k * FRAME_PERIOD_NS, 20.0));
        }
        for k in 21..31 {
            sm.update(k * FRAME_PERIOD_NS, 0, 0, 0);
        }
        let ends = ends.lock().unwrap();
        assert_eq!(ends[0].observations.len(), 21);
        assert!(ends[0].observations.windows(2).all(|w| w[0].t_ns < w[1].t_ns));
    }

    #[test]
    fn scenario_4_pre_roll_correctness() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let ends = Arc::new(Mutex::new(Vec::new()));
        let callback = RecordingCallback {
            starts: starts.clone(),
            ends: ends.clone(),
        };
        let mut tracking_cfg = cfg();
        tracking_cfg.pre_roll_ms = 330.0; // 330ms at 30fps -> capacity 10
        let sm = PitchStateMachine::new(tracking_cfg, 30.0, Box::new(callback));
        for k in 0..50 {
            sm.buffer_frame(Frame {
                camera: CameraSide::Left,
                serial: "L".into(),
                t_capture_monotonic_ns: k as i64 * FRAME_PERIOD_NS,
                frame_index: k,
                width: 4,
                height: 4,
                pixel_format: pitch_types::PixelFormat::Gray8,
                data: vec![0u8; 16].into(),
            });
        }
        for k in 50..55 {
            sm.update((k as i64) * FRAME_PERIOD_NS, 1, 0, 0);
            sm.add_observation(obs((k as i64) * FRAME_PERIOD_NS, 20.0));
        }
        let starts = starts.lock().unwrap();
        assert_eq!(starts[0].pre_roll_frames.left.len(), 10);
        assert_eq!(starts[0].pre_roll_frames.left[0].frame_index, 40);
    }

    #[test]
    fn boundary_gap_just_under_threshold_does_not_split_pitch() {
        let (sm, starts, ends) = machine();
        for k in 0..5 {
            sm.update(k * FRAME_PERIOD_NS, 1, 0, 0);
            sm.add_observation(obs(k * FRAME_PERIOD_NS, 20.0));
        }
        assert_eq!(starts.lock().unwrap().len(), 1);
        for k in 5..14 {
            // 9 inactive frames: end_gap_frames - 1
            sm.update(k * FRAME_PERIOD_NS, 0, 0, 0);
        }
        sm.update(14 * FRAME_PERIOD_NS, 1, 0, 0);
        sm.add_observation(obs(14 * FRAME_PERIOD_NS, 19.0));
        for k in 15..25 {
            sm.update(k * FRAME_PERIOD_NS, 0, 0, 0);
        }
        assert_eq!(starts.lock().unwrap().len(), 1, "must not split into two pitches");
        assert_eq!(ends.lock().unwrap().len(), 1);
        assert_eq!(ends.lock().unwrap()[0].observations.len(), 6);
    }

    #[test]
    fn callback_failure_on_start_rolls_back_phase_and_pitch_index() {
        struct FailingCallback;
        impl PitchCallback for FailingCallback {
            fn on_pitch_start(&mut self, _data: &PitchData) -> Result<(), String> {
                Err("rejected by test".into())
            }
            fn on_pitch_end(&mut self, _data: PitchData) -> Result<(), String> {
                Ok(())
            }
        }
        let sm = PitchStateMachine::new(cfg(), 30.0, Box::new(FailingCallback));
        for k in 0..5 {
            sm.update(k * FRAME_PERIOD_NS, 1, 0, 0);
        }
        assert_eq!(sm.phase_name(), "INACTIVE");
        assert_eq!(sm.pitch_index(), 0);
    }

    #[test]
    fn update_config_rejected_outside_inactive() {
        let (sm, _starts, _ends) = machine();
        sm.update(0, 1, 0, 0);
        assert_eq!(sm.phase_name(), "RAMP_UP");
        assert!(sm.update_config(cfg(), 30.0).is_err());
    }
}
