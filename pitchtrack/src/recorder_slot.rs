//! The one pitch recorder shared between the callback (which opens and
//! marks it ended) and the detector/matcher threads (which keep streaming
//! frames and observations into it through its post-roll tail). See spec
//! §4.6: a pitch clip keeps recording for `post_roll_ms` after the state
//! machine already considers the pitch over.

use parking_lot::Mutex;
use pitch_recorder::PitchRecorder;
use pitch_types::PitchSummary;
use std::sync::Arc;

pub enum RecorderState {
    /// The pitch is still ACTIVE; `on_pitch_end` hasn't fired yet.
    Writing { recorder: PitchRecorder, pitch_id: String },
    /// `on_pitch_end` fired; draining `post_roll_ms` of trailing frames
    /// before the clip can be closed with its already-computed summary.
    Draining {
        recorder: PitchRecorder,
        pitch_id: String,
        summary: PitchSummary,
    },
}

impl RecorderState {
    pub fn recorder_mut(&mut self) -> &mut PitchRecorder {
        match self {
            RecorderState::Writing { recorder, .. } => recorder,
            RecorderState::Draining { recorder, .. } => recorder,
        }
    }

    fn into_parts(self) -> (PitchRecorder, String, Option<PitchSummary>) {
        match self {
            RecorderState::Writing { recorder, pitch_id } => (recorder, pitch_id, None),
            RecorderState::Draining {
                recorder,
                pitch_id,
                summary,
            } => (recorder, pitch_id, Some(summary)),
        }
    }
}

pub type RecorderSlot = Arc<Mutex<Option<RecorderState>>>;

/// Closes whatever recorder currently occupies `slot`, unconditionally.
/// Used both for the normal drained-close path and for the edge case where
/// a new pitch starts before the previous one finished draining. A
/// `Writing` state reaching here (no summary computed yet) can only happen
/// if two pitches overlap, which the state machine's single reentrant lock
/// should prevent; it's logged and the clip is dropped rather than closed
/// with a fabricated summary.
pub fn force_close(slot: &RecorderSlot) {
    let taken = slot.lock().take();
    let Some(state) = taken else { return };
    let (recorder, pitch_id, summary) = state.into_parts();
    let Some(summary) = summary else {
        tracing::warn!(pitch_id = %pitch_id, "dropping recorder with no summary available to close it");
        return;
    };
    if let Err(e) = recorder.close(&pitch_id, &summary) {
        tracing::error!(pitch_id = %pitch_id, error = %e, "failed to close pitch recorder");
    }
}

/// Closes the recorder in `slot` if it's in `Draining` state and its
/// `post_roll_ms` window has elapsed as of `now_ns`. Called by the
/// detector/matcher threads on every frame/tick so the post-roll tail gets
/// serviced even while the state machine itself is back in INACTIVE.
pub fn drain_if_closeable(slot: &RecorderSlot, now_ns: i64) {
    let ready = {
        let guard = slot.lock();
        matches!(
            guard.as_ref(),
            Some(RecorderState::Draining { recorder, .. }) if recorder.should_close(now_ns)
        )
    };
    if ready {
        force_close(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_config::RecordingConfig;
    use pitch_types::{PerCameraFrames, TrajectoryDiagnostics};

    fn recording_cfg(output_dir: &std::path::Path) -> RecordingConfig {
        RecordingConfig {
            output_dir: output_dir.to_path_buf(),
            save_detections: true,
            save_observations: true,
            save_training_frames: false,
            frame_save_interval: 1,
        }
    }

    fn summary(pitch_id: &str) -> PitchSummary {
        PitchSummary {
            pitch_id: pitch_id.to_string(),
            t_start_ns: 0,
            t_end_ns: 200_000_000,
            plate_crossing_xyz_ft: [0.0, 2.5, 0.0],
            plate_crossing_t_ns: 150_000_000,
            release_point_ft: [0.0, 6.0, 50.0],
            run_in: 1.0,
            rise_in: 2.0,
            measured_speed_mph: 90.0,
            rotation_rpm: None,
            model: "drag".to_string(),
            expected_error_ft: 0.1,
            confidence: 0.9,
            is_strike: true,
            zone_row: 1,
            zone_col: 1,
            diagnostics: TrajectoryDiagnostics::default(),
        }
    }

    fn open_recorder(dir: &std::path::Path, pitch_id: &str) -> PitchRecorder {
        PitchRecorder::open(
            dir,
            pitch_id,
            1,
            0,
            64,
            48,
            30.0,
            &PerCameraFrames::default(),
            &recording_cfg(dir),
        )
        .unwrap()
    }

    #[test]
    fn drain_if_closeable_waits_for_post_roll_then_closes() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = open_recorder(dir.path(), "pitch-001");
        recorder.arm_post_roll(500.0);
        recorder.mark_ended(0);
        let slot: RecorderSlot = Arc::new(Mutex::new(Some(RecorderState::Draining {
            recorder,
            pitch_id: "pitch-001".to_string(),
            summary: summary("pitch-001"),
        })));

        drain_if_closeable(&slot, 100_000_000);
        assert!(slot.lock().is_some(), "post-roll window hasn't elapsed yet");

        drain_if_closeable(&slot, 600_000_000);
        assert!(slot.lock().is_none(), "post-roll window has elapsed");
        assert!(dir.path().join("pitch-001").exists());
    }

    #[test]
    fn force_close_drops_writing_state_without_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = open_recorder(dir.path(), "pitch-002");
        let slot: RecorderSlot = Arc::new(Mutex::new(Some(RecorderState::Writing {
            recorder,
            pitch_id: "pitch-002".to_string(),
        })));

        force_close(&slot);
        assert!(slot.lock().is_none());
        assert!(!dir.path().join("pitch-002").exists());
    }
}
