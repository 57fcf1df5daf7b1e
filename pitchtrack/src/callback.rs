//! Wires the pitch state machine's boundary callback to the recorder and
//! the metrics analyzer: the orchestrator builds one implementation and
//! hands it to [`pitch_tracking::PitchStateMachine`] at construction,
//! rather than registering callbacks dynamically.

use crate::recorder_slot::{self, RecorderSlot, RecorderState};
use crate::stats::StatsCollector;
use parking_lot::Mutex;
use pitch_config::{MetricsConfig, RecordingConfig};
use pitch_recorder::PitchRecorder;
use pitch_tracking::PitchCallback;
use pitch_types::{PitchData, PitchSummary, StrikeZone};
use std::path::PathBuf;
use std::sync::Arc;

/// `on_pitch_start` opens a [`PitchRecorder`] under the currently armed
/// session directory (a no-op, non-erroring skip if no session is armed:
/// tracking can run with recording disabled). `on_pitch_end` runs the
/// metrics analyzer and hands the recorder, still open, to
/// [`recorder_slot`] as `Draining` — the detector/matcher threads keep
/// streaming its `post_roll_ms` tail and close it once that window elapses.
pub struct OrchestratorCallback {
    session_id: Arc<Mutex<Option<String>>>,
    session_dir: Arc<Mutex<Option<PathBuf>>>,
    recorder_slot: RecorderSlot,
    pending_summaries: Arc<Mutex<Vec<PitchSummary>>>,
    stats: Arc<StatsCollector>,
    recording_cfg: RecordingConfig,
    metrics_cfg: MetricsConfig,
    strike_zone: StrikeZone,
    width: u32,
    height: u32,
    fps: f64,
    post_roll_ms: f64,
}

impl OrchestratorCallback {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Arc<Mutex<Option<String>>>,
        session_dir: Arc<Mutex<Option<PathBuf>>>,
        recorder_slot: RecorderSlot,
        pending_summaries: Arc<Mutex<Vec<PitchSummary>>>,
        stats: Arc<StatsCollector>,
        recording_cfg: RecordingConfig,
        metrics_cfg: MetricsConfig,
        strike_zone: StrikeZone,
        width: u32,
        height: u32,
        fps: f64,
        post_roll_ms: f64,
    ) -> Self {
        Self {
            session_id,
            session_dir,
            recorder_slot,
            pending_summaries,
            stats,
            recording_cfg,
            metrics_cfg,
            strike_zone,
            width,
            height,
            fps,
            post_roll_ms,
        }
    }

    fn pitch_dir_name(&self, pitch_index: u32, session_id: &str) -> String {
        format!("{session_id}-pitch-{pitch_index:03}")
    }
}

impl PitchCallback for OrchestratorCallback {
    fn on_pitch_start(&mut self, data: &PitchData) -> Result<(), String> {
        self.stats.record_pitch_started();

        // A previous pitch's post-roll tail may still be draining; this
        // pipeline only ever has one pitch ACTIVE at a time, so closing it
        // early here (losing a bit of trailing footage) beats blocking the
        // new pitch's clip on it.
        if self.recorder_slot.lock().is_some() {
            tracing::warn!("previous pitch still draining post-roll at next pitch start; closing it early");
            recorder_slot::force_close(&self.recorder_slot);
        }

        let session_dir = self.session_dir.lock().clone();
        let session_id = self.session_id.lock().clone();
        let (session_dir, session_id) = match (session_dir, session_id) {
            (Some(dir), Some(id)) => (dir, id),
            _ => return Ok(()),
        };

        let dir_name = self.pitch_dir_name(data.pitch_index, &session_id);
        let mut recorder = PitchRecorder::open(
            &session_dir,
            &dir_name,
            data.pitch_index,
            data.start_ns,
            self.width,
            self.height,
            self.fps,
            &data.pre_roll_frames,
            &self.recording_cfg,
        )
        .map_err(|e| e.to_string())?;
        recorder.arm_post_roll(self.post_roll_ms);

        *self.recorder_slot.lock() = Some(RecorderState::Writing {
            recorder,
            pitch_id: dir_name,
        });
        Ok(())
    }

    fn on_pitch_end(&mut self, data: PitchData) -> Result<(), String> {
        let session_id = self.session_id.lock().clone();
        let pitch_id = match &session_id {
            Some(id) => self.pitch_dir_name(data.pitch_index, id),
            None => format!("pitch-{:03}", data.pitch_index),
        };

        let summary = pitch_metrics::analyze(&data, &pitch_id, &self.metrics_cfg, &self.strike_zone);

        let mut guard = self.recorder_slot.lock();
        if let Some(RecorderState::Writing { mut recorder, pitch_id }) = guard.take() {
            recorder.mark_ended(data.end_ns);
            if recorder.should_close(data.end_ns) {
                drop(guard);
                if let Err(e) = recorder.close(&pitch_id, &summary) {
                    tracing::error!(pitch_id = %pitch_id, error = %e, "failed to close pitch recorder");
                }
            } else {
                *guard = Some(RecorderState::Draining {
                    recorder,
                    pitch_id,
                    summary: summary.clone(),
                });
            }
        }

        self.pending_summaries.lock().push(summary);
        self.stats.record_pitch_completed();
        Ok(())
    }
}
