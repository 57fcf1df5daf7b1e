use pitch_types::PitchData;

/// Receives pitch-boundary notifications from the [`crate::PitchStateMachine`].
///
/// Replaces dynamic callback registration (a list of closures registered at
/// runtime) with a single trait object, a static dispatch point rather than
/// an ad hoc callback list; the orchestrator constructs one implementation
/// (wiring the Recorder and Metrics Analyzer) and hands it to the state
/// machine at construction.
pub trait PitchCallback: Send {
    /// Fired once, with the lock held, at the RAMP_UP -> ACTIVE transition.
    /// `data` is the in-progress `PitchData` (observations so far,
    /// `valid: false`). An `Err` return rolls the transition back to
    /// INACTIVE.
    fn on_pitch_start(&mut self, data: &PitchData) -> Result<(), String>;

    /// Fired once, with the lock held, when a pitch is finalized and
    /// accepted. An `Err` return causes the pitch to be treated as
    /// rejected (logged, no further propagation).
    fn on_pitch_end(&mut self, data: PitchData) -> Result<(), String>;
}

/// No-op callback, useful for tests and for running the pipeline with
/// recording disabled.
pub struct NoopPitchCallback;

impl PitchCallback for NoopPitchCallback {
    fn on_pitch_start(&mut self, _data: &PitchData) -> Result<(), String> {
        Ok(())
    }

    fn on_pitch_end(&mut self, _data: PitchData) -> Result<(), String> {
        Ok(())
    }
}
