//! Camera source trait and a deterministic simulated backend.
//!
//! Grounded on `ci2::{CameraModule, Camera, CameraInfo}`: a module that
//! opens cameras by name/serial, and a camera trait for mode/control/read
//! operations.

mod error;
mod reconnect;
mod simulated;

pub use error::{Error, Result};
pub use reconnect::{NoopReconnectPolicy, ReconnectPolicy};
pub use simulated::{SimulatedCamera, SimulatedCameraModule, SimulatedCameraScript};

use pitch_types::PixelFormat;

/// Static identity of a camera, independent of its current open/closed state.
pub trait CameraInfo {
    fn serial(&self) -> &str;
    /// "left" or "right" — the label this source was opened under.
    fn label(&self) -> &str;
}

/// An open camera: `set_mode`, `set_controls`, `read_frame`, `close`.
pub trait Camera: CameraInfo {
    /// Request a capture mode. Implementations validate that the mode they
    /// actually configured matches the request and log a warning if not.
    fn set_mode(&mut self, width: u32, height: u32, fps: f64, pixfmt: PixelFormat)
        -> Result<()>;

    fn set_controls(
        &mut self,
        exposure_us: Option<u32>,
        gain: Option<f64>,
        wb_mode: Option<&str>,
    ) -> Result<()>;

    /// Block for at most `timeout_ms`, returning the next frame.
    ///
    /// On a transient read error, the caller (the capture thread, see
    /// `pitchtrack::orchestrator`) is responsible for the bounded-retry
    /// policy; this method itself never retries.
    fn read_frame(&mut self, timeout_ms: u32) -> Result<pitch_types::Frame>;

    fn close(&mut self) -> Result<()>;
}

/// Opens cameras by serial.
pub trait CameraModule {
    type CameraType: Camera;

    fn open(&self, label: &str, serial: &str) -> Result<Self::CameraType>;
}
