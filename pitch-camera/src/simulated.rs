use crate::{Camera, CameraInfo, CameraModule, Error, Result};
use pitch_types::{CameraSide, Frame, PixelFormat};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Deterministic, host-clock-driven frame generation for a simulated
/// camera, used in place of a real SDK-backed `Camera` implementation. This
/// core has no physical-hardware dependency in scope, so rather
/// than fabricate bindings to an unverified vendor SDK, the reference
/// backend is this simulator; a real backend would implement the same
/// [`Camera`] trait behind a vendor-specific module.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCameraScript {
    /// Frame indices (0-based) at which `read_frame` should return a
    /// transient error instead of a frame.
    pub transient_error_frames: BTreeSet<u64>,
}

pub struct SimulatedCamera {
    label: CameraSide,
    serial: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    start: Instant,
    next_frame_index: u64,
    script: SimulatedCameraScript,
}

impl SimulatedCamera {
    pub fn new(label: CameraSide, serial: impl Into<String>) -> Self {
        Self {
            label,
            serial: serial.into(),
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Gray8,
            start: Instant::now(),
            next_frame_index: 0,
            script: SimulatedCameraScript::default(),
        }
    }

    pub fn with_script(mut self, script: SimulatedCameraScript) -> Self {
        self.script = script;
        self
    }
}

impl CameraInfo for SimulatedCamera {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn label(&self) -> &str {
        self.label.as_str()
    }
}

impl Camera for SimulatedCamera {
    fn set_mode(
        &mut self,
        width: u32,
        height: u32,
        fps: f64,
        pixfmt: PixelFormat,
    ) -> Result<()> {
        if width == 0 || height == 0 || fps <= 0.0 {
            return Err(Error::CameraModeUnsupported(format!(
                "{width}x{height}@{fps}"
            )));
        }
        self.width = width;
        self.height = height;
        self.pixel_format = pixfmt;
        Ok(())
    }

    fn set_controls(
        &mut self,
        _exposure_us: Option<u32>,
        _gain: Option<f64>,
        _wb_mode: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    fn read_frame(&mut self, _timeout_ms: u32) -> Result<Frame> {
        let index = self.next_frame_index;
        if self.script.transient_error_frames.contains(&index) {
            self.next_frame_index += 1;
            return Err(Error::CameraReadTransient(format!(
                "injected transient error at frame {index}"
            )));
        }

        let t_capture_monotonic_ns = self.start.elapsed().as_nanos() as i64;
        let len = self.pixel_format.bytes_per_pixel().unwrap_or(1) as usize
            * (self.width * self.height) as usize;
        let data: Arc<[u8]> = vec![0u8; len].into();

        self.next_frame_index += 1;
        Ok(Frame {
            camera: self.label,
            serial: self.serial.clone(),
            t_capture_monotonic_ns,
            frame_index: index,
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            data,
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens [`SimulatedCamera`]s by label/serial. The reference `CameraModule`
/// implementation used wherever this core runs without real hardware
/// (no vendor-SDK dependency is carried); a real backend implements
/// the same [`CameraModule`] trait behind a vendor-specific crate.
#[derive(Debug, Default, Clone)]
pub struct SimulatedCameraModule {
    script: SimulatedCameraScript,
}

impl SimulatedCameraModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: SimulatedCameraScript) -> Self {
        Self { script }
    }
}

impl CameraModule for SimulatedCameraModule {
    type CameraType = SimulatedCamera;

    fn open(&self, label: &str, serial: &str) -> Result<Self::CameraType> {
        let side = match label {
            "left" => CameraSide::Left,
            "right" => CameraSide::Right,
            other => return Err(Error::CameraNotFound(format!("unknown label {other}"))),
        };
        Ok(SimulatedCamera::new(side, serial).with_script(self.script.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_and_timestamp_strictly_increase() {
        let mut cam = SimulatedCamera::new(CameraSide::Left, "SN-1");
        cam.set_mode(64, 48, 30.0, PixelFormat::Gray8).unwrap();
        let f1 = cam.read_frame(100).unwrap();
        let f2 = cam.read_frame(100).unwrap();
        assert_eq!(f2.frame_index, f1.frame_index + 1);
        assert!(f2.t_capture_monotonic_ns > f1.t_capture_monotonic_ns);
    }

    #[test]
    fn injected_transient_error_still_advances_frame_index() {
        let mut script = SimulatedCameraScript::default();
        script.transient_error_frames.insert(1);
        let mut cam = SimulatedCamera::new(CameraSide::Left, "SN-1").with_script(script);
        cam.set_mode(64, 48, 30.0, PixelFormat::Gray8).unwrap();
        assert!(cam.read_frame(100).is_ok());
        assert!(matches!(
            cam.read_frame(100),
            Err(Error::CameraReadTransient(_))
        ));
        assert!(cam.read_frame(100).is_ok());
    }
}
