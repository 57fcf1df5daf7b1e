use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which physical camera a frame or detection came from.
///
/// Kept as an enum rather than a bare string so the rest of the pipeline
/// can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSide {
    Left,
    Right,
}

impl CameraSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraSide::Left => "left",
            CameraSide::Right => "right",
        }
    }

    pub fn other(&self) -> CameraSide {
        match self {
            CameraSide::Left => CameraSide::Right,
            CameraSide::Right => CameraSide::Left,
        }
    }
}

impl std::fmt::Display for CameraSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel format tag carried on a [`Frame`], set from `camera.pixfmt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Yuy2,
    Mjpg,
    Rgb8,
}

impl PixelFormat {
    /// Bytes per pixel for the formats we treat as densely packed.
    /// `Mjpg` frames are compressed and have no fixed bytes-per-pixel.
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuy2 => Some(2),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Mjpg => None,
        }
    }
}

/// A single captured image plus its provenance.
///
/// `data` is `Arc<[u8]>` rather than `Vec<u8>` so the one documented sharing
/// point (the pre-roll ring clone, and the recorder's clone of a frame for a
/// currently-open pitch) is a refcount bump rather than a pixel copy; see
/// DESIGN.md for the rationale.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera: CameraSide,
    pub serial: String,
    /// Host monotonic clock, nanoseconds. Strictly increasing per camera.
    pub t_capture_monotonic_ns: i64,
    /// Strictly increasing per camera, starting at 0 at capture start.
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Arc<[u8]>,
}

impl Frame {
    /// Expected byte length for a densely packed, non-compressed frame.
    /// Returns `None` for `Mjpg`, whose length varies per frame.
    pub fn expected_len(&self) -> Option<usize> {
        self.pixel_format
            .bytes_per_pixel()
            .map(|bpp| (self.width * self.height * bpp) as usize)
    }
}

/// Which detector backend/mode produced a [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorMode {
    ClassicalA,
    ClassicalB,
    Ml,
}

/// A single candidate ball location in one camera's image. Copies
/// `frame_index`/`timestamp` rather than borrowing the `Frame` so a
/// `Detection` can outlive it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    pub camera: CameraSide,
    pub frame_index: u64,
    pub t_capture_monotonic_ns: i64,
    pub u_px: f64,
    pub v_px: f64,
    pub radius_px: f64,
    /// In [0, 1].
    pub confidence: f64,
    pub mode: DetectorMode,
}

impl Detection {
    /// True if `(u_px, v_px)` lies within a `width`x`height` image.
    pub fn in_bounds(&self, width: u32, height: u32) -> bool {
        self.u_px >= 0.0
            && self.v_px >= 0.0
            && self.u_px < width as f64
            && self.v_px < height as f64
    }
}
