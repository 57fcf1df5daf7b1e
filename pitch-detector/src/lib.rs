//! Per-frame ball detection.
//!
//! Grounded on `image-tracker`'s split between a background-subtraction
//! pass and a downstream blob filter, generalized to a `Detector` trait so
//! the classical and ML backends are interchangeable behind configuration
//! (`detector.type`).

mod blob;
mod classical;
mod error;
#[cfg(feature = "ml")]
mod ml;

pub use classical::ClassicalDetector;
pub use error::{Error, Result};
#[cfg(feature = "ml")]
pub use ml::MlDetector;

use pitch_types::{Detection, Frame, RoiPolygon};

/// `detect(frame) -> [Detection; 0..N]`, called once per frame delivered
/// from the Capture Queue. Implementations preserve
/// per-camera ordering by processing frames strictly in increasing
/// `frame_index` order; the trait itself is `&mut self` so a classical
/// backend's background model and velocity history can live on the
/// instance rather than a shared lock.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame, roi: &RoiPolygon) -> Result<Vec<Detection>>;
}

/// Builds the configured detector backend. The `Ml` variant requires the
/// `ml` feature; without it, selecting `detector.type = "ml"` is a
/// configuration error surfaced at startup rather than a silent fallback.
pub fn build_detector(cfg: &pitch_config::DetectorConfig) -> Result<Box<dyn Detector>> {
    match cfg.detector_type {
        pitch_config::DetectorType::Classical => Ok(Box::new(ClassicalDetector::new(cfg))),
        pitch_config::DetectorType::Ml => {
            #[cfg(feature = "ml")]
            {
                Ok(Box::new(MlDetector::new(cfg)?))
            }
            #[cfg(not(feature = "ml"))]
            {
                Err(Error::Ml(
                    "detector.type = ml requires building with the `ml` feature".into(),
                ))
            }
        }
    }
}
