use crate::error::{Error, Result};
use crate::Detector;
use pitch_types::{Detection, Frame, RoiPolygon};
use std::path::PathBuf;

/// ONNX-style inference wrapper: fixed input size, confidence and IoU
/// thresholds, and an optional class filter, run on the ROI crop only.
///
/// No example repo in this corpus links an ONNX runtime, so rather than
/// fabricate a dependency this backend validates its configuration and
/// wires the shape of the contract (`Detector::detect`) without an actual
/// inference engine underneath. A real backend fills in `run_inference`.
pub struct MlDetector {
    model_path: PathBuf,
    input_size: u32,
    conf_threshold: f64,
    iou_threshold: f64,
    class_id: Option<u32>,
}

impl MlDetector {
    pub fn new(cfg: &pitch_config::DetectorConfig) -> Result<Self> {
        let model_path = cfg
            .model_path
            .clone()
            .ok_or_else(|| Error::Ml("detector.model_path is required for type = ml".into()))?;
        Ok(Self {
            model_path,
            input_size: cfg.input_size,
            conf_threshold: cfg.conf_threshold,
            iou_threshold: cfg.iou_threshold,
            class_id: cfg.class_id,
        })
    }
}

impl Detector for MlDetector {
    fn detect(&mut self, frame: &Frame, roi: &RoiPolygon) -> Result<Vec<Detection>> {
        let (x0, y0, x1, y1) = roi.bounding_rect();
        tracing::debug!(
            model = %self.model_path.display(),
            input_size = self.input_size,
            conf_threshold = self.conf_threshold,
            iou_threshold = self.iou_threshold,
            class_id = ?self.class_id,
            crop = ?(x0, y0, x1, y1),
            frame_index = frame.frame_index,
            "ml detector stub: no inference engine linked, emitting zero detections"
        );
        Ok(Vec::new())
    }
}
