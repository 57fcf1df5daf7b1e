use crate::blob::extract_blobs;
use crate::error::{Error, Result};
use crate::Detector;
use pitch_config::ClassicalMode;
use pitch_types::{CameraSide, Detection, DetectorMode, Frame, PixelFormat, RoiPolygon};

/// Number of frames over which the background model ramps from "seeded with
/// the first frame" to its steady-state update rate. Mirrors the teacher's
/// `NUM_BG_START_IMAGES` in `image-tracker/src/background_model.rs`, adapted
/// from a channel-driven worker-thread update to a direct in-place one.
const BG_RAMP_FRAMES: u32 = 20;
const BG_STEADY_STATE_SHIFT: u32 = 7; // alpha = 1/128 once ramped up

#[derive(Debug, Clone, Copy, Default)]
struct TrackedPoint {
    u: f64,
    v: f64,
    t_ns: i64,
}

/// Background-subtraction + blob-filter detector. Implements both classical
/// modes: mode A is plain frame-difference, mode B adds a simple
/// gradient-magnitude term so busy/textured backgrounds still yield a
/// clean mask.
pub struct ClassicalDetector {
    mode: ClassicalMode,
    area_min: f64,
    area_max: f64,
    circularity_threshold: f64,
    aspect_ratio_max: f64,
    velocity_consistency_px: f64,
    diff_threshold: u8,
    background: Option<Vec<u8>>,
    bg_width: u32,
    bg_height: u32,
    frames_seen: u32,
    last_points: [Option<TrackedPoint>; 2],
}

impl ClassicalDetector {
    pub fn new(cfg: &pitch_config::DetectorConfig) -> Self {
        Self {
            mode: cfg.mode,
            area_min: cfg.area_min,
            area_max: cfg.area_max,
            circularity_threshold: cfg.circularity_threshold,
            aspect_ratio_max: cfg.aspect_ratio_max,
            velocity_consistency_px: cfg.velocity_consistency_px,
            diff_threshold: 25,
            background: None,
            bg_width: 0,
            bg_height: 0,
            frames_seen: 0,
            last_points: [None, None],
        }
    }

    fn luma(frame: &Frame) -> Result<Vec<u8>> {
        match frame.pixel_format {
            PixelFormat::Gray8 => Ok(frame.data.to_vec()),
            PixelFormat::Rgb8 => {
                let n = (frame.width * frame.height) as usize;
                let mut out = Vec::with_capacity(n);
                for px in frame.data.chunks_exact(3) {
                    let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                    out.push(((r * 299 + g * 587 + b * 114) / 1000) as u8);
                }
                Ok(out)
            }
            other => Err(Error::UnsupportedPixelFormat(other)),
        }
    }

    /// Updates the running background estimate in place, matching spec
    /// §4.3's "the update is done in-place on an 8-bit buffer". Uses a fast
    /// integer IIR filter: during the first `BG_RAMP_FRAMES` frames the
    /// model tracks the input tightly (alpha ~ 1/n), then settles to a slow
    /// steady-state rate so a stationary ball doesn't get absorbed into the
    /// background.
    fn update_background(&mut self, luma: &[u8]) {
        let bg = self.background.as_mut().expect("background allocated");
        let shift = if self.frames_seen < BG_RAMP_FRAMES {
            // log2-ish ramp: frame 0 -> shift 0 (replace), frame 19 -> shift 4
            (self.frames_seen / 4).min(4)
        } else {
            BG_STEADY_STATE_SHIFT
        };
        if shift == 0 {
            bg.copy_from_slice(luma);
        } else {
            for (b, &p) in bg.iter_mut().zip(luma.iter()) {
                let delta = p as i32 - *b as i32;
                *b = (*b as i32 + (delta >> shift)) as u8;
            }
        }
        self.frames_seen += 1;
    }

    fn foreground_mask(&self, luma: &[u8], width: usize, mode: ClassicalMode) -> Vec<bool> {
        let bg = self.background.as_ref().expect("background allocated");
        match mode {
            ClassicalMode::A => luma
                .iter()
                .zip(bg.iter())
                .map(|(&p, &b)| (p as i32 - b as i32).unsigned_abs() as u8 > self.diff_threshold)
                .collect(),
            ClassicalMode::B => {
                let height = luma.len() / width;
                let mut mask = vec![false; luma.len()];
                for y in 0..height {
                    for x in 0..width {
                        let idx = y * width + x;
                        let diff =
                            (luma[idx] as i32 - bg[idx] as i32).unsigned_abs() as u8;
                        if diff > self.diff_threshold {
                            mask[idx] = true;
                            continue;
                        }
                        // Gradient magnitude term catches edges of objects
                        // that happen to match the background's mean
                        // brightness but not its local texture.
                        if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
                            continue;
                        }
                        let gx = luma[idx + 1] as i32 - luma[idx - 1] as i32;
                        let gy = luma[idx + width] as i32 - luma[idx - width] as i32;
                        let grad = ((gx * gx + gy * gy) as f64).sqrt();
                        if grad > (self.diff_threshold as f64) * 2.5 && diff > self.diff_threshold / 2
                        {
                            mask[idx] = true;
                        }
                    }
                }
                mask
            }
        }
    }
}

impl Detector for ClassicalDetector {
    fn detect(&mut self, frame: &Frame, roi: &RoiPolygon) -> Result<Vec<Detection>> {
        if let Some(bg) = &self.background {
            if frame.width != self.bg_width || frame.height != self.bg_height {
                return Err(Error::DimensionMismatch {
                    width: frame.width,
                    height: frame.height,
                    bg_width: self.bg_width,
                    bg_height: self.bg_height,
                });
            }
            let _ = bg;
        } else {
            self.bg_width = frame.width;
            self.bg_height = frame.height;
            self.background = Some(vec![0u8; (frame.width * frame.height) as usize]);
        }

        let luma = Self::luma(frame)?;
        if self.frames_seen == 0 {
            self.background.as_mut().unwrap().copy_from_slice(&luma);
            self.frames_seen = 1;
            return Ok(Vec::new());
        }

        let (x0, y0, x1, y1) = roi.bounding_rect();
        let x0 = x0.max(0.0).floor() as usize;
        let y0 = y0.max(0.0).floor() as usize;
        let x1 = x1.min(frame.width as f64).ceil() as usize;
        let y1 = y1.min(frame.height as f64).ceil() as usize;
        if x1 <= x0 || y1 <= y0 {
            self.update_background(&luma);
            return Ok(Vec::new());
        }
        let crop_w = x1 - x0;
        let crop_h = y1 - y0;

        let full_mask = self.foreground_mask(&luma, frame.width as usize, self.mode);
        let mut crop_mask = vec![false; crop_w * crop_h];
        for y in 0..crop_h {
            let src_row = (y0 + y) * frame.width as usize;
            let dst_row = y * crop_w;
            crop_mask[dst_row..dst_row + crop_w]
                .copy_from_slice(&full_mask[src_row + x0..src_row + x1]);
        }

        let blobs = extract_blobs(&crop_mask, crop_w, crop_h, x0 as f64, y0 as f64);
        let mode_tag = match self.mode {
            ClassicalMode::A => DetectorMode::ClassicalA,
            ClassicalMode::B => DetectorMode::ClassicalB,
        };

        let mut detections = Vec::new();
        for blob in blobs {
            if !roi.contains_point(blob.centroid_u, blob.centroid_v) {
                continue;
            }
            if (blob.area_px as f64) < self.area_min || (blob.area_px as f64) > self.area_max {
                continue;
            }
            let circularity = blob.circularity();
            if circularity < self.circularity_threshold {
                continue;
            }
            if blob.aspect_ratio() > self.aspect_ratio_max {
                continue;
            }
            if !self.passes_velocity_gate(blob.centroid_u, blob.centroid_v, frame.t_capture_monotonic_ns) {
                continue;
            }
            let radius_px = (blob.area_px as f64 / std::f64::consts::PI).sqrt();
            let confidence = circularity.clamp(0.0, 1.0);
            detections.push(Detection {
                camera: frame.camera,
                frame_index: frame.frame_index,
                t_capture_monotonic_ns: frame.t_capture_monotonic_ns,
                u_px: blob.centroid_u,
                v_px: blob.centroid_v,
                radius_px,
                confidence,
                mode: mode_tag,
            });
        }
        detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

        if let Some(best) = detections.first() {
            self.push_tracked_point(best.u_px, best.v_px, frame.t_capture_monotonic_ns);
        }
        self.update_background(&luma);
        Ok(detections)
    }
}

impl ClassicalDetector {
    fn push_tracked_point(&mut self, u: f64, v: f64, t_ns: i64) {
        self.last_points[0] = self.last_points[1];
        self.last_points[1] = Some(TrackedPoint { u, v, t_ns });
    }

    /// Rejects a candidate whose implied pixel velocity differs from the
    /// most recent observed velocity by more than
    /// `velocity_consistency_px` (interpreted as pixels of velocity-vector
    /// error, not an absolute speed bound). No-op until two prior points
    /// are on record.
    fn passes_velocity_gate(&self, u: f64, v: f64, t_ns: i64) -> bool {
        let (Some(p1), Some(p0)) = (self.last_points[1], self.last_points[0]) else {
            return true;
        };
        let dt_prev = (p1.t_ns - p0.t_ns) as f64;
        let dt_new = (t_ns - p1.t_ns) as f64;
        if dt_prev <= 0.0 || dt_new <= 0.0 {
            return true;
        }
        let prev_vel = ((p1.u - p0.u) / dt_prev, (p1.v - p0.v) / dt_prev);
        let new_vel = ((u - p1.u) / dt_new, (v - p1.v) / dt_new);
        let dvx = (new_vel.0 - prev_vel.0) * 1.0e9; // px/s
        let dvy = (new_vel.1 - prev_vel.1) * 1.0e9;
        (dvx * dvx + dvy * dvy).sqrt() <= self.velocity_consistency_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cfg() -> pitch_config::DetectorConfig {
        pitch_config::DetectorConfig {
            area_min: 2.0,
            area_max: 500.0,
            circularity_threshold: 0.3,
            ..Default::default()
        }
    }

    fn gray_frame(width: u32, height: u32, pixels: Vec<u8>, frame_index: u64, t_ns: i64) -> Frame {
        Frame {
            camera: CameraSide::Left,
            serial: "SN".into(),
            t_capture_monotonic_ns: t_ns,
            frame_index,
            width,
            height,
            pixel_format: PixelFormat::Gray8,
            data: Arc::from(pixels.into_boxed_slice()),
        }
    }

    fn draw_square(width: u32, height: u32, bg: u8, fg: u8, cx: u32, cy: u32, half: u32) -> Vec<u8> {
        let mut buf = vec![bg; (width * height) as usize];
        for y in cy.saturating_sub(half)..=(cy + half).min(height - 1) {
            for x in cx.saturating_sub(half)..=(cx + half).min(width - 1) {
                buf[(y * width + x) as usize] = fg;
            }
        }
        buf
    }

    #[test]
    fn first_frame_seeds_background_and_emits_nothing() {
        let mut det = ClassicalDetector::new(&cfg());
        let roi = RoiPolygon::full_frame(32, 32);
        let frame = gray_frame(32, 32, vec![50u8; 32 * 32], 0, 0);
        let out = det.detect(&frame, &roi).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn moving_bright_blob_is_detected_after_background_seeded() {
        let mut det = ClassicalDetector::new(&cfg());
        let roi = RoiPolygon::full_frame(32, 32);
        let bg_frame = gray_frame(32, 32, vec![50u8; 32 * 32], 0, 0);
        det.detect(&bg_frame, &roi).unwrap();

        let fg = draw_square(32, 32, 50, 220, 16, 16, 2);
        let frame = gray_frame(32, 32, fg, 1, 1_000_000);
        let detections = det.detect(&frame, &roi).unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].u_px - 16.0).abs() < 1.0);
        assert!((detections[0].v_px - 16.0).abs() < 1.0);
    }

    #[test]
    fn blob_outside_roi_is_rejected() {
        let mut det = ClassicalDetector::new(&cfg());
        let roi = RoiPolygon::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let bg_frame = gray_frame(32, 32, vec![50u8; 32 * 32], 0, 0);
        det.detect(&bg_frame, &roi).unwrap();

        let fg = draw_square(32, 32, 50, 220, 25, 25, 2);
        let frame = gray_frame(32, 32, fg, 1, 1_000_000);
        let detections = det.detect(&frame, &roi).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn undersized_blob_fails_area_filter() {
        let mut cfg = cfg();
        cfg.area_min = 100.0;
        let mut det = ClassicalDetector::new(&cfg);
        let roi = RoiPolygon::full_frame(32, 32);
        let bg_frame = gray_frame(32, 32, vec![50u8; 32 * 32], 0, 0);
        det.detect(&bg_frame, &roi).unwrap();

        let fg = draw_square(32, 32, 50, 220, 16, 16, 1);
        let frame = gray_frame(32, 32, fg, 1, 1_000_000);
        let detections = det.detect(&frame, &roi).unwrap();
        assert!(detections.is_empty());
    }
}
