use pitch_types::{CameraSide, Frame, PerCameraFrames};
use std::collections::VecDeque;

/// Bounded per-camera FIFO of buffered frames, continuously populated while
/// capture is active, independent of pitch phase.
///
/// Grounded directly on `strand_cam::post_trigger_buffer::PostTriggerBuffer`:
/// same `set_size`/`push`/trim-on-overflow shape, generalized from one
/// stream to one ring per camera and from `get_and_clear` returning a
/// `VecDeque` to returning the [`PerCameraFrames`] shape the rest of this
/// pipeline shares.
pub struct PreRollRing {
    capacity: usize,
    left: VecDeque<Frame>,
    right: VecDeque<Frame>,
}

impl PreRollRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            left: VecDeque::new(),
            right: VecDeque::new(),
        }
    }

    fn queue_mut(&mut self, side: CameraSide) -> &mut VecDeque<Frame> {
        match side {
            CameraSide::Left => &mut self.left,
            CameraSide::Right => &mut self.right,
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.trim(CameraSide::Left);
        self.trim(CameraSide::Right);
    }

    fn trim(&mut self, side: CameraSide) {
        let capacity = self.capacity;
        let queue = self.queue_mut(side);
        while queue.len() > capacity {
            queue.pop_front();
        }
    }

    /// Appends `frame` to the ring for its camera, evicting the oldest entry
    /// if over capacity. Called unconditionally on every `buffer_frame`,
    /// regardless of phase.
    pub fn push(&mut self, frame: Frame) {
        let side = frame.camera;
        if self.capacity > 0 {
            self.queue_mut(side).push_back(frame);
        }
        self.trim(side);
    }

    /// Drains both rings (in capture order) into a [`PerCameraFrames`] and
    /// clears them. Called exactly once per pitch, at the RAMP_UP -> ACTIVE
    /// transition.
    pub fn drain(&mut self) -> PerCameraFrames {
        PerCameraFrames {
            left: std::mem::take(&mut self.left).into_iter().collect(),
            right: std::mem::take(&mut self.right).into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::PixelFormat;

    fn frame(side: CameraSide, index: u64, t_ns: i64) -> Frame {
        Frame {
            camera: side,
            serial: "SN".into(),
            t_capture_monotonic_ns: t_ns,
            frame_index: index,
            width: 4,
            height: 4,
            pixel_format: PixelFormat::Gray8,
            data: vec![0u8; 16].into(),
        }
    }

    #[test]
    fn overflow_evicts_oldest_per_camera() {
        let mut ring = PreRollRing::new(2);
        for i in 0..5 {
            ring.push(frame(CameraSide::Left, i, i as i64));
        }
        let drained = ring.drain();
        assert_eq!(drained.left.len(), 2);
        assert_eq!(drained.left[0].frame_index, 3);
        assert_eq!(drained.left[1].frame_index, 4);
    }

    #[test]
    fn drain_clears_ring() {
        let mut ring = PreRollRing::new(4);
        ring.push(frame(CameraSide::Left, 0, 0));
        let first = ring.drain();
        assert_eq!(first.left.len(), 1);
        let second = ring.drain();
        assert!(second.left.is_empty());
    }

    #[test]
    fn capacity_rounds_pre_roll_window_up_to_whole_frames() {
        // pre_roll_ms=330, fps=30 -> capacity 10.
        let capacity = ((330.0_f64 * 30.0 / 1000.0).ceil()) as usize;
        assert_eq!(capacity, 10);
        let mut ring = PreRollRing::new(capacity);
        let frame_period_ns = 33_333_333i64;
        for i in 0..50 {
            ring.push(frame(CameraSide::Left, i, i as i64 * frame_period_ns));
        }
        let drained = ring.drain();
        assert_eq!(drained.left.len(), 10);
        assert_eq!(drained.left[0].frame_index, 40);
    }
}
