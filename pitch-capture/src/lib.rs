//! Bounded per-camera frame queue sitting between a Camera Source thread and
//! the Detector worker pool.
//!
//! `crossbeam_channel::bounded` was considered and rejected: its backpressure
//! blocks the producer on a full channel, but the producer (the capture
//! thread) must never block for longer than one frame period and instead
//! drop the oldest buffered frame. That policy needs
//! direct access to the backing buffer, so this is a small hand-rolled
//! `Mutex<VecDeque<_>>` + `Condvar`, in the spirit of
//! `strand_cam::post_trigger_buffer::PostTriggerBuffer`'s own hand-rolled
//! ring rather than a channel.

use parking_lot::{Condvar, Mutex};
use pitch_types::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Width of the sliding window (in push attempts) used to compute the
/// "sustained" drop rate that triggers the queue-health WARN event.
const DROP_RATE_WINDOW: u64 = 200;
const DROP_RATE_WARN_THRESHOLD: f64 = 0.02;

struct Inner {
    buf: Mutex<VecDeque<Frame>>,
    not_empty: Condvar,
    capacity: usize,
    camera_label: String,
    total_pushed: AtomicU64,
    total_dropped: AtomicU64,
    window_pushed: AtomicU64,
    window_dropped: AtomicU64,
    warned: std::sync::atomic::AtomicBool,
}

/// Producer handle, held by the capture thread.
#[derive(Clone)]
pub struct CaptureQueueProducer {
    inner: Arc<Inner>,
}

/// Consumer handle, held by the orchestrator's dispatch loop feeding the
/// detector worker pool.
#[derive(Clone)]
pub struct CaptureQueueConsumer {
    inner: Arc<Inner>,
}

/// Creates a bound producer/consumer pair sharing one queue of `capacity`
/// frames for a single camera.
pub fn capture_queue(camera_label: impl Into<String>, capacity: usize) -> (CaptureQueueProducer, CaptureQueueConsumer) {
    assert!(capacity > 0, "capture queue capacity must be nonzero");
    let inner = Arc::new(Inner {
        buf: Mutex::new(VecDeque::with_capacity(capacity)),
        not_empty: Condvar::new(),
        capacity,
        camera_label: camera_label.into(),
        total_pushed: AtomicU64::new(0),
        total_dropped: AtomicU64::new(0),
        window_pushed: AtomicU64::new(0),
        window_dropped: AtomicU64::new(0),
        warned: std::sync::atomic::AtomicBool::new(false),
    });
    (
        CaptureQueueProducer {
            inner: inner.clone(),
        },
        CaptureQueueConsumer { inner },
    )
}

/// Point-in-time observability snapshot for the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub camera_label_hash: u64,
    pub depth: usize,
    pub capacity: usize,
    pub total_pushed: u64,
    pub total_dropped: u64,
    /// Drop rate over the trailing `DROP_RATE_WINDOW` push attempts, in [0, 1].
    pub windowed_drop_rate: f64,
}

impl Inner {
    fn push(&self, frame: Frame) {
        let mut buf = self.buf.lock();
        let dropped = if buf.len() >= self.capacity {
            buf.pop_front();
            true
        } else {
            false
        };
        buf.push_back(frame);
        drop(buf);
        self.not_empty.notify_one();

        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        let pushed_in_window = self.window_pushed.fetch_add(1, Ordering::Relaxed) + 1;
        let dropped_in_window = if dropped {
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
            self.window_dropped.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.window_dropped.load(Ordering::Relaxed)
        };

        if pushed_in_window >= DROP_RATE_WINDOW {
            let rate = dropped_in_window as f64 / pushed_in_window as f64;
            self.window_pushed.store(0, Ordering::Relaxed);
            self.window_dropped.store(0, Ordering::Relaxed);
            if rate > DROP_RATE_WARN_THRESHOLD {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        camera = %self.camera_label,
                        drop_rate = rate,
                        "capture queue sustained drop rate exceeds threshold"
                    );
                }
            } else {
                self.warned.store(false, Ordering::Relaxed);
            }
        }
    }

    fn stats(&self) -> QueueStats {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.camera_label.hash(&mut hasher);
        let total_pushed = self.total_pushed.load(Ordering::Relaxed);
        let total_dropped = self.total_dropped.load(Ordering::Relaxed);
        QueueStats {
            camera_label_hash: hasher.finish(),
            depth: self.buf.lock().len(),
            capacity: self.capacity,
            total_pushed,
            total_dropped,
            windowed_drop_rate: if total_pushed == 0 {
                0.0
            } else {
                total_dropped as f64 / total_pushed as f64
            },
        }
    }
}

impl CaptureQueueProducer {
    /// Enqueues `frame`. Never blocks: on overflow the oldest buffered frame
    /// is dropped and the per-camera drop counter is incremented.
    pub fn push(&self, frame: Frame) {
        self.inner.push(frame);
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

impl CaptureQueueConsumer {
    /// Blocks for at most `timeout` waiting for a frame, returning `None` on
    /// timeout. FIFO: frames are returned in push order (oldest first among
    /// what survived dropping).
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut buf = self.inner.buf.lock();
        if buf.is_empty() {
            let result = self.inner.not_empty.wait_for(&mut buf, timeout);
            if result.timed_out() && buf.is_empty() {
                return None;
            }
        }
        buf.pop_front()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::{CameraSide, PixelFormat};

    fn test_frame(index: u64) -> Frame {
        Frame {
            camera: CameraSide::Left,
            serial: "SN".into(),
            t_capture_monotonic_ns: index as i64 * 1_000_000,
            frame_index: index,
            width: 4,
            height: 4,
            pixel_format: PixelFormat::Gray8,
            data: vec![0u8; 16].into(),
        }
    }

    #[test]
    fn fifo_order_preserved_under_capacity() {
        let (tx, rx) = capture_queue("left", 4);
        for i in 0..3 {
            tx.push(test_frame(i));
        }
        assert_eq!(rx.pop_timeout(Duration::from_millis(10)).unwrap().frame_index, 0);
        assert_eq!(rx.pop_timeout(Duration::from_millis(10)).unwrap().frame_index, 1);
        assert_eq!(rx.pop_timeout(Duration::from_millis(10)).unwrap().frame_index, 2);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let (tx, rx) = capture_queue("left", 2);
        tx.push(test_frame(0));
        tx.push(test_frame(1));
        tx.push(test_frame(2)); // drops frame 0
        let stats = tx.stats();
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.depth, 2);
        assert_eq!(rx.pop_timeout(Duration::from_millis(10)).unwrap().frame_index, 1);
        assert_eq!(rx.pop_timeout(Duration::from_millis(10)).unwrap().frame_index, 2);
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let (_tx, rx) = capture_queue("left", 4);
        assert!(rx.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn sustained_drop_rate_above_threshold_is_flagged_in_stats() {
        let (tx, _rx) = capture_queue("left", 1);
        // Push far beyond capacity without ever draining: every push past
        // the first is a drop, well over the 2% sustained threshold.
        for i in 0..DROP_RATE_WINDOW * 2 {
            tx.push(test_frame(i));
        }
        let stats = tx.stats();
        assert!(stats.windowed_drop_rate > DROP_RATE_WARN_THRESHOLD);
    }
}
