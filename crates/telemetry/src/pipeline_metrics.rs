use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared, lock-free counters updated from the audio, segmenter, and
/// delivery threads. Read periodically by the main loop for a stats line;
/// never read from the realtime capture callback.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub capture_frames: Arc<AtomicU64>,
    pub capture_drops: Arc<AtomicU64>,
    pub queue_depth: Arc<AtomicUsize>,

    pub chunks_emitted: Arc<AtomicU64>,
    pub vad_segments_emitted: Arc<AtomicU64>,
    pub vad_forced_cuts: Arc<AtomicU64>,

    pub finals_emitted: Arc<AtomicU64>,
    pub interims_emitted: Arc<AtomicU64>,
    pub backend_errors: Arc<AtomicU64>,

    pub is_speaking: Arc<AtomicBool>,
    pub delivery_connected: Arc<AtomicBool>,
    pub delivery_reconnects: Arc<AtomicU64>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            capture_frames: Arc::new(AtomicU64::new(0)),
            capture_drops: Arc::new(AtomicU64::new(0)),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            chunks_emitted: Arc::new(AtomicU64::new(0)),
            vad_segments_emitted: Arc::new(AtomicU64::new(0)),
            vad_forced_cuts: Arc::new(AtomicU64::new(0)),
            finals_emitted: Arc::new(AtomicU64::new(0)),
            interims_emitted: Arc::new(AtomicU64::new(0)),
            backend_errors: Arc::new(AtomicU64::new(0)),
            is_speaking: Arc::new(AtomicBool::new(false)),
            delivery_connected: Arc::new(AtomicBool::new(false)),
            delivery_reconnects: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl PipelineMetrics {
    pub fn record_capture_frame(&self) {
        self.capture_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_drop(&self) {
        self.capture_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }
}

/// Simple rolling frames-per-second counter, ticked once per processed unit.
#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}
