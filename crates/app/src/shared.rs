use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use voxstream_audio::RollingBuffer;
use voxstream_delivery::DeliverySender;
use voxstream_telemetry::PipelineMetrics;

use crate::sink::InterimSink;

pub struct LastFinal {
    pub text: String,
    pub at: Instant,
}

/// State shared between the emitter and the interim loop: the post-final
/// suppression deadline, the last committed text (for final-overlap dedup),
/// the rolling tail buffer the interim loop samples from, and the two
/// independent sequence counters.
pub struct PipelineShared {
    excludes: HashSet<String>,
    pub rolling: Mutex<RollingBuffer>,
    pub last_final: Mutex<Option<LastFinal>>,
    suppression_started: Instant,
    suppression_until_ms: AtomicI64,
    final_seq: AtomicU64,
    interim_seq: AtomicU64,
    pub sink: Arc<dyn InterimSink>,
    pub delivery: Option<DeliverySender>,
    pub metrics: Arc<PipelineMetrics>,
}

impl PipelineShared {
    pub fn new(
        excludes: HashSet<String>,
        rolling_capacity_samples: usize,
        sink: Arc<dyn InterimSink>,
        delivery: Option<DeliverySender>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            excludes,
            rolling: Mutex::new(RollingBuffer::new(rolling_capacity_samples)),
            last_final: Mutex::new(None),
            suppression_started: Instant::now(),
            suppression_until_ms: AtomicI64::new(i64::MIN),
            final_seq: AtomicU64::new(0),
            interim_seq: AtomicU64::new(0),
            sink,
            delivery,
            metrics,
        }
    }

    fn now_ms(&self) -> i64 {
        self.suppression_started.elapsed().as_millis() as i64
    }

    /// Opens the post-final suppression window for `duration` starting now.
    pub fn suppress_for(&self, duration: Duration) {
        let until = self.now_ms() + duration.as_millis() as i64;
        self.suppression_until_ms.store(until, Ordering::Relaxed);
    }

    pub fn suppressed(&self) -> bool {
        self.now_ms() < self.suppression_until_ms.load(Ordering::Relaxed)
    }

    pub fn next_final_seq(&self) -> u64 {
        self.final_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_interim_seq(&self) -> u64 {
        self.interim_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_excluded(&self, text: &str) -> bool {
        self.excludes.contains(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;

    fn shared() -> PipelineShared {
        PipelineShared::new(
            HashSet::new(),
            1600,
            Arc::new(NullSink),
            None,
            Arc::new(PipelineMetrics::default()),
        )
    }

    #[test]
    fn suppression_expires_after_duration() {
        let s = shared();
        assert!(!s.suppressed());
        s.suppress_for(Duration::from_millis(50));
        assert!(s.suppressed());
        std::thread::sleep(Duration::from_millis(80));
        assert!(!s.suppressed());
    }

    #[test]
    fn seq_counters_are_independent_and_monotonic() {
        let s = shared();
        assert_eq!(s.next_final_seq(), 1);
        assert_eq!(s.next_interim_seq(), 1);
        assert_eq!(s.next_final_seq(), 2);
        assert_eq!(s.next_interim_seq(), 2);
    }
}
