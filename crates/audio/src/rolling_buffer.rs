use std::collections::VecDeque;

/// Bounded FIFO of audio frames, used as the interim loop's tail window.
///
/// `add` evicts whole frames from the front until the aggregate length is
/// back within `capacity_samples`; `get` materializes a single contiguous
/// copy. Callers serialize access externally (the `interim_lock` in the
/// concurrency model) — this type has no internal locking.
pub struct RollingBuffer {
    capacity_samples: usize,
    frames: VecDeque<Vec<f32>>,
    len: usize,
}

impl RollingBuffer {
    pub fn new(capacity_samples: usize) -> Self {
        Self {
            capacity_samples,
            frames: VecDeque::new(),
            len: 0,
        }
    }

    pub fn add(&mut self, frame: &[f32]) {
        self.len += frame.len();
        self.frames.push_back(frame.to_vec());
        while self.len > self.capacity_samples {
            if let Some(front) = self.frames.pop_front() {
                self.len -= front.len();
            } else {
                break;
            }
        }
    }

    /// Materializes the full buffered contents as one contiguous copy.
    pub fn get(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len);
        for frame in &self.frames {
            out.extend_from_slice(frame);
        }
        out
    }

    /// Materializes at most the last `max_samples` samples.
    pub fn tail(&self, max_samples: usize) -> Vec<f32> {
        let all = self.get();
        if all.len() <= max_samples {
            all
        } else {
            all[all.len() - max_samples..].to_vec()
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_frames_over_capacity() {
        let mut buf = RollingBuffer::new(10);
        buf.add(&[1.0; 4]);
        buf.add(&[2.0; 4]);
        buf.add(&[3.0; 4]);
        assert!(buf.len() <= 10);
        let contents = buf.get();
        // the oldest frame (all 1.0) should have been evicted
        assert!(!contents.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn get_is_contiguous_and_ordered() {
        let mut buf = RollingBuffer::new(100);
        buf.add(&[1.0, 2.0]);
        buf.add(&[3.0, 4.0]);
        assert_eq!(buf.get(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn tail_truncates_to_requested_length() {
        let mut buf = RollingBuffer::new(100);
        buf.add(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf.tail(2), vec![4.0, 5.0]);
        assert_eq!(buf.tail(100), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = RollingBuffer::new(100);
        buf.add(&[1.0, 2.0]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }
}
