use std::collections::VecDeque;

use crate::config::VadSegmenterConfig;
use crate::constants::window_samples_for_rate;
use crate::energy::VadScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegState {
    Idle,
    Speaking,
}

/// A speech segment ready for transcription, flushed by the state machine.
#[derive(Debug, Clone)]
pub struct VadSegment {
    pub samples: Vec<f32>,
    /// True if the segment was cut by the max-length guard rather than an
    /// end-of-speech decision.
    pub forced: bool,
}

/// Drives fixed-size VAD frames through pre-roll capture, hysteresis on
/// `threshold`/`end_silence_ms`, and a forced max-length cut.
pub struct VadSegmenter<S: VadScorer> {
    scorer: S,
    state: SegState,
    threshold: f32,
    end_silence_frames: u32,
    silent_run: u32,
    pre_roll: VecDeque<Vec<f32>>,
    pre_roll_capacity: usize,
    speech_frames: Vec<Vec<f32>>,
    speech_len: usize,
    min_samples: usize,
    max_samples: usize,
    window_samples: usize,
    samplerate: u32,
    scratch: Vec<f32>,
}

impl<S: VadScorer> VadSegmenter<S> {
    pub fn new(config: &VadSegmenterConfig, scorer: S) -> Self {
        let window_samples = window_samples_for_rate(config.samplerate)
            .expect("unsupported VAD samplerate; config validation should have rejected this");
        let frame_duration_ms = window_samples as f32 * 1000.0 / config.samplerate as f32;
        let pre_roll_capacity =
            ((config.pre_roll_ms as f32 / frame_duration_ms).round() as usize).max(0);
        let end_silence_frames =
            ((config.end_silence_ms as f32 / frame_duration_ms).round() as u32).max(1);
        let min_samples = (config.min_speech_ms as u64 * config.samplerate as u64 / 1000) as usize;
        let max_samples = if config.max_speech_ms == 0 {
            0
        } else {
            (config.max_speech_ms as u64 * config.samplerate as u64 / 1000) as usize
        };

        Self {
            scorer,
            state: SegState::Idle,
            threshold: config.threshold,
            end_silence_frames,
            silent_run: 0,
            pre_roll: VecDeque::with_capacity(pre_roll_capacity),
            pre_roll_capacity,
            speech_frames: Vec::new(),
            speech_len: 0,
            min_samples,
            max_samples,
            window_samples,
            samplerate: config.samplerate,
            scratch: Vec::new(),
        }
    }

    /// Feeds arbitrary-length audio, consuming it in `window_samples` strides
    /// and returning zero or more flushed segments, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<VadSegment> {
        self.scratch.extend_from_slice(samples);
        let mut out = Vec::new();
        let mut offset = 0;
        while self.scratch.len() - offset >= self.window_samples {
            let frame = self.scratch[offset..offset + self.window_samples].to_vec();
            offset += self.window_samples;
            if let Some(seg) = self.process_frame(&frame) {
                out.push(seg);
            }
        }
        self.scratch.drain(..offset);
        out
    }

    fn process_frame(&mut self, frame: &[f32]) -> Option<VadSegment> {
        let score = self.scorer.score(frame);
        let is_speech = score >= self.threshold;

        match self.state {
            SegState::Idle => {
                if is_speech {
                    // the triggering frame is not part of the pre-roll: the
                    // ring only ever holds audio captured strictly before it.
                    self.state = SegState::Speaking;
                    self.silent_run = 0;
                    self.speech_frames = self.pre_roll.drain(..).collect();
                    self.speech_len = self.speech_frames.iter().map(|f| f.len()).sum();
                    self.push_speech_frame(frame.to_vec());
                } else {
                    self.pre_roll.push_back(frame.to_vec());
                    while self.pre_roll.len() > self.pre_roll_capacity {
                        self.pre_roll.pop_front();
                    }
                }
                None
            }
            SegState::Speaking => {
                self.push_speech_frame(frame.to_vec());

                if is_speech {
                    self.silent_run = 0;
                } else {
                    self.silent_run += 1;
                    if self.silent_run >= self.end_silence_frames {
                        self.state = SegState::Idle;
                        self.silent_run = 0;
                        return self.flush(false);
                    }
                }

                if self.max_samples > 0 && self.speech_len >= self.max_samples {
                    self.state = SegState::Idle;
                    self.silent_run = 0;
                    self.pre_roll.clear();
                    return self.flush(true);
                }
                None
            }
        }
    }

    fn push_speech_frame(&mut self, frame: Vec<f32>) {
        self.speech_len += frame.len();
        self.speech_frames.push(frame);
    }

    fn flush(&mut self, forced: bool) -> Option<VadSegment> {
        let mut samples = Vec::with_capacity(self.speech_len);
        for f in self.speech_frames.drain(..) {
            samples.extend(f);
        }
        self.speech_len = 0;
        if samples.len() < self.min_samples {
            return None;
        }
        Some(VadSegment { samples, forced })
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedScorer {
        scores: Vec<f32>,
        idx: usize,
    }

    impl VadScorer for ScriptedScorer {
        fn score(&mut self, _frame: &[f32]) -> f32 {
            let v = *self.scores.get(self.idx).unwrap_or(&0.0);
            self.idx += 1;
            v
        }
    }

    fn config() -> VadSegmenterConfig {
        VadSegmenterConfig {
            enabled: true,
            threshold: 0.5,
            end_silence_ms: 64, // 2 frames at 32ms
            pre_roll_ms: 32,    // 1 frame
            min_speech_ms: 32,  // 1 frame
            max_speech_ms: 0,
            samplerate: 16_000,
        }
    }

    #[test]
    fn emits_segment_with_pre_roll_after_end_silence() {
        let cfg = config();
        let scorer = ScriptedScorer {
            scores: vec![0.0, 1.0, 1.0, 0.0, 0.0],
            idx: 0,
        };
        let mut seg = VadSegmenter::new(&cfg, scorer);
        let frame = vec![0.1f32; 512];

        let mut segments = Vec::new();
        for _ in 0..5 {
            segments.extend(seg.push(&frame));
        }

        assert_eq!(segments.len(), 1);
        // 1 pre-roll frame + 2 speech frames + 2 trailing silence frames that
        // complete the end-silence hysteresis
        assert_eq!(segments[0].samples.len(), 512 * 5);
        assert!(!segments[0].forced);
    }

    #[test]
    fn forces_cut_at_max_length() {
        let mut cfg = config();
        cfg.max_speech_ms = 64; // 2 frames
        let scorer = ScriptedScorer {
            scores: vec![1.0; 10],
            idx: 0,
        };
        let mut seg = VadSegmenter::new(&cfg, scorer);
        let frame = vec![0.5f32; 512];

        let mut segments = Vec::new();
        for _ in 0..2 {
            segments.extend(seg.push(&frame));
        }

        assert_eq!(segments.len(), 1);
        assert!(segments[0].forced);
    }

    #[test]
    fn short_segment_below_min_is_discarded() {
        let mut cfg = config();
        cfg.min_speech_ms = 320; // 10 frames
        let scorer = ScriptedScorer {
            scores: vec![0.0, 1.0, 0.0, 0.0],
            idx: 0,
        };
        let mut seg = VadSegmenter::new(&cfg, scorer);
        let frame = vec![0.3f32; 512];

        let mut segments = Vec::new();
        for _ in 0..4 {
            segments.extend(seg.push(&frame));
        }
        assert!(segments.is_empty());
    }
}
